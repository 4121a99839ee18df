//! Status derivation.
//!
//! [`derive`] folds the merged signals of a workspace into one [`Label`].
//! Rules are checked in a fixed order and the first match wins:
//!
//! | # | Condition | Label |
//! |---|-----------|-------|
//! | 1 | agent waiting on a prompt | `waiting` |
//! | 2 | agent working | `working` |
//! | 3 | uncommitted changes | `uncommitted` |
//! | 4 | commits ahead of upstream | `un-pushed` |
//! | 5 | open review with conflicts | `conflict` |
//! | 6 | open review with failing checks | `pr-failed` |
//! | 7 | open review, passing, mergeable | `pr-passed` |
//! | 8 | open review, checks pending | `pr-checking` |
//! | 9 | no review, remote present, diverged from base | `no-pr` |
//! | 10 | no review | `ready` |
//! | 11 | review merged | `merged` |
//! | 12 | anything else | no highlight |
//!
//! Each label maps to a [`LabelStyle`] through [`Label::style`], an
//! exhaustive `match` so a new variant cannot compile without an entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AgentStatus, CheckRollup, Mergeable, ReviewState, ReviewStatus};

/// Discrete workspace status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Waiting,
    Working,
    Uncommitted,
    #[serde(rename = "un-pushed")]
    Unpushed,
    Conflict,
    PrFailed,
    PrPassed,
    PrChecking,
    NoPr,
    Ready,
    Merged,
    /// No highlight
    #[default]
    None,
}

impl Label {
    /// Every label, in priority order.
    pub const ALL: [Label; 12] = [
        Label::Waiting,
        Label::Working,
        Label::Uncommitted,
        Label::Unpushed,
        Label::Conflict,
        Label::PrFailed,
        Label::PrPassed,
        Label::PrChecking,
        Label::NoPr,
        Label::Ready,
        Label::Merged,
        Label::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Working => "working",
            Self::Uncommitted => "uncommitted",
            Self::Unpushed => "un-pushed",
            Self::Conflict => "conflict",
            Self::PrFailed => "pr-failed",
            Self::PrPassed => "pr-passed",
            Self::PrChecking => "pr-checking",
            Self::NoPr => "no-pr",
            Self::Ready => "ready",
            Self::Merged => "merged",
            Self::None => "",
        }
    }

    /// Display mapping for this label.
    pub const fn style(&self) -> LabelStyle {
        use Color::*;
        match self {
            Self::Waiting => LabelStyle::new(Column::Agent, Yellow, Black, Severity::Critical),
            Self::Working => LabelStyle::new(Column::Agent, Reset, Cyan, Severity::Info),
            Self::Uncommitted => LabelStyle::new(Column::Git, Reset, Yellow, Severity::Warning),
            Self::Unpushed => LabelStyle::new(Column::Git, Reset, Magenta, Severity::Warning),
            Self::Conflict => LabelStyle::new(Column::Review, Red, White, Severity::Critical),
            Self::PrFailed => LabelStyle::new(Column::Review, Reset, Red, Severity::Critical),
            Self::PrPassed => LabelStyle::new(Column::Review, Reset, Green, Severity::Success),
            Self::PrChecking => LabelStyle::new(Column::Review, Reset, Blue, Severity::Info),
            Self::NoPr => LabelStyle::new(Column::Review, Reset, Gray, Severity::Info),
            Self::Ready => LabelStyle::new(Column::Name, Reset, Green, Severity::Success),
            Self::Merged => LabelStyle::new(Column::Review, Reset, DarkGray, Severity::None),
            Self::None => LabelStyle::new(Column::Name, Reset, Reset, Severity::None),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column that carries the highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Name,
    Agent,
    Git,
    Review,
}

/// Named terminal colors, independent of any rendering library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Reset,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Gray,
    DarkGray,
}

impl Color {
    /// SGR foreground code.
    pub fn ansi_fg(&self) -> u8 {
        match self {
            Self::Reset => 39,
            Self::Black => 30,
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::White => 97,
            Self::Gray => 37,
            Self::DarkGray => 90,
        }
    }

    /// SGR background code.
    pub fn ansi_bg(&self) -> u8 {
        match self {
            Self::Reset => 49,
            other => other.ansi_fg() + 10,
        }
    }
}

/// How loudly a label should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Info,
    Success,
    Warning,
    Critical,
}

/// Static display entry for a [`Label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelStyle {
    pub column: Column,
    pub background: Color,
    pub foreground: Color,
    pub severity: Severity,
}

impl LabelStyle {
    const fn new(column: Column, background: Color, foreground: Color, severity: Severity) -> Self {
        Self {
            column,
            background,
            foreground,
            severity,
        }
    }
}

/// Inputs to [`derive`], gathered from one merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveInput<'a> {
    pub agent: AgentStatus,
    pub attached: bool,
    pub has_changes: bool,
    pub ahead: u32,
    pub behind: u32,
    pub has_remote: bool,
    pub diverged_from_base: bool,
    pub review: &'a ReviewStatus,
}

/// Derive the label for a workspace. Pure; equal inputs give equal labels.
pub fn derive(input: &DeriveInput<'_>) -> Label {
    match input.agent {
        AgentStatus::Waiting => return Label::Waiting,
        AgentStatus::Working => return Label::Working,
        _ => {}
    }

    if input.has_changes {
        return Label::Uncommitted;
    }
    if input.ahead > 0 {
        return Label::Unpushed;
    }

    match input.review {
        ReviewStatus::Exists(record) if record.state == ReviewState::Open => {
            if record.mergeable == Mergeable::Conflicting {
                Label::Conflict
            } else if record.checks == CheckRollup::Failing {
                Label::PrFailed
            } else if record.checks == CheckRollup::Passing && record.mergeable == Mergeable::Mergeable {
                Label::PrPassed
            } else if record.checks == CheckRollup::Pending {
                Label::PrChecking
            } else {
                Label::None
            }
        }
        ReviewStatus::NoPr if input.has_remote && input.diverged_from_base => Label::NoPr,
        ReviewStatus::NoPr => Label::Ready,
        ReviewStatus::Exists(record) if record.state == ReviewState::Merged => Label::Merged,
        _ => Label::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewRecord;

    fn review(state: ReviewState, checks: CheckRollup, mergeable: Mergeable) -> ReviewStatus {
        ReviewStatus::Exists(ReviewRecord {
            number: 12,
            title: "Feature".into(),
            branch: "feature".into(),
            state,
            checks,
            mergeable,
        })
    }

    fn input(review: &ReviewStatus) -> DeriveInput<'_> {
        DeriveInput {
            agent: AgentStatus::Idle,
            attached: false,
            has_changes: false,
            ahead: 0,
            behind: 0,
            has_remote: true,
            diverged_from_base: false,
            review,
        }
    }

    #[test]
    fn test_waiting_beats_uncommitted() {
        let review = ReviewStatus::NoPr;
        let mut i = input(&review);
        i.agent = AgentStatus::Waiting;
        i.has_changes = true;
        i.ahead = 4;
        assert_eq!(derive(&i), Label::Waiting);
    }

    #[test]
    fn test_working_suppresses_every_other_signal() {
        let review = review(ReviewState::Open, CheckRollup::Failing, Mergeable::Conflicting);
        let mut i = input(&review);
        i.agent = AgentStatus::Working;
        i.has_changes = true;
        i.ahead = 2;
        assert_eq!(derive(&i), Label::Working);
    }

    #[test]
    fn test_git_signals_before_review() {
        let review = review(ReviewState::Open, CheckRollup::Failing, Mergeable::Conflicting);
        let mut i = input(&review);
        i.has_changes = true;
        assert_eq!(derive(&i), Label::Uncommitted);

        i.has_changes = false;
        i.ahead = 1;
        assert_eq!(derive(&i), Label::Unpushed);
    }

    #[test]
    fn test_conflict_before_failing_checks() {
        let review = review(ReviewState::Open, CheckRollup::Failing, Mergeable::Conflicting);
        assert_eq!(derive(&input(&review)), Label::Conflict);
    }

    #[test]
    fn test_open_review_labels() {
        let failed = review(ReviewState::Open, CheckRollup::Failing, Mergeable::Mergeable);
        assert_eq!(derive(&input(&failed)), Label::PrFailed);

        let passed = review(ReviewState::Open, CheckRollup::Passing, Mergeable::Mergeable);
        assert_eq!(derive(&input(&passed)), Label::PrPassed);

        let checking = review(ReviewState::Open, CheckRollup::Pending, Mergeable::Unknown);
        assert_eq!(derive(&input(&checking)), Label::PrChecking);

        let unknown = review(ReviewState::Open, CheckRollup::Unknown, Mergeable::Unknown);
        assert_eq!(derive(&input(&unknown)), Label::None);
    }

    #[test]
    fn test_no_review_labels() {
        let review = ReviewStatus::NoPr;
        let mut i = input(&review);
        i.diverged_from_base = true;
        assert_eq!(derive(&i), Label::NoPr);

        i.has_remote = false;
        assert_eq!(derive(&i), Label::Ready);

        i.has_remote = true;
        i.diverged_from_base = false;
        assert_eq!(derive(&i), Label::Ready);
    }

    #[test]
    fn test_merged_and_closed() {
        let merged = review(ReviewState::Merged, CheckRollup::Passing, Mergeable::Unknown);
        assert_eq!(derive(&input(&merged)), Label::Merged);

        let closed = review(ReviewState::Closed, CheckRollup::Failing, Mergeable::Conflicting);
        assert_eq!(derive(&input(&closed)), Label::None);
    }

    #[test]
    fn test_cache_miss_states_have_no_highlight() {
        for status in [
            ReviewStatus::NotChecked,
            ReviewStatus::Loading,
            ReviewStatus::Error {
                message: "gh: not logged in".into(),
            },
        ] {
            assert_eq!(derive(&input(&status)), Label::None);
        }
    }

    #[test]
    fn test_derive_is_idempotent() {
        let review = review(ReviewState::Open, CheckRollup::Pending, Mergeable::Mergeable);
        let i = input(&review);
        let first = derive(&i);
        let second = derive(&i);
        assert_eq!(first, second);
        assert_eq!(first.style(), second.style());
    }

    #[test]
    fn test_style_table_is_total() {
        for label in Label::ALL {
            let style = label.style();
            if label == Label::None {
                assert_eq!(style.severity, Severity::None);
            }
        }
        assert_eq!(Label::Waiting.style().column, Column::Agent);
        assert_eq!(Label::Uncommitted.style().column, Column::Git);
        assert_eq!(Label::PrFailed.style().column, Column::Review);
    }

    #[test]
    fn test_label_serialization_matches_display() {
        for label in Label::ALL {
            if label == Label::None {
                continue;
            }
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{}\"", label.as_str()));
        }
    }

    #[test]
    fn test_color_codes() {
        assert_eq!(Color::Red.ansi_fg(), 31);
        assert_eq!(Color::Red.ansi_bg(), 41);
        assert_eq!(Color::Reset.ansi_bg(), 49);
    }
}
