//! Shared domain types.
//!
//! [`Workspace`] is the aggregate root. [`GitStatus`], [`SessionSet`] and
//! [`ReviewStatus`] are value objects that a probe produces whole; nothing
//! outside the owning probe edits them field by field. A [`MergedRecord`]
//! joins all three for one refresh pass and is superseded entirely by the next.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeIssue;
use crate::label::Label;

/// Identity of a workspace: `(project, feature)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId {
    pub project: String,
    pub feature: String,
}

impl WorkspaceId {
    pub fn new(project: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            feature: feature.into(),
        }
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.feature)
    }
}

/// One checked-out feature branch living in its own directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    /// Worktree directory
    pub path: PathBuf,
    /// Checked-out branch, `None` for a detached HEAD
    pub branch: Option<String>,
    /// Directory modification time, used for recency ordering
    pub last_modified: DateTime<Utc>,
}

impl Workspace {
    pub fn project(&self) -> &str {
        &self.id.project
    }

    pub fn feature(&self) -> &str {
        &self.id.feature
    }
}

/// Version-control state of one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    /// Any entry in `git status --porcelain`
    pub has_changes: bool,
    pub modified_files: u32,
    /// Working tree vs. HEAD
    pub added_lines: u64,
    pub deleted_lines: u64,
    /// Lines in untracked files
    pub untracked_lines: u64,
    /// Cumulative vs. the merge-base with the base branch, working tree included
    pub base_added_lines: u64,
    pub base_deleted_lines: u64,
    /// Resolved base branch, if any candidate exists
    pub base_branch: Option<String>,
    /// HEAD carries commits not in the merge-base with the base branch
    pub diverged_from_base: bool,
    pub has_remote: bool,
    /// Ahead/behind the upstream, or the base branch when there is no upstream
    pub ahead: u32,
    pub behind: u32,
    pub is_pushed: bool,
}

impl GitStatus {
    /// Recompute `is_pushed` from the other fields.
    ///
    /// With a remote, pushed means nothing ahead and a clean tree. Without
    /// one, a workspace is never considered pushed.
    pub fn settle(mut self) -> Self {
        self.is_pushed = self.has_remote && self.ahead == 0 && !self.has_changes;
        self
    }

    /// Local commits not yet on the upstream.
    pub fn has_unpushed_commits(&self) -> bool {
        self.ahead > 0
    }
}

/// The three session roles attached to a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// Interactive agent
    Main,
    /// Manual terminal
    Shell,
    /// Task execution
    Run,
}

impl SessionRole {
    pub const ALL: [SessionRole; 3] = [SessionRole::Main, SessionRole::Shell, SessionRole::Run];

    /// Suffix appended to the main session name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Main => "",
            Self::Shell => "-shell",
            Self::Run => "-run",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Shell => write!(f, "shell"),
            Self::Run => write!(f, "run"),
        }
    }
}

impl std::str::FromStr for SessionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "shell" => Ok(Self::Shell),
            "run" => Ok(Self::Run),
            other => Err(format!("unknown session role '{other}'")),
        }
    }
}

/// Activity of the process inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// No session exists
    #[default]
    NotRunning,
    /// Agent is executing and can be interrupted
    Working,
    /// Agent is blocked on a numbered-choice prompt
    Waiting,
    /// Agent shows a thinking indicator
    Thinking,
    /// Bare shell prompt
    Idle,
    /// Session is running with no recognizable state, or is attached
    Active,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotRunning => "not_running",
            Self::Working => "working",
            Self::Waiting => "waiting",
            Self::Thinking => "thinking",
            Self::Idle => "idle",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}

/// One terminal session of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub role: SessionRole,
    pub attached: bool,
    /// Agent tool recorded when the session was created
    pub agent_tool: Option<String>,
    pub status: AgentStatus,
}

impl SessionInfo {
    /// A session that does not exist.
    pub fn absent(name: impl Into<String>, role: SessionRole) -> Self {
        Self {
            name: name.into(),
            role,
            attached: false,
            agent_tool: None,
            status: AgentStatus::NotRunning,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status != AgentStatus::NotRunning
    }
}

/// All sessions of a workspace, one per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSet {
    pub main: SessionInfo,
    pub shell: SessionInfo,
    pub run: SessionInfo,
}

impl SessionSet {
    pub fn get(&self, role: SessionRole) -> &SessionInfo {
        match role {
            SessionRole::Main => &self.main,
            SessionRole::Shell => &self.shell,
            SessionRole::Run => &self.run,
        }
    }

    /// Any role has a client attached.
    pub fn any_attached(&self) -> bool {
        self.main.attached || self.shell.attached || self.run.attached
    }
}

/// Lifecycle state of a review record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Open,
    Merged,
    Closed,
}

/// Reduced status of all checks on a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRollup {
    Passing,
    Failing,
    Pending,
    #[default]
    Unknown,
}

/// Whether the review can merge cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    #[default]
    Unknown,
}

/// A pull-request-like record from the code-review system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub number: u64,
    pub title: String,
    /// Source branch
    pub branch: String,
    pub state: ReviewState,
    pub checks: CheckRollup,
    pub mergeable: Mergeable,
}

impl ReviewRecord {
    pub fn is_open(&self) -> bool {
        self.state == ReviewState::Open
    }
}

/// Cached review status of a workspace.
///
/// A cache miss is an explicit variant, never an absent record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    NotChecked,
    Loading,
    NoPr,
    Exists(ReviewRecord),
    Error { message: String },
}

impl ReviewStatus {
    pub fn record(&self) -> Option<&ReviewRecord> {
        match self {
            Self::Exists(record) => Some(record),
            _ => None,
        }
    }

    /// An open review exists.
    pub fn is_open(&self) -> bool {
        self.record().is_some_and(ReviewRecord::is_open)
    }

    /// An open review with merge conflicts or failing checks.
    pub fn needs_attention(&self) -> bool {
        self.record().is_some_and(|r| {
            r.is_open() && (r.mergeable == Mergeable::Conflicting || r.checks == CheckRollup::Failing)
        })
    }

    /// An open review with passing checks that merges cleanly.
    pub fn ready_to_merge(&self) -> bool {
        self.record().is_some_and(|r| {
            r.is_open() && r.checks == CheckRollup::Passing && r.mergeable == Mergeable::Mergeable
        })
    }
}

/// All signals for one workspace from one refresh pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub workspace: Workspace,
    pub git: GitStatus,
    pub sessions: SessionSet,
    pub review: ReviewStatus,
    pub label: Label,
    /// Signals that defaulted during this pass, with their reasons
    pub issues: Vec<ProbeIssue>,
    pub refreshed_at: DateTime<Utc>,
}
