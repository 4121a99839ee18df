//! Agent activity classification from captured pane content.
//!
//! Rules are tried in order and the first match wins. An agent that is busy
//! usually still shows the numbered menu it answered a moment ago, so the
//! interrupt affordance is checked before the choice prompt.

use std::sync::LazyLock;

use arbor_core::AgentStatus;
use regex::Regex;

/// Which part of the capture a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Anywhere,
    LastLine,
}

struct Rule {
    status: AgentStatus,
    scope: Scope,
    pattern: Regex,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // "esc to interrupt", "ctrl+c to interrupt"
        Rule {
            status: AgentStatus::Working,
            scope: Scope::Anywhere,
            pattern: Regex::new(r"(?i)\bto interrupt\b").unwrap(),
        },
        // A menu with at least options 1 and 2, optionally behind a cursor glyph
        Rule {
            status: AgentStatus::Waiting,
            scope: Scope::Anywhere,
            pattern: Regex::new(r"(?ms)^\s*(?:[❯>›]\s*)?1[.)]\s+\S.*?^\s*(?:[❯>›]\s*)?2[.)]\s+\S")
                .unwrap(),
        },
        Rule {
            status: AgentStatus::Thinking,
            scope: Scope::Anywhere,
            pattern: Regex::new(r"(?i)\bthinking\b").unwrap(),
        },
        // Bare shell prompt: the last line ends in a prompt character
        Rule {
            status: AgentStatus::Idle,
            scope: Scope::LastLine,
            pattern: Regex::new(r"^\S*[$%#>❯]\s*$").unwrap(),
        },
    ]
});

fn last_line(content: &str) -> &str {
    content
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .unwrap_or("")
}

/// Classify a running main session from its pane content.
///
/// Content that matches no rule means the session is alive but in no
/// recognizable state, which is [`AgentStatus::Active`].
pub fn classify(content: &str) -> AgentStatus {
    let tail = last_line(content);
    RULES
        .iter()
        .find(|rule| match rule.scope {
            Scope::Anywhere => rule.pattern.is_match(content),
            Scope::LastLine => rule.pattern.is_match(tail),
        })
        .map(|rule| rule.status)
        .unwrap_or(AgentStatus::Active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working() {
        let pane = "✻ Compiling… (12s · esc to interrupt)\n";
        assert_eq!(classify(pane), AgentStatus::Working);
    }

    #[test]
    fn test_waiting_on_numbered_choice() {
        let pane = "\
Do you want to make this edit to main.rs?
❯ 1. Yes
  2. Yes, and don't ask again this session
  3. No, and tell Claude what to do differently
";
        assert_eq!(classify(pane), AgentStatus::Waiting);
    }

    #[test]
    fn test_working_wins_over_waiting() {
        let pane = "\
❯ 1. Yes
  2. No
Running tool… (esc to interrupt)
";
        assert_eq!(classify(pane), AgentStatus::Working);
    }

    #[test]
    fn test_single_numbered_line_is_not_a_menu() {
        assert_eq!(classify("1. install deps\nstill going"), AgentStatus::Active);
    }

    #[test]
    fn test_thinking() {
        assert_eq!(classify("✻ Thinking…\n"), AgentStatus::Thinking);
    }

    #[test]
    fn test_idle_prompt() {
        assert_eq!(classify("make: done\nuser@host:~/api$ \n\n"), AgentStatus::Idle);
        assert_eq!(classify("> "), AgentStatus::Idle);
    }

    #[test]
    fn test_prompt_not_on_last_line() {
        assert_eq!(classify("$ cargo build\n   Compiling arbor"), AgentStatus::Active);
    }

    #[test]
    fn test_empty_capture_is_active() {
        assert_eq!(classify(""), AgentStatus::Active);
    }
}
