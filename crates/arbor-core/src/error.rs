//! Error types for arbor.
//!
//! Two families live here:
//!
//! - [`ArborError`] covers operations that can genuinely fail and that a
//!   caller is expected to branch on: loading configuration, creating or
//!   archiving a workspace, driving a tmux session.
//! - [`ProbeError`] covers signal-local failures inside a status probe. A
//!   probe never aborts because one external command misbehaved; it records a
//!   [`ProbeIssue`] and leaves the affected field at its default, so the
//!   reason a value is zero stays inspectable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ArborError`].
pub type Result<T> = std::result::Result<T, ArborError>;

/// Result type alias for a single probe step.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Operation-level errors.
#[derive(Debug, Error)]
pub enum ArborError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found where one was explicitly requested
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workspace directory not found
    #[error("Workspace not found: {project}/{feature}")]
    WorkspaceNotFound { project: String, feature: String },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // External Tool Errors
    // =========================================================================
    /// A tmux session command failed
    #[error("Session {session}: {message}")]
    Session { session: String, message: String },

    /// A git worktree command failed
    #[error("Worktree {path}: {message}")]
    Worktree { path: PathBuf, message: String },

    /// A probe failed in a way that has no per-field default
    #[error(transparent)]
    Probe(#[from] ProbeError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in arbor)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ArborError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a session command error
    pub fn session(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Session {
            session: session.into(),
            message: message.into(),
        }
    }

    /// Create a worktree command error
    pub fn worktree(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Worktree {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.config/arbor/config.yaml or pass --projects-dir")
            }
            Self::ConfigInvalid { .. } => Some("Check the YAML syntax of the arbor configuration"),
            Self::Session { .. } => Some("Check that tmux is installed and the server is reachable"),
            Self::Worktree { .. } => Some("Run 'git worktree list' in the project to inspect state"),
            _ => None,
        }
    }
}

/// Why a probed signal fell back to its default value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    /// The external program could not be started at all
    #[error("{program} unavailable: {message}")]
    ToolUnavailable { program: String, message: String },

    /// The program ran and exited unsuccessfully
    #[error("`{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program succeeded but printed nothing
    #[error("`{command}` produced no output")]
    EmptyOutput { command: String },

    /// The program output could not be interpreted
    #[error("`{command}` produced unparseable output: {output}")]
    Unparseable { command: String, output: String },

    /// None of the candidate base branches exist
    #[error("no base branch among {candidates:?}")]
    NoBaseBranch { candidates: Vec<String> },

    /// The branch has no upstream tracking ref
    #[error("no upstream tracking ref")]
    NoUpstream,

    /// The workspace directory is gone
    #[error("workspace missing: {path}")]
    WorkspaceMissing { path: PathBuf },

    /// Local file access failed
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl ProbeError {
    /// Create a CommandFailed error
    pub fn command_failed(command: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Create an Unparseable error
    pub fn unparseable(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Unparseable {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Returns true when the failure means the tool itself is missing,
    /// as opposed to the tool reporting a problem with this workspace.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. })
    }
}

/// The probed field a [`ProbeError`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeField {
    ModifiedFiles,
    WorkingDiff,
    UntrackedLines,
    BaseBranch,
    BaseDiff,
    Upstream,
    AheadBehind,
    Sessions,
    Activity,
    Review,
}

/// A recorded, non-fatal probe failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeIssue {
    pub field: ProbeField,
    pub error: ProbeError,
}

impl ProbeIssue {
    pub fn new(field: ProbeField, error: ProbeError) -> Self {
        Self { field, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = ArborError::config_not_found("/home/user/.config/arbor/config.yaml");
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_session_error_message() {
        let err = ArborError::session("dev-api-login", "tmux new-session failed");
        assert!(err.to_string().contains("dev-api-login"));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_probe_error_converts_into_arbor_error() {
        let err: ArborError = ProbeError::WorkspaceMissing {
            path: "/tmp/gone".into(),
        }
        .into();
        assert!(err.to_string().contains("/tmp/gone"));
    }

    #[test]
    fn test_probe_error_classification() {
        let missing = ProbeError::ToolUnavailable {
            program: "gh".into(),
            message: "not found".into(),
        };
        assert!(missing.is_tool_missing());
        assert!(!ProbeError::NoUpstream.is_tool_missing());
    }

    #[test]
    fn test_probe_issue_serializes_reason() {
        let issue = ProbeIssue::new(
            ProbeField::Upstream,
            ProbeError::NoUpstream,
        );
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"field\":\"upstream\""));
        assert!(json.contains("\"kind\":\"no_upstream\""));
    }
}
