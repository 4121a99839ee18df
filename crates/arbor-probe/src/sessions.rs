//! Session registry: naming, lifecycle and status of workspace sessions.
//!
//! Every workspace owns up to three tmux sessions:
//!
//! | Role  | Name                          |
//! |-------|-------------------------------|
//! | main  | `dev-{project}-{feature}`     |
//! | shell | `dev-{project}-{feature}-shell` |
//! | run   | `dev-{project}-{feature}-run`   |
//!
//! Only the main session's pane is classified; shell and run sessions are
//! `active` while attached and `idle` while detached.

use std::path::Path;

use arbor_core::{
    AgentStatus, ProbeField, ProbeIssue, ProbeResult, Result, SessionInfo, SessionRole, SessionSet,
    Workspace,
};
use tracing::{debug, info, instrument};

use crate::activity;
use crate::runner::SharedRunner;
use crate::tmux::{self, AGENT_OPTION, SessionSnapshot};

/// Deterministic tmux session name for a workspace role.
///
/// tmux treats `.` and `:` as target separators, so both become `_`.
pub fn session_name(project: &str, feature: &str, role: SessionRole) -> String {
    sanitize(&format!("dev-{project}-{feature}{}", role.suffix()))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '.' | ':') { '_' } else { c })
        .collect()
}

/// Result of picking the agent tool for a new main session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentChoice {
    Selected(String),
    /// Several tools are installed and none is the default; the caller asks.
    Ambiguous(Vec<String>),
    Unavailable,
}

/// Pick an agent tool among the configured ones.
///
/// The configured default wins when installed; otherwise a single installed
/// tool is selected automatically.
pub fn choose_agent_tool(
    configured: &[String],
    default: Option<&str>,
    is_available: impl Fn(&str) -> bool,
) -> AgentChoice {
    let installed: Vec<String> = configured
        .iter()
        .filter(|tool| is_available(tool))
        .cloned()
        .collect();

    if let Some(default) = default.filter(|d| installed.iter().any(|t| t == d)) {
        return AgentChoice::Selected(default.to_string());
    }
    match installed.len() {
        0 => AgentChoice::Unavailable,
        1 => AgentChoice::Selected(installed[0].clone()),
        _ => AgentChoice::Ambiguous(installed),
    }
}

/// Whether `program` resolves on `PATH`.
pub fn tool_on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Creates, attaches, kills and inspects workspace sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    runner: SharedRunner,
}

impl SessionRegistry {
    pub fn new(runner: SharedRunner) -> Self {
        Self { runner }
    }

    /// Current sessions on the tmux server.
    pub async fn list_sessions(&self) -> ProbeResult<SessionSnapshot> {
        tmux::list_sessions(self.runner.as_ref()).await
    }

    /// Create a detached session.
    ///
    /// With `auto_exit` the session closes when `command` finishes; without
    /// it the command is typed into a login shell that stays open afterwards.
    #[instrument(level = "debug", skip(self, command), fields(dir = %cwd.display()))]
    pub async fn create_session(&self, name: &str, cwd: &Path, command: Option<&str>, auto_exit: bool) -> Result<()> {
        let runner = self.runner.as_ref();
        match command {
            Some(cmd) if auto_exit => tmux::new_session(runner, name, cwd, Some(cmd)).await?,
            Some(cmd) => {
                tmux::new_session(runner, name, cwd, None).await?;
                tmux::send_keys(runner, name, cmd).await?;
            }
            None => tmux::new_session(runner, name, cwd, None).await?,
        }
        info!(session = name, "session created");
        Ok(())
    }

    /// Create the main session running `tool` and tag it with the tool name.
    pub async fn create_agent_session(&self, name: &str, cwd: &Path, tool: &str) -> Result<()> {
        self.create_session(name, cwd, Some(tool), false).await?;
        self.set_session_option(name, AGENT_OPTION, tool).await
    }

    /// Hand the terminal to `name`, blocking until the user detaches.
    pub async fn attach_interactive(&self, name: &str) -> Result<()> {
        let inside_tmux = std::env::var_os("TMUX").is_some();
        tmux::attach(self.runner.as_ref(), name, inside_tmux).await
    }

    /// Kill a session; absent sessions are fine.
    pub async fn kill(&self, name: &str) -> Result<()> {
        tmux::kill_session(self.runner.as_ref(), name).await
    }

    /// Kill every role session of a workspace.
    ///
    /// All three kills are attempted; the first failure is returned.
    pub async fn kill_workspace_sessions(&self, project: &str, feature: &str) -> Result<()> {
        let mut first_error = None;
        for role in SessionRole::ALL {
            let name = session_name(project, feature, role);
            if let Err(e) = self.kill(&name).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn set_option(&self, option: &str, value: &str) -> Result<()> {
        tmux::set_option(self.runner.as_ref(), option, value).await
    }

    pub async fn set_session_option(&self, name: &str, option: &str, value: &str) -> Result<()> {
        tmux::set_session_option(self.runner.as_ref(), name, option, value).await
    }

    /// Status of the main session's agent, given that it exists.
    pub async fn detect_activity(&self, name: &str) -> ProbeResult<AgentStatus> {
        let content = tmux::capture_pane(self.runner.as_ref(), name).await?;
        Ok(activity::classify(&content))
    }

    /// Build the session set of a workspace from a server snapshot.
    ///
    /// A failed pane capture leaves the main session `active` and records
    /// the reason.
    #[instrument(level = "debug", skip_all, fields(workspace = %workspace.id))]
    pub async fn probe_sessions(&self, workspace: &Workspace, snapshot: &SessionSnapshot) -> (SessionSet, Vec<ProbeIssue>) {
        let mut issues = Vec::new();
        let info = |role| {
            let name = session_name(workspace.project(), workspace.feature(), role);
            match snapshot.get(&name) {
                Some(entry) => SessionInfo {
                    name,
                    role,
                    attached: entry.attached,
                    agent_tool: entry.agent_tool.clone(),
                    status: if entry.attached {
                        AgentStatus::Active
                    } else {
                        AgentStatus::Idle
                    },
                },
                None => SessionInfo::absent(name, role),
            }
        };

        let mut main = info(SessionRole::Main);
        if main.is_running() {
            match self.detect_activity(&main.name).await {
                Ok(status) => main.status = status,
                Err(e) => {
                    main.status = AgentStatus::Active;
                    issues.push(ProbeIssue::new(ProbeField::Activity, e));
                }
            }
        }

        let set = SessionSet {
            main,
            shell: info(SessionRole::Shell),
            run: info(SessionRole::Run),
        };
        debug!(main = %set.main.status, "sessions probed");
        (set, issues)
    }
}
