//! tmux command wrappers.
//!
//! Thin functions over `tmux` subcommands. Everything goes through a
//! [`CommandRunner`] so the session registry can be exercised without a tmux
//! server.

use std::path::Path;

use arbor_core::{ArborError, ProbeError, ProbeResult, Result};
use tracing::{debug, instrument, warn};

use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// User option holding the agent tool a session was created with.
pub const AGENT_OPTION: &str = "@arbor_agent";

const LIST_FORMAT: &str = "#{session_name}\t#{session_attached}\t#{@arbor_agent}";

/// One line of `tmux list-sessions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub name: String,
    pub attached: bool,
    pub agent_tool: Option<String>,
}

/// Sessions known to the tmux server at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    entries: Vec<SessionEntry>,
}

impl SessionSnapshot {
    pub fn new(entries: Vec<SessionEntry>) -> Self {
        Self { entries }
    }

    /// Parse `name\tattached\tagent` lines. Lines without a name are skipped.
    pub fn parse(output: &str) -> Self {
        let entries = output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let name = fields.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let attached = fields
                    .next()
                    .and_then(|n| n.trim().parse::<u32>().ok())
                    .is_some_and(|n| n > 0);
                let agent_tool = fields
                    .next()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from);
                Some(SessionEntry {
                    name: name.to_string(),
                    attached,
                    agent_tool,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&SessionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn tmux<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("tmux", args)
}

/// No server running means no sessions, not a failure.
fn no_server(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("no server running") || stderr.contains("error connecting to")
}

fn missing_session(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("can't find session") || stderr.contains("session not found") || no_server(output)
}

async fn checked(runner: &dyn CommandRunner, session: &str, spec: CommandSpec) -> Result<()> {
    let output = runner.run(&spec).await.map_err(ArborError::from)?;
    if !output.success() {
        return Err(ArborError::session(
            session,
            format!("{} failed: {}", spec, output.stderr.trim()),
        ));
    }
    Ok(())
}

/// Snapshot of every session on the server.
#[instrument(level = "debug", skip_all)]
pub async fn list_sessions(runner: &dyn CommandRunner) -> ProbeResult<SessionSnapshot> {
    let spec = tmux(["list-sessions", "-F", LIST_FORMAT]);
    let output = runner.run(&spec).await?;
    if !output.success() {
        if no_server(&output) {
            return Ok(SessionSnapshot::default());
        }
        return Err(ProbeError::command_failed(
            spec.to_string(),
            output.code,
            output.stderr.trim(),
        ));
    }
    let snapshot = SessionSnapshot::parse(&output.stdout);
    debug!(count = snapshot.len(), "listed tmux sessions");
    Ok(snapshot)
}

/// Create a detached session, optionally running `command` in it.
#[instrument(level = "debug", skip(runner, command), fields(dir = %working_dir.display()))]
pub async fn new_session(
    runner: &dyn CommandRunner,
    session: &str,
    working_dir: &Path,
    command: Option<&str>,
) -> Result<()> {
    let dir = working_dir.to_string_lossy().into_owned();
    let mut args = vec!["new-session", "-d", "-s", session, "-c", dir.as_str()];
    if let Some(cmd) = command {
        args.push(cmd);
    }
    checked(runner, session, tmux(args)).await?;
    debug!("created tmux session");
    Ok(())
}

/// Type `keys` into the session followed by Enter.
#[instrument(level = "debug", skip(runner, keys))]
pub async fn send_keys(runner: &dyn CommandRunner, session: &str, keys: &str) -> Result<()> {
    checked(runner, session, tmux(["send-keys", "-t", session, keys, "Enter"])).await
}

/// Kill a session. An absent session is not an error.
#[instrument(level = "debug", skip(runner))]
pub async fn kill_session(runner: &dyn CommandRunner, session: &str) -> Result<()> {
    let output = runner
        .run(&tmux(["kill-session", "-t", session]))
        .await
        .map_err(ArborError::from)?;
    if output.success() {
        debug!("killed tmux session");
    } else if !missing_session(&output) {
        warn!(stderr = %output.stderr.trim(), "kill-session failed");
        return Err(ArborError::session(session, output.stderr.trim()));
    }
    Ok(())
}

/// Set a server-wide option.
pub async fn set_option(runner: &dyn CommandRunner, option: &str, value: &str) -> Result<()> {
    checked(runner, "tmux", tmux(["set-option", "-g", option, value])).await
}

/// Set an option on one session.
pub async fn set_session_option(runner: &dyn CommandRunner, session: &str, option: &str, value: &str) -> Result<()> {
    checked(runner, session, tmux(["set-option", "-t", session, option, value])).await
}

/// Visible content of the session's active pane.
#[instrument(level = "debug", skip(runner))]
pub async fn capture_pane(runner: &dyn CommandRunner, session: &str) -> ProbeResult<String> {
    runner.stdout(&tmux(["capture-pane", "-p", "-t", session])).await
}

/// Hand the terminal to `session` until the user detaches.
///
/// Inside tmux the current client switches instead of nesting.
#[instrument(level = "debug", skip(runner))]
pub async fn attach(runner: &dyn CommandRunner, session: &str, inside_tmux: bool) -> Result<()> {
    let spec = if inside_tmux {
        tmux(["switch-client", "-t", session])
    } else {
        tmux(["attach-session", "-t", session])
    };
    let output = runner.run_interactive(&spec).await.map_err(ArborError::from)?;
    if !output.success() {
        return Err(ArborError::session(
            session,
            format!("{spec} exited with {:?}", output.code),
        ));
    }
    Ok(())
}
