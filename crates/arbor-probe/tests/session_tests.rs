//! Session registry behavior over a scripted tmux.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_core::{AgentStatus, ProbeField, SessionRole, Workspace, WorkspaceId};
use arbor_probe::testing::ScriptedRunner;
use arbor_probe::{CommandOutput, SessionRegistry, SessionSnapshot, tmux};
use chrono::Utc;

const LIST: [&str; 3] = [
    "list-sessions",
    "-F",
    "#{session_name}\t#{session_attached}\t#{@arbor_agent}",
];

fn workspace() -> Workspace {
    Workspace {
        id: WorkspaceId::new("api", "login"),
        path: PathBuf::from("/code/api-branches/login"),
        branch: Some("login".into()),
        last_modified: Utc::now(),
    }
}

fn registry(runner: &Arc<ScriptedRunner>) -> SessionRegistry {
    SessionRegistry::new(runner.clone())
}

#[tokio::test]
async fn test_no_server_means_no_sessions() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond(
        "tmux",
        &LIST,
        CommandOutput::failed(1, "no server running on /tmp/tmux-1000/default\n"),
    );
    let snapshot = registry(&runner).list_sessions().await.unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn test_probe_sessions_classifies_main_only() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond(
        "tmux",
        &["capture-pane", "-p", "-t", "dev-api-login"],
        CommandOutput::ok("Editing files… (esc to interrupt)\n"),
    );
    let snapshot = SessionSnapshot::parse(
        "dev-api-login\t0\tclaude\ndev-api-login-shell\t1\t\nother\t1\t\n",
    );

    let (sessions, issues) = registry(&runner).probe_sessions(&workspace(), &snapshot).await;
    assert!(issues.is_empty());
    assert_eq!(sessions.main.status, AgentStatus::Working);
    assert_eq!(sessions.main.agent_tool.as_deref(), Some("claude"));
    assert!(!sessions.main.attached);
    assert_eq!(sessions.shell.status, AgentStatus::Active);
    assert!(sessions.shell.attached);
    assert_eq!(sessions.get(SessionRole::Run).status, AgentStatus::NotRunning);
    assert_eq!(sessions.run.name, "dev-api-login-run");
    assert_eq!(runner.count("tmux", &["capture-pane"]), 1);
}

#[tokio::test]
async fn test_absent_main_session_is_not_captured() {
    let runner = Arc::new(ScriptedRunner::new());
    let (sessions, _) = registry(&runner)
        .probe_sessions(&workspace(), &SessionSnapshot::default())
        .await;
    assert_eq!(sessions.main.status, AgentStatus::NotRunning);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_capture_failure_is_recorded() {
    let runner = Arc::new(ScriptedRunner::new());
    let snapshot = SessionSnapshot::parse("dev-api-login\t0\t\n");
    let (sessions, issues) = registry(&runner).probe_sessions(&workspace(), &snapshot).await;
    assert_eq!(sessions.main.status, AgentStatus::Active);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, ProbeField::Activity);
}

#[tokio::test]
async fn test_kill_workspace_sessions_is_idempotent() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::failed(1, "can't find session: dev-api-login"));
    registry(&runner)
        .kill_workspace_sessions("api", "login")
        .await
        .unwrap();
    assert_eq!(runner.count("tmux", &["kill-session"]), 3);
    let targets: Vec<String> = runner.calls().iter().map(|c| c.args[2].clone()).collect();
    assert_eq!(
        targets,
        vec!["dev-api-login", "dev-api-login-shell", "dev-api-login-run"]
    );
}

#[tokio::test]
async fn test_kill_reports_real_failures() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::failed(1, "permission denied"));
    assert!(registry(&runner).kill("dev-api-login").await.is_err());
}

#[tokio::test]
async fn test_create_session_with_auto_exit_runs_command_directly() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::ok(""));
    registry(&runner)
        .create_session("dev-api-login-run", Path::new("/w"), Some("make test"), true)
        .await
        .unwrap();
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].args,
        vec!["new-session", "-d", "-s", "dev-api-login-run", "-c", "/w", "make test"]
    );
}

#[tokio::test]
async fn test_create_session_without_auto_exit_types_command() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::ok(""));
    registry(&runner)
        .create_session("dev-api-login-run", Path::new("/w"), Some("npm run dev"), false)
        .await
        .unwrap();
    assert_eq!(runner.count("tmux", &["new-session"]), 1);
    assert_eq!(
        runner.count("tmux", &["send-keys", "-t", "dev-api-login-run", "npm run dev", "Enter"]),
        1
    );
}

#[tokio::test]
async fn test_create_agent_session_tags_tool() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::ok(""));
    registry(&runner)
        .create_agent_session("dev-api-login", Path::new("/w"), "claude")
        .await
        .unwrap();
    assert_eq!(
        runner.count("tmux", &["set-option", "-t", "dev-api-login", "@arbor_agent", "claude"]),
        1
    );
}

#[tokio::test]
async fn test_create_failure_is_an_error() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.respond_any("tmux", CommandOutput::failed(1, "duplicate session: dev-api-login"));
    let err = registry(&runner)
        .create_session("dev-api-login", Path::new("/w"), None, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate session"));
}

#[tokio::test]
async fn test_attach_switches_client_inside_tmux() {
    let runner = ScriptedRunner::new();
    runner.respond_any("tmux", CommandOutput::ok(""));
    tmux::attach(&runner, "dev-api-login", true).await.unwrap();
    tmux::attach(&runner, "dev-api-login", false).await.unwrap();
    let calls = runner.interactive_calls();
    assert_eq!(calls[0].args[0], "switch-client");
    assert_eq!(calls[1].args[0], "attach-session");
}
