//! Workspace creation and archival over a temporary projects directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_core::SessionRole;
use arbor_engine::{CreateRequest, Lifecycle};
use arbor_probe::testing::ScriptedRunner;
use arbor_probe::{CommandOutput, Inventory, SessionRegistry};
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf, Arc<ScriptedRunner>, Lifecycle) {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().to_path_buf();
    std::fs::create_dir_all(base.join("api").join(".git")).unwrap();

    let runner = Arc::new(ScriptedRunner::new());
    let lifecycle = Lifecycle::new(
        Inventory::new(base.clone(), runner.clone()),
        SessionRegistry::new(runner.clone()),
        runner.clone(),
        vec!["main".into(), "master".into()],
    );
    (tmp, base, runner, lifecycle)
}

fn script_create(runner: &ScriptedRunner) {
    runner.respond(
        "git",
        &["rev-parse", "--verify", "--quiet", "master"],
        CommandOutput::ok("aaaa\n"),
    );
    runner.respond_any("tmux", CommandOutput::ok(""));
}

fn worktree_add_args(base: &Path) -> Vec<String> {
    let path = base.join("api-branches").join("login");
    vec![
        "worktree".into(),
        "add".into(),
        "-b".into(),
        "login".into(),
        path.to_string_lossy().into_owned(),
        "master".into(),
    ]
}

#[tokio::test]
async fn test_create_workspace_with_agent_and_run_session() {
    let (_tmp, base, runner, lifecycle) = setup();
    script_create(&runner);
    let args = worktree_add_args(&base);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    runner.respond("git", &args, CommandOutput::ok(""));
    std::fs::write(
        base.join("api").join(".arbor-run.yaml"),
        "setup:\n  - npm install\ncommand: npm run dev\nwatch: true\n",
    )
    .unwrap();

    let request = CreateRequest::new("api", "login").with_agent_tool("claude");
    let workspace = lifecycle.create_workspace(&request).await.unwrap();

    assert_eq!(workspace.id.to_string(), "api/login");
    assert_eq!(workspace.path, base.join("api-branches").join("login"));
    assert_eq!(workspace.branch.as_deref(), Some("login"));
    assert_eq!(runner.count("git", &args), 1);

    // main: new-session running the tool, tagged with it
    assert_eq!(runner.count("tmux", &["new-session", "-d", "-s", "dev-api-login"]), 1);
    assert_eq!(
        runner.count("tmux", &["set-option", "-t", "dev-api-login", "@arbor_agent", "claude"]),
        1
    );
    // run: watch mode keeps the shell, so the command is typed in
    assert_eq!(runner.count("tmux", &["new-session", "-d", "-s", "dev-api-login-run"]), 1);
    assert_eq!(
        runner.count(
            "tmux",
            &["send-keys", "-t", "dev-api-login-run", "npm install && npm run dev", "Enter"]
        ),
        1
    );
}

#[tokio::test]
async fn test_create_without_run_config_starts_only_main() {
    let (_tmp, base, runner, lifecycle) = setup();
    script_create(&runner);
    let args = worktree_add_args(&base);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    runner.respond("git", &args, CommandOutput::ok(""));

    assert!(lifecycle.create_workspace(&CreateRequest::new("api", "login")).await.is_some());
    assert_eq!(runner.count("tmux", &["new-session"]), 1);
    assert_eq!(runner.count("tmux", &["set-option"]), 0);
}

#[tokio::test]
async fn test_create_fails_without_base_branch() {
    let (_tmp, _base, runner, lifecycle) = setup();
    assert!(lifecycle.create_workspace(&CreateRequest::new("api", "login")).await.is_none());
    assert_eq!(runner.count("git", &["worktree", "add"]), 0);
}

#[tokio::test]
async fn test_create_fails_when_worktree_add_fails() {
    let (_tmp, _base, runner, lifecycle) = setup();
    script_create(&runner);
    assert!(lifecycle.create_workspace(&CreateRequest::new("api", "login")).await.is_none());
    assert_eq!(runner.count("tmux", &["new-session"]), 0);
}

#[tokio::test]
async fn test_create_rejects_existing_directory_and_unknown_project() {
    let (_tmp, base, _runner, lifecycle) = setup();
    std::fs::create_dir_all(base.join("api-branches").join("login")).unwrap();
    assert!(lifecycle.create_workspace(&CreateRequest::new("api", "login")).await.is_none());
    assert!(lifecycle.create_workspace(&CreateRequest::new("nope", "login")).await.is_none());
}

#[tokio::test]
async fn test_archive_moves_workspace_and_kills_sessions() {
    let (_tmp, base, runner, lifecycle) = setup();
    let dir = base.join("api-branches").join("login");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("notes.md"), "keep me").unwrap();
    runner.respond_any("tmux", CommandOutput::failed(1, "can't find session: dev-api-login"));
    runner.respond("git", &["worktree", "prune"], CommandOutput::ok(""));

    assert!(lifecycle.archive_workspace("api", "login").await);

    let archived = base.join("api-archived").join("login");
    assert!(!dir.exists());
    assert_eq!(std::fs::read_to_string(archived.join("notes.md")).unwrap(), "keep me");
    assert_eq!(runner.count("tmux", &["kill-session"]), 3);
    assert_eq!(runner.count("git", &["worktree", "prune"]), 1);
}

#[tokio::test]
async fn test_archive_missing_workspace_still_kills_sessions() {
    let (_tmp, base, runner, lifecycle) = setup();
    runner.respond_any("tmux", CommandOutput::ok(""));
    assert!(!lifecycle.archive_workspace("api", "ghost").await);

    for name in ["dev-api-ghost", "dev-api-ghost-shell", "dev-api-ghost-run"] {
        assert_eq!(runner.count("tmux", &["kill-session", "-t", name]), 1);
    }
    assert_eq!(runner.count("git", &["worktree", "prune"]), 0);
    assert!(!base.join("api-archived").exists());
}

#[tokio::test]
async fn test_archive_unknown_project_still_kills_sessions() {
    let (_tmp, _base, runner, lifecycle) = setup();
    runner.respond_any("tmux", CommandOutput::ok(""));
    assert!(!lifecycle.archive_workspace("gone", "login").await);
    assert_eq!(runner.count("tmux", &["kill-session"]), 3);
}

#[tokio::test]
async fn test_archive_refuses_to_overwrite() {
    let (_tmp, base, runner, lifecycle) = setup();
    std::fs::create_dir_all(base.join("api-branches").join("login")).unwrap();
    std::fs::create_dir_all(base.join("api-archived").join("login")).unwrap();
    runner.respond_any("tmux", CommandOutput::ok(""));
    assert!(!lifecycle.archive_workspace("api", "login").await);
    assert!(base.join("api-branches").join("login").exists());
}

#[tokio::test]
async fn test_ensure_shell_session_creates_only_when_missing() {
    let (_tmp, base, runner, lifecycle) = setup();
    let workspace = arbor_core::Workspace {
        id: arbor_core::WorkspaceId::new("api", "login"),
        path: base.join("api-branches").join("login"),
        branch: Some("login".into()),
        last_modified: chrono::Utc::now(),
    };
    runner.respond_any("tmux", CommandOutput::ok(""));
    runner.respond(
        "tmux",
        &["list-sessions", "-F", "#{session_name}\t#{session_attached}\t#{@arbor_agent}"],
        CommandOutput::ok("dev-api-login-shell\t0\t\n"),
    );

    assert!(lifecycle.ensure_session(&workspace, SessionRole::Shell, None).await);
    assert_eq!(runner.count("tmux", &["new-session"]), 0);

    assert!(lifecycle.ensure_session(&workspace, SessionRole::Main, Some("claude")).await);
    assert_eq!(runner.count("tmux", &["new-session", "-d", "-s", "dev-api-login"]), 1);
}
