//! Git probe behavior over scripted git output.

use std::sync::Arc;

use arbor_core::{ProbeError, ProbeField};
use arbor_probe::testing::ScriptedRunner;
use arbor_probe::{CommandOutput, GitProbe};
use tempfile::TempDir;

fn bases() -> Vec<String> {
    vec!["main".into(), "master".into()]
}

fn no_upstream(runner: &ScriptedRunner) {
    runner.respond(
        "git",
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        CommandOutput::failed(128, "fatal: no upstream configured for branch 'login'"),
    );
}

fn clean_worktree(runner: &ScriptedRunner) {
    runner.respond("git", &["status", "--porcelain"], CommandOutput::ok(""));
    runner.respond("git", &["diff", "--shortstat", "HEAD"], CommandOutput::ok(""));
    runner.respond(
        "git",
        &["ls-files", "--others", "--exclude-standard", "-z"],
        CommandOutput::ok(""),
    );
}

#[tokio::test]
async fn test_local_changes_without_remote() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    runner.respond(
        "git",
        &["status", "--porcelain"],
        CommandOutput::ok(" M src/a.rs\n M src/b.rs\n"),
    );
    runner.respond(
        "git",
        &["diff", "--shortstat", "HEAD"],
        CommandOutput::ok(" 2 files changed, 45 insertions(+), 12 deletions(-)\n"),
    );
    runner.respond(
        "git",
        &["ls-files", "--others", "--exclude-standard", "-z"],
        CommandOutput::ok(""),
    );
    runner.respond(
        "git",
        &["rev-parse", "--verify", "--quiet", "main"],
        CommandOutput::ok("aaaa\n"),
    );
    runner.respond("git", &["merge-base", "HEAD", "main"], CommandOutput::ok("bbbb\n"));
    runner.respond(
        "git",
        &["diff", "--shortstat", "bbbb", "HEAD"],
        CommandOutput::ok(" 4 files changed, 30 insertions(+), 5 deletions(-)\n"),
    );
    runner.respond("git", &["rev-list", "--count", "bbbb..HEAD"], CommandOutput::ok("3\n"));
    no_upstream(&runner);
    runner.respond(
        "git",
        &["rev-list", "--left-right", "--count", "HEAD...main"],
        CommandOutput::ok("3\t0\n"),
    );

    let probe = GitProbe::new(Arc::new(runner), bases());
    let report = probe.probe(tmp.path()).await.unwrap();
    let status = &report.status;

    assert!(status.has_changes);
    assert_eq!(status.modified_files, 2);
    assert_eq!(status.added_lines, 45);
    assert_eq!(status.deleted_lines, 12);
    assert_eq!(status.base_branch.as_deref(), Some("main"));
    assert!(status.diverged_from_base);
    assert_eq!(status.base_added_lines, 75);
    assert_eq!(status.base_deleted_lines, 17);
    assert!(!status.has_remote);
    assert_eq!(status.ahead, 3);
    assert_eq!(status.behind, 0);
    assert!(!status.is_pushed);
    assert_eq!(report.issue(ProbeField::Upstream), Some(&ProbeError::NoUpstream));
}

fn based_on_main(runner: &ScriptedRunner, shortstat: &str) {
    runner.respond("git", &["rev-parse", "--verify", "--quiet", "main"], CommandOutput::ok("aaaa\n"));
    runner.respond("git", &["merge-base", "HEAD", "main"], CommandOutput::ok("bbbb\n"));
    runner.respond("git", &["diff", "--shortstat", "bbbb", "HEAD"], CommandOutput::ok(shortstat));
}

#[tokio::test]
async fn test_commits_without_line_changes_still_diverge() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    clean_worktree(&runner);
    based_on_main(&runner, "");
    runner.respond("git", &["rev-list", "--count", "bbbb..HEAD"], CommandOutput::ok("1\n"));
    no_upstream(&runner);

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert!(report.status.diverged_from_base);
    assert_eq!(report.status.base_added_lines, 0);
    assert_eq!(report.issue(ProbeField::BaseDiff), None);
}

#[tokio::test]
async fn test_no_commits_since_merge_base_is_not_diverged() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    clean_worktree(&runner);
    based_on_main(&runner, "");
    runner.respond("git", &["rev-list", "--count", "bbbb..HEAD"], CommandOutput::ok("0\n"));
    no_upstream(&runner);

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert!(!report.status.diverged_from_base);
}

#[tokio::test]
async fn test_failed_commit_count_falls_back_to_line_diff() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    clean_worktree(&runner);
    based_on_main(&runner, " 1 file changed, 2 insertions(+)\n");
    no_upstream(&runner);

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert!(report.status.diverged_from_base);
    assert_eq!(report.status.base_added_lines, 2);
    assert!(matches!(
        report.issue(ProbeField::BaseDiff),
        Some(ProbeError::CommandFailed { .. })
    ));
}

#[tokio::test]
async fn test_fully_pushed_with_remote() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    clean_worktree(&runner);
    runner.respond(
        "git",
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        CommandOutput::ok("origin/login\n"),
    );
    runner.respond(
        "git",
        &["rev-list", "--left-right", "--count", "HEAD...@{u}"],
        CommandOutput::ok("0\t2\n"),
    );

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert!(report.status.has_remote);
    assert_eq!(report.status.behind, 2);
    assert!(report.status.is_pushed);
    assert!(matches!(
        report.issue(ProbeField::BaseBranch),
        Some(ProbeError::NoBaseBranch { .. })
    ));
}

#[tokio::test]
async fn test_untracked_lines_are_counted_best_effort() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "one\ntwo\nthree").unwrap();

    let runner = ScriptedRunner::new();
    clean_worktree(&runner);
    runner.respond(
        "git",
        &["ls-files", "--others", "--exclude-standard", "-z"],
        CommandOutput::ok("notes.txt\0vanished.txt\0"),
    );
    no_upstream(&runner);

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert_eq!(report.status.untracked_lines, 3);
    assert!(matches!(
        report.issue(ProbeField::UntrackedLines),
        Some(ProbeError::Io { .. })
    ));
}

#[tokio::test]
async fn test_failed_steps_default_without_aborting() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    runner.unavailable("git");

    let report = GitProbe::new(Arc::new(runner), bases())
        .probe(tmp.path())
        .await
        .unwrap();
    assert_eq!(report.status.modified_files, 0);
    assert!(!report.status.has_changes);
    assert!(report.issue(ProbeField::ModifiedFiles).unwrap().is_tool_missing());
    assert!(report.issue(ProbeField::WorkingDiff).is_some());
}

#[tokio::test]
async fn test_missing_workspace_fails_whole_probe() {
    let tmp = TempDir::new().unwrap();
    let probe = GitProbe::new(Arc::new(ScriptedRunner::new()), bases());
    let err = probe.probe(&tmp.path().join("gone")).await.unwrap_err();
    assert!(matches!(err, ProbeError::WorkspaceMissing { .. }));
}

#[tokio::test]
async fn test_diff_against_merge_base() {
    let tmp = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    runner.respond(
        "git",
        &["rev-parse", "--verify", "--quiet", "master"],
        CommandOutput::ok("aaaa\n"),
    );
    runner.respond("git", &["merge-base", "HEAD", "master"], CommandOutput::ok("cccc\n"));
    runner.respond("git", &["diff", "cccc"], CommandOutput::ok("diff --git a/x b/x\n"));

    let text = GitProbe::new(Arc::new(runner), bases())
        .diff_against_base(tmp.path())
        .await
        .unwrap();
    assert!(text.starts_with("diff --git"));
}
