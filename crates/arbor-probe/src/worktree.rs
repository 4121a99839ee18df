//! `git worktree` listing and maintenance.

use std::path::{Path, PathBuf};

use arbor_core::{ArborError, ProbeResult, Result};
use tracing::{debug, instrument};

use crate::runner::{CommandRunner, CommandSpec};

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    /// Short branch name (`refs/heads/` stripped)
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
}

/// Parse porcelain worktree output. Entries are separated by blank lines.
pub fn parse_porcelain(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines().map(str::trim_end) {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.extend(current.take());
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                bare: false,
                detached: false,
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = Some(head.to_string());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            entry.branch = Some(short.to_string());
        } else if line == "bare" {
            entry.bare = true;
        } else if line == "detached" {
            entry.detached = true;
        } else if line.is_empty() {
            entries.extend(current.take());
        }
    }
    entries.extend(current);
    entries
}

fn git(args: &[&str], cwd: &Path) -> CommandSpec {
    CommandSpec::new("git", args.iter().copied()).in_dir(cwd)
}

/// List the worktrees linked to a repository.
#[instrument(level = "debug", skip(runner), fields(repo = %repo.display()))]
pub async fn list(runner: &dyn CommandRunner, repo: &Path) -> ProbeResult<Vec<WorktreeEntry>> {
    let spec = git(&["worktree", "list", "--porcelain"], repo);
    let output = runner.stdout(&spec).await?;
    let entries = parse_porcelain(&output);
    debug!(count = entries.len(), "listed worktrees");
    Ok(entries)
}

/// Whether `name` resolves to a commit in `repo`.
pub async fn ref_exists(runner: &dyn CommandRunner, repo: &Path, name: &str) -> bool {
    let spec = git(&["rev-parse", "--verify", "--quiet", name], repo);
    matches!(runner.run(&spec).await, Ok(output) if output.success())
}

/// Create `path` as a new worktree on a new branch forked from `base`.
#[instrument(level = "debug", skip(runner), fields(repo = %repo.display()))]
pub async fn add(runner: &dyn CommandRunner, repo: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
    let path_arg = path.to_string_lossy();
    let spec = git(&["worktree", "add", "-b", branch, &path_arg, base], repo);
    runner
        .run(&spec)
        .await
        .map_err(ArborError::from)?
        .require_success(&spec)
        .map_err(|e| ArborError::worktree(path, e.to_string()))?;
    debug!(branch, "worktree added");
    Ok(())
}

/// Drop administrative entries for worktrees whose directories are gone.
pub async fn prune(runner: &dyn CommandRunner, repo: &Path) -> Result<()> {
    let spec = git(&["worktree", "prune"], repo);
    runner
        .run(&spec)
        .await
        .map_err(ArborError::from)?
        .require_success(&spec)
        .map_err(|e| ArborError::worktree(repo, e.to_string()))?;
    Ok(())
}
