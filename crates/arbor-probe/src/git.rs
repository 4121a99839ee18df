//! Git status probe.
//!
//! [`GitProbe::probe`] runs a fixed sequence of git queries against one
//! workspace. Each step is independent: a failing step records a
//! [`ProbeIssue`] and leaves its fields at zero, and the remaining steps still
//! run. Only a missing workspace directory fails the whole probe.

use std::path::Path;

use arbor_core::{GitStatus, ProbeError, ProbeField, ProbeIssue, ProbeResult};
use tracing::{debug, instrument};

use crate::runner::{CommandSpec, SharedRunner};
use crate::worktree;

/// Outcome of probing one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitReport {
    pub status: GitStatus,
    pub issues: Vec<ProbeIssue>,
}

impl GitReport {
    /// The recorded reason a field defaulted, if any.
    pub fn issue(&self, field: ProbeField) -> Option<&ProbeError> {
        self.issues.iter().find(|i| i.field == field).map(|i| &i.error)
    }
}

/// Line counts from `git diff --shortstat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortStat {
    pub files: u32,
    pub insertions: u64,
    pub deletions: u64,
}

impl ShortStat {
    pub fn is_empty(&self) -> bool {
        self.insertions == 0 && self.deletions == 0
    }
}

/// Parse ` 3 files changed, 45 insertions(+), 12 deletions(-)`.
///
/// Blank input is an empty diff. Any segment without a leading number makes
/// the whole line unparseable.
pub fn parse_shortstat(text: &str) -> Option<ShortStat> {
    let mut stat = ShortStat::default();
    let text = text.trim();
    if text.is_empty() {
        return Some(stat);
    }
    for segment in text.split(',') {
        let mut words = segment.split_whitespace();
        let count: u64 = words.next()?.parse().ok()?;
        let kind = words.next()?;
        if kind.starts_with("file") {
            stat.files = u32::try_from(count).ok()?;
        } else if kind.starts_with("insertion") {
            stat.insertions = count;
        } else if kind.starts_with("deletion") {
            stat.deletions = count;
        }
    }
    Some(stat)
}

/// Parse `git rev-list --left-right --count` output (`ahead\tbehind`).
pub fn parse_left_right(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Number of lines in a file's contents, counting an unterminated last line.
pub fn count_lines(bytes: &[u8]) -> u64 {
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u64;
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

/// Probes git state for workspaces.
#[derive(Clone)]
pub struct GitProbe {
    runner: SharedRunner,
    base_branches: Vec<String>,
}

impl GitProbe {
    pub fn new(runner: SharedRunner, base_branches: Vec<String>) -> Self {
        Self {
            runner,
            base_branches,
        }
    }

    fn git(path: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new("git", args.iter().copied()).in_dir(path)
    }

    async fn git_stdout(&self, path: &Path, args: &[&str]) -> ProbeResult<String> {
        self.runner.stdout(&Self::git(path, args)).await
    }

    async fn git_output(&self, path: &Path, args: &[&str]) -> ProbeResult<String> {
        let spec = Self::git(path, args);
        self.runner.run(&spec).await?.require_output(&spec)
    }

    async fn shortstat(&self, path: &Path, args: &[&str]) -> ProbeResult<ShortStat> {
        let output = self.git_stdout(path, args).await?;
        parse_shortstat(&output).ok_or_else(|| ProbeError::unparseable(format!("git {}", args.join(" ")), output.trim()))
    }

    async fn left_right(&self, path: &Path, range: &str) -> ProbeResult<(u32, u32)> {
        let args = ["rev-list", "--left-right", "--count", range];
        let output = self.git_output(path, &args).await?;
        parse_left_right(&output).ok_or_else(|| ProbeError::unparseable(format!("git {}", args.join(" ")), output.trim()))
    }

    /// Probe one workspace.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub async fn probe(&self, path: &Path) -> ProbeResult<GitReport> {
        if !tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
            return Err(ProbeError::WorkspaceMissing {
                path: path.to_path_buf(),
            });
        }

        let mut status = GitStatus::default();
        let mut issues = Vec::new();
        let mut note = |field, error| issues.push(ProbeIssue::new(field, error));

        match self.git_stdout(path, &["status", "--porcelain"]).await {
            Ok(output) => {
                let count = output.lines().filter(|l| !l.trim().is_empty()).count();
                status.modified_files = u32::try_from(count).unwrap_or(u32::MAX);
                status.has_changes = count > 0;
            }
            Err(e) => note(ProbeField::ModifiedFiles, e),
        }

        match self.shortstat(path, &["diff", "--shortstat", "HEAD"]).await {
            Ok(stat) => {
                status.added_lines = stat.insertions;
                status.deleted_lines = stat.deletions;
            }
            Err(e) => note(ProbeField::WorkingDiff, e),
        }

        match self.untracked_lines(path).await {
            Ok((lines, unreadable)) => {
                status.untracked_lines = lines;
                if let Some(e) = unreadable {
                    note(ProbeField::UntrackedLines, e);
                }
            }
            Err(e) => note(ProbeField::UntrackedLines, e),
        }

        let base = self.resolve_base_branch(path).await;
        match &base {
            Some(branch) => match self.merge_base(path, branch).await {
                Ok(merge_base) => {
                    match self.shortstat(path, &["diff", "--shortstat", &merge_base, "HEAD"]).await {
                        Ok(stat) => {
                            status.diverged_from_base = !stat.is_empty();
                            status.base_added_lines =
                                stat.insertions + status.added_lines + status.untracked_lines;
                            status.base_deleted_lines = stat.deletions + status.deleted_lines;
                        }
                        Err(e) => note(ProbeField::BaseDiff, e),
                    }
                    // commits without a line diff still diverge
                    match self.commits_since(path, &merge_base).await {
                        Ok(count) => status.diverged_from_base = count > 0,
                        Err(e) => note(ProbeField::BaseDiff, e),
                    }
                }
                Err(e) => note(ProbeField::BaseDiff, e),
            },
            None => note(
                ProbeField::BaseBranch,
                ProbeError::NoBaseBranch {
                    candidates: self.base_branches.clone(),
                },
            ),
        }
        status.base_branch = base.clone();

        match self.upstream(path).await {
            Ok(_) => match self.left_right(path, "HEAD...@{u}").await {
                Ok((ahead, behind)) => {
                    status.has_remote = true;
                    status.ahead = ahead;
                    status.behind = behind;
                }
                Err(e) => {
                    status.has_remote = true;
                    note(ProbeField::AheadBehind, e);
                }
            },
            Err(e) => {
                note(ProbeField::Upstream, e);
                if let Some(branch) = &base {
                    match self.left_right(path, &format!("HEAD...{branch}")).await {
                        Ok((ahead, behind)) => {
                            status.ahead = ahead;
                            status.behind = behind;
                        }
                        Err(e) => note(ProbeField::AheadBehind, e),
                    }
                }
            }
        }

        let status = status.settle();
        debug!(
            modified = status.modified_files,
            ahead = status.ahead,
            behind = status.behind,
            issues = issues.len(),
            "git probe complete"
        );
        Ok(GitReport { status, issues })
    }

    /// First candidate base branch that exists in the workspace's repository.
    pub async fn resolve_base_branch(&self, path: &Path) -> Option<String> {
        for candidate in &self.base_branches {
            if worktree::ref_exists(self.runner.as_ref(), path, candidate).await {
                return Some(candidate.clone());
            }
        }
        None
    }

    async fn merge_base(&self, path: &Path, branch: &str) -> ProbeResult<String> {
        let output = self.git_output(path, &["merge-base", "HEAD", branch]).await?;
        Ok(output.trim().to_string())
    }

    async fn commits_since(&self, path: &Path, merge_base: &str) -> ProbeResult<u32> {
        let range = format!("{merge_base}..HEAD");
        let args = ["rev-list", "--count", range.as_str()];
        let output = self.git_output(path, &args).await?;
        output
            .trim()
            .parse()
            .map_err(|_| ProbeError::unparseable(format!("git {}", args.join(" ")), output.trim()))
    }

    async fn upstream(&self, path: &Path) -> ProbeResult<String> {
        let args = ["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"];
        match self.git_output(path, &args).await {
            Ok(name) => Ok(name.trim().to_string()),
            Err(ProbeError::CommandFailed { .. } | ProbeError::EmptyOutput { .. }) => {
                Err(ProbeError::NoUpstream)
            }
            Err(e) => Err(e),
        }
    }

    /// Total lines in untracked files, plus the first read failure if any.
    async fn untracked_lines(&self, path: &Path) -> ProbeResult<(u64, Option<ProbeError>)> {
        let output = self
            .git_stdout(path, &["ls-files", "--others", "--exclude-standard", "-z"])
            .await?;

        let mut total = 0;
        let mut first_failure = None;
        for name in output.split('\0').filter(|n| !n.is_empty()) {
            let file = path.join(name);
            match tokio::fs::read(&file).await {
                Ok(bytes) => total += count_lines(&bytes),
                Err(e) => {
                    first_failure.get_or_insert(ProbeError::Io {
                        path: file,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok((total, first_failure))
    }

    /// Unified diff of the working tree against the merge-base with the base
    /// branch, or against HEAD when no base branch resolves.
    pub async fn diff_against_base(&self, path: &Path) -> ProbeResult<String> {
        let from = match self.resolve_base_branch(path).await {
            Some(branch) => self.merge_base(path, &branch).await?,
            None => "HEAD".to_string(),
        };
        self.git_stdout(path, &["diff", &from]).await
    }
}
