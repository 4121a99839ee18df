//! Review records from the `gh` CLI.
//!
//! One `gh pr list` call per project returns every pull request (any state)
//! keyed by head branch. A worktree listing maps workspace paths to their
//! branches, and the two are joined into path-keyed [`ReviewStatus`] values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use arbor_core::{CheckRollup, Mergeable, ProbeError, ProbeResult, ReviewRecord, ReviewState, ReviewStatus};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::runner::{CommandSpec, SharedRunner};
use crate::worktree;

const JSON_FIELDS: &str = "number,state,headRefName,mergeable,statusCheckRollup,title";

/// One entry of `statusCheckRollup`.
///
/// Check runs carry `status` and `conclusion`; commit status contexts carry
/// `state`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Failing,
    Pending,
    Passing,
    Neutral,
}

impl CheckEntry {
    fn outcome(&self) -> Outcome {
        let upper = |v: &Option<String>| v.as_deref().unwrap_or("").to_ascii_uppercase();

        if self.state.is_some() {
            return match upper(&self.state).as_str() {
                "FAILURE" | "ERROR" => Outcome::Failing,
                "PENDING" | "EXPECTED" => Outcome::Pending,
                "SUCCESS" => Outcome::Passing,
                _ => Outcome::Neutral,
            };
        }

        let status = upper(&self.status);
        if !status.is_empty() && status != "COMPLETED" {
            return Outcome::Pending;
        }
        match upper(&self.conclusion).as_str() {
            "FAILURE" | "ERROR" | "TIMED_OUT" | "CANCELLED" | "ACTION_REQUIRED" | "STARTUP_FAILURE" => {
                Outcome::Failing
            }
            "SUCCESS" => Outcome::Passing,
            "" if status.is_empty() => Outcome::Pending,
            _ => Outcome::Neutral,
        }
    }
}

/// Reduce checks by priority: failing, then pending, then passing.
pub fn reduce_checks(checks: &[CheckEntry]) -> CheckRollup {
    let outcomes: Vec<Outcome> = checks.iter().map(CheckEntry::outcome).collect();
    if outcomes.contains(&Outcome::Failing) {
        CheckRollup::Failing
    } else if outcomes.contains(&Outcome::Pending) {
        CheckRollup::Pending
    } else if outcomes.contains(&Outcome::Passing) {
        CheckRollup::Passing
    } else {
        CheckRollup::Unknown
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    state: String,
    head_ref_name: String,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(default)]
    status_check_rollup: Option<Vec<CheckEntry>>,
}

impl RawPullRequest {
    fn into_record(self) -> Option<ReviewRecord> {
        let state = match self.state.to_ascii_uppercase().as_str() {
            "OPEN" => ReviewState::Open,
            "MERGED" => ReviewState::Merged,
            "CLOSED" => ReviewState::Closed,
            _ => return None,
        };
        let mergeable = match self.mergeable.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("MERGEABLE") => Mergeable::Mergeable,
            Some("CONFLICTING") => Mergeable::Conflicting,
            _ => Mergeable::Unknown,
        };
        Some(ReviewRecord {
            number: self.number,
            title: self.title,
            branch: self.head_ref_name,
            state,
            checks: reduce_checks(self.status_check_rollup.as_deref().unwrap_or_default()),
            mergeable,
        })
    }
}

/// Parse `gh pr list --json` output. Records in an unknown state are skipped.
pub fn parse_pull_requests(json: &str) -> ProbeResult<Vec<ReviewRecord>> {
    let raw: Vec<RawPullRequest> = serde_json::from_str(json)
        .map_err(|e| ProbeError::unparseable("gh pr list", format!("{e}")))?;
    Ok(raw.into_iter().filter_map(RawPullRequest::into_record).collect())
}

/// Index records by branch; the first record for a branch wins.
pub fn by_branch(records: Vec<ReviewRecord>) -> HashMap<String, ReviewRecord> {
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        map.entry(record.branch.clone()).or_insert(record);
    }
    map
}

/// Join workspace branches with review records.
///
/// Every workspace with a branch gets a status; a branch without a record is
/// [`ReviewStatus::NoPr`].
pub fn join(branches: &HashMap<PathBuf, String>, records: &HashMap<String, ReviewRecord>) -> HashMap<PathBuf, ReviewStatus> {
    branches
        .iter()
        .map(|(path, branch)| {
            let status = match records.get(branch) {
                Some(record) => ReviewStatus::Exists(record.clone()),
                None => ReviewStatus::NoPr,
            };
            (path.clone(), status)
        })
        .collect()
}

/// Fetches review records through the review CLI.
#[derive(Clone)]
pub struct ReviewFetcher {
    runner: SharedRunner,
    command: String,
    page_size: u32,
}

impl ReviewFetcher {
    pub fn new(runner: SharedRunner, command: impl Into<String>, page_size: u32) -> Self {
        Self {
            runner,
            command: command.into(),
            page_size,
        }
    }

    fn list_spec(&self, dir: &Path, head: Option<&str>, limit: u32) -> CommandSpec {
        let limit = limit.to_string();
        let mut args = vec!["pr", "list", "--state", "all", "--limit", limit.as_str()];
        if let Some(branch) = head {
            args.extend(["--head", branch]);
        }
        args.extend(["--json", JSON_FIELDS]);
        CommandSpec::new(self.command.as_str(), args).in_dir(dir)
    }

    /// Every review record of a project, keyed by branch.
    #[instrument(level = "debug", skip(self), fields(root = %root.display()))]
    pub async fn fetch_project(&self, root: &Path) -> ProbeResult<HashMap<String, ReviewRecord>> {
        let spec = self.list_spec(root, None, self.page_size);
        let output = self.runner.stdout(&spec).await?;
        let records = by_branch(parse_pull_requests(&output)?);
        debug!(count = records.len(), "fetched review records");
        Ok(records)
    }

    /// The newest review record for one branch.
    pub async fn fetch_branch(&self, dir: &Path, branch: &str) -> ProbeResult<Option<ReviewRecord>> {
        let spec = self.list_spec(dir, Some(branch), 1);
        let output = self.runner.stdout(&spec).await?;
        Ok(parse_pull_requests(&output)?.into_iter().next())
    }

    /// Checked-out branch of every worktree of a project.
    pub async fn branch_map(&self, root: &Path) -> ProbeResult<HashMap<PathBuf, String>> {
        let entries = worktree::list(self.runner.as_ref(), root).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| Some((e.path, e.branch?)))
            .collect())
    }

    /// Review status of every worktree of a project, keyed by path.
    pub async fn fetch_statuses(&self, root: &Path) -> ProbeResult<HashMap<PathBuf, ReviewStatus>> {
        let records = self.fetch_project(root).await?;
        let branches = self.branch_map(root).await?;
        Ok(join(&branches, &records))
    }
}
