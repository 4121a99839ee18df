//! Workspace discovery.
//!
//! Directory conventions under the projects directory:
//!
//! ```text
//! <base>/api/                 project root (a git repository)
//! <base>/api-branches/login/  workspace: a linked worktree, feature "login"
//! <base>/api-archived/spike/  archived workspace, never reconciled
//! ```
//!
//! A project's workspaces are the worktrees git reports for it that live
//! inside its `-branches` container.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use arbor_core::{ProbeResult, Workspace, WorkspaceId};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::runner::SharedRunner;
use crate::worktree;

/// Suffix of the directory holding a project's active worktrees.
pub const BRANCHES_SUFFIX: &str = "-branches";

/// Suffix of the directory holding a project's archived worktrees.
pub const ARCHIVED_SUFFIX: &str = "-archived";

/// A top-level version-controlled project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// `<base>/<name>-branches`
    pub fn branches_dir(&self) -> PathBuf {
        self.sibling(BRANCHES_SUFFIX)
    }

    /// `<base>/<name>-archived`
    pub fn archived_dir(&self) -> PathBuf {
        self.sibling(ARCHIVED_SUFFIX)
    }

    /// Directory a workspace for `feature` lives in.
    pub fn workspace_path(&self, feature: &str) -> PathBuf {
        self.branches_dir().join(feature)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let parent = self.root.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{}{suffix}", self.name))
    }
}

/// Enumerates projects and their workspaces.
#[derive(Clone)]
pub struct Inventory {
    base_dir: PathBuf,
    runner: SharedRunner,
}

impl Inventory {
    pub fn new(base_dir: impl Into<PathBuf>, runner: SharedRunner) -> Self {
        Self {
            base_dir: base_dir.into(),
            runner,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Immediate subdirectories that are git roots and not containers.
    ///
    /// A missing base directory yields no projects.
    pub async fn projects(&self) -> Vec<Project> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(base = %self.base_dir.display(), error = %e, "projects directory unreadable");
                return Vec::new();
            }
        };

        let mut projects = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(base = %self.base_dir.display(), error = %e, "projects directory scan cut short");
                    break;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let path = entry.path();
            if is_project_dir(&name, &path).await {
                projects.push(Project::new(name, path));
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    /// Look up a project by name.
    pub async fn project(&self, name: &str) -> Option<Project> {
        self.projects().await.into_iter().find(|p| p.name == name)
    }

    /// Workspaces of every project, most recently modified first.
    ///
    /// A project whose worktree query fails contributes nothing; the others
    /// are unaffected.
    #[instrument(level = "debug", skip(self), fields(base = %self.base_dir.display()))]
    pub async fn workspaces(&self) -> Vec<Workspace> {
        let mut all = Vec::new();
        for project in self.projects().await {
            match self.project_workspaces(&project).await {
                Ok(found) => all.extend(found),
                Err(e) => warn!(project = %project.name, error = %e, "worktree listing failed"),
            }
        }
        sort_by_recency(&mut all);
        debug!(count = all.len(), "inventory complete");
        all
    }

    /// Workspaces of one project.
    pub async fn project_workspaces(&self, project: &Project) -> ProbeResult<Vec<Workspace>> {
        let entries = worktree::list(self.runner.as_ref(), &project.root).await?;
        let branches_dir = project.branches_dir();
        let canonical = tokio::fs::canonicalize(&branches_dir).await.ok();

        let mut workspaces = Vec::new();
        for entry in entries {
            let inside = entry.path.starts_with(&branches_dir)
                || canonical.as_ref().is_some_and(|dir| entry.path.starts_with(dir));
            if !inside || entry.bare {
                continue;
            }
            let Some(feature) = entry.path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let last_modified = modified_time(&entry.path).await;
            workspaces.push(Workspace {
                id: WorkspaceId::new(&project.name, feature),
                branch: entry.branch.clone(),
                path: entry.path.clone(),
                last_modified,
            });
        }
        Ok(workspaces)
    }
}

fn is_project_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(BRANCHES_SUFFIX) && !name.ends_with(ARCHIVED_SUFFIX)
}

async fn is_project_dir(name: &str, path: &Path) -> bool {
    is_project_name(name)
        && tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
        && tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false)
}

async fn modified_time(path: &Path) -> DateTime<Utc> {
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified)
}

/// Newest first; ties broken by identity for a stable order.
pub fn sort_by_recency(workspaces: &mut [Workspace]) {
    workspaces.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    });
}
