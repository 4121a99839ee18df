//! Workspace creation and archival.
//!
//! Both actions return sentinels (`Option` / `bool`) instead of errors so a
//! caller can branch without error handling; the reason for a failure is
//! logged.

use std::path::Path;

use arbor_config::RunConfig;
use arbor_core::{SessionRole, Workspace, WorkspaceId, log_workspace_event};
use arbor_probe::{Inventory, Project, SessionRegistry, SharedRunner, session_name, worktree};
use chrono::Utc;
use tracing::{debug, warn};

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub project: String,
    pub feature: String,
    /// Branch to fork from; the first existing base candidate when `None`
    pub base: Option<String>,
    /// Agent tool for the main session; a plain shell when `None`
    pub agent_tool: Option<String>,
}

impl CreateRequest {
    pub fn new(project: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            feature: feature.into(),
            base: None,
            agent_tool: None,
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_agent_tool(mut self, tool: impl Into<String>) -> Self {
        self.agent_tool = Some(tool.into());
        self
    }
}

/// Creates and archives workspaces.
#[derive(Clone)]
pub struct Lifecycle {
    inventory: Inventory,
    sessions: SessionRegistry,
    runner: SharedRunner,
    base_branches: Vec<String>,
}

impl Lifecycle {
    pub fn new(inventory: Inventory, sessions: SessionRegistry, runner: SharedRunner, base_branches: Vec<String>) -> Self {
        Self {
            inventory,
            sessions,
            runner,
            base_branches,
        }
    }

    async fn find_project(&self, name: &str) -> Option<Project> {
        let project = self.inventory.project(name).await;
        if project.is_none() {
            warn!(project = name, "no such project");
        }
        project
    }

    async fn resolve_base(&self, project: &Project, requested: Option<&str>) -> Option<String> {
        if let Some(base) = requested {
            return Some(base.to_string());
        }
        for candidate in &self.base_branches {
            if worktree::ref_exists(self.runner.as_ref(), &project.root, candidate).await {
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Create the worktree, its main session and, when the project has a run
    /// configuration, its run session.
    ///
    /// Returns `None` if the worktree could not be created. Session failures
    /// after that are logged and do not undo the worktree.
    pub async fn create_workspace(&self, request: &CreateRequest) -> Option<Workspace> {
        let project = self.find_project(&request.project).await?;
        let path = project.workspace_path(&request.feature);
        if tokio::fs::try_exists(&path).await.unwrap_or(true) {
            warn!(path = %path.display(), "workspace directory already exists");
            return None;
        }

        let Some(base) = self.resolve_base(&project, request.base.as_deref()).await else {
            warn!(project = %project.name, candidates = ?self.base_branches, "no base branch to fork from");
            return None;
        };

        let branches_dir = project.branches_dir();
        if let Err(e) = tokio::fs::create_dir_all(&branches_dir).await {
            warn!(path = %branches_dir.display(), error = %e, "cannot create branches directory");
            return None;
        }
        if let Err(e) = worktree::add(self.runner.as_ref(), &project.root, &path, &request.feature, &base).await {
            warn!(error = %e, "worktree add failed");
            return None;
        }

        self.start_main_session(&project.name, &request.feature, &path, request.agent_tool.as_deref())
            .await;
        self.start_run_session(&project, &request.feature, &path).await;

        log_workspace_event!(project.name.as_str(), request.feature.as_str(), "created");
        Some(Workspace {
            id: WorkspaceId::new(&project.name, &request.feature),
            path,
            branch: Some(request.feature.clone()),
            last_modified: Utc::now(),
        })
    }

    async fn start_main_session(&self, project: &str, feature: &str, path: &Path, tool: Option<&str>) -> bool {
        let name = session_name(project, feature, SessionRole::Main);
        let result = match tool {
            Some(tool) => self.sessions.create_agent_session(&name, path, tool).await,
            None => self.sessions.create_session(&name, path, None, false).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %name, error = %e, "main session not started");
                false
            }
        }
    }

    async fn start_run_session(&self, project: &Project, feature: &str, path: &Path) -> bool {
        let config = match RunConfig::load(&project.root).await {
            Ok(Some(config)) => config,
            Ok(None) => return false,
            Err(e) => {
                warn!(project = %project.name, error = %e, "run configuration unreadable");
                return false;
            }
        };
        let name = session_name(&project.name, feature, SessionRole::Run);
        let line = config.shell_line();
        match self.sessions.create_session(&name, path, Some(&line), config.auto_exit()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %name, error = %e, "run session not started");
                false
            }
        }
    }

    /// Make sure the session for `role` exists, creating it if needed.
    ///
    /// Main sessions start `agent_tool`; run sessions need a run
    /// configuration; shell sessions are a plain shell.
    pub async fn ensure_session(&self, workspace: &Workspace, role: SessionRole, agent_tool: Option<&str>) -> bool {
        let name = session_name(workspace.project(), workspace.feature(), role);
        match self.sessions.list_sessions().await {
            Ok(snapshot) if snapshot.contains(&name) => return true,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "session list unavailable, creating anyway"),
        }

        match role {
            SessionRole::Main => {
                self.start_main_session(workspace.project(), workspace.feature(), &workspace.path, agent_tool)
                    .await
            }
            SessionRole::Run => match self.inventory.project(workspace.project()).await {
                Some(project) => self.start_run_session(&project, workspace.feature(), &workspace.path).await,
                None => false,
            },
            SessionRole::Shell => match self.sessions.create_session(&name, &workspace.path, None, false).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(session = %name, error = %e, "shell session not started");
                    false
                }
            },
        }
    }

    /// Kill the workspace's sessions, move it under the archive directory and
    /// prune git's worktree records.
    ///
    /// Sessions are killed even when the directory is gone. Returns `false`
    /// if the workspace does not exist or could not be moved.
    pub async fn archive_workspace(&self, project: &str, feature: &str) -> bool {
        if let Err(e) = self.sessions.kill_workspace_sessions(project, feature).await {
            warn!(error = %e, "session cleanup incomplete");
        }

        let Some(project) = self.find_project(project).await else {
            return false;
        };
        let path = project.workspace_path(feature);
        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            warn!(path = %path.display(), "no workspace to archive");
            return false;
        }

        let archived_dir = project.archived_dir();
        let target = archived_dir.join(feature);
        if tokio::fs::try_exists(&target).await.unwrap_or(true) {
            warn!(target = %target.display(), "archive target already exists");
            return false;
        }
        if let Err(e) = tokio::fs::create_dir_all(&archived_dir).await {
            warn!(path = %archived_dir.display(), error = %e, "cannot create archive directory");
            return false;
        }
        if let Err(e) = tokio::fs::rename(&path, &target).await {
            warn!(from = %path.display(), to = %target.display(), error = %e, "move failed");
            return false;
        }

        if let Err(e) = worktree::prune(self.runner.as_ref(), &project.root).await {
            warn!(error = %e, "worktree prune failed");
        }
        log_workspace_event!(project.name.as_str(), feature, "archived");
        true
    }
}
