//! Per-project run configuration.
//!
//! A project may carry `.arbor-run.yaml` at its root describing how the
//! `run` session of each workspace is started:
//!
//! ```yaml
//! setup:
//!   - npm install
//! command: npm run dev
//! watch: true
//! ```

use std::path::{Path, PathBuf};

use arbor_core::{ArborError, Result};
use serde::{Deserialize, Serialize};

/// File name looked up at the project root.
pub const RUN_CONFIG_FILE: &str = ".arbor-run.yaml";

/// How to start the `run` session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Commands run once before `command`
    pub setup: Vec<String>,

    /// Main command
    pub command: String,

    /// Long-running command: keep the session open after it exits
    pub watch: bool,
}

impl RunConfig {
    /// Path of the run configuration for a project root.
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(RUN_CONFIG_FILE)
    }

    /// Load the run configuration of a project, `Ok(None)` when absent.
    pub async fn load(project_root: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(project_root);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArborError::io("reading run config", &path, e)),
        };
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| ArborError::ConfigInvalid {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if config.command.trim().is_empty() {
            return Err(ArborError::ConfigValidation {
                message: format!("{}: command must not be empty", path.display()),
            });
        }
        Ok(Some(config))
    }

    /// Shell line that runs setup then the command, stopping at the first failure.
    pub fn shell_line(&self) -> String {
        self.setup
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.command.as_str()))
            .filter(|cmd| !cmd.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// The run session closes itself when a non-watch command finishes.
    pub fn auto_exit(&self) -> bool {
        !self.watch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RunConfig::load(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_and_shell_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            RunConfig::path_for(dir.path()),
            "setup:\n  - npm install\n  - npm run build\ncommand: npm start\nwatch: true\n",
        )
        .unwrap();
        let config = RunConfig::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(config.shell_line(), "npm install && npm run build && npm start");
        assert!(config.watch);
        assert!(!config.auto_exit());
    }

    #[test]
    fn test_command_only() {
        let config = RunConfig {
            command: "cargo test".into(),
            ..Default::default()
        };
        assert_eq!(config.shell_line(), "cargo test");
        assert!(config.auto_exit());
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(RunConfig::path_for(dir.path()), "setup: [make]\n").unwrap();
        let err = RunConfig::load(dir.path()).await.unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_unreadable_config_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(RunConfig::path_for(dir.path())).unwrap();
        let err = RunConfig::load(dir.path()).await.unwrap_err();
        assert!(!err.is_config_error());
    }
}
