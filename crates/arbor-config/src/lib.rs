//! Configuration management for arbor.
//!
//! Configuration is read from YAML at `$ARBOR_CONFIG`, falling back to
//! `~/.config/arbor/config.yaml`. Every field has a default, so a missing
//! file (at the default location) simply yields [`ArborConfig::default`].
//!
//! ```yaml
//! projects_dir: ~/code
//! base_branches: [main, master]
//! refresh:
//!   full_interval: 30s
//!   visible_interval: 3s
//!   full_concurrency: 6
//! review:
//!   page_size: 100
//! agents:
//!   tools: [claude, codex]
//!   default: claude
//! idle_eviction: 2h
//! ```

mod duration;
pub mod run;

use std::path::{Path, PathBuf};
use std::time::Duration;

use arbor_core::{ArborError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use run::RunConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ARBOR_CONFIG";

/// Environment variable overriding `projects_dir`.
pub const PROJECTS_DIR_ENV: &str = "ARBOR_PROJECTS_DIR";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArborConfig {
    /// Directory whose immediate children are projects
    pub projects_dir: PathBuf,

    /// Candidate base branch names, tried in order
    pub base_branches: Vec<String>,

    pub refresh: RefreshConfig,

    pub review: ReviewConfig,

    pub agents: AgentConfig,

    /// Kill a main session that has sat idle this long. Disabled when unset.
    #[serde(with = "duration::optional")]
    pub idle_eviction: Option<Duration>,
}

impl Default for ArborConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            projects_dir: home.join("projects"),
            base_branches: vec![
                "main".to_string(),
                "master".to_string(),
                "develop".to_string(),
                "trunk".to_string(),
            ],
            refresh: RefreshConfig::default(),
            review: ReviewConfig::default(),
            agents: AgentConfig::default(),
            idle_eviction: None,
        }
    }
}

/// Refresh cadences and concurrency caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Interval of the full inventory pass
    #[serde(with = "duration::required")]
    pub full_interval: Duration,

    /// Interval of the visible-page pass
    #[serde(with = "duration::required")]
    pub visible_interval: Duration,

    /// Interval of the review cache refresh
    #[serde(with = "duration::required")]
    pub review_interval: Duration,

    /// Simultaneous workspace probes during a full pass
    pub full_concurrency: usize,

    /// Simultaneous workspace probes during a visible pass
    pub visible_concurrency: usize,

    /// How long a tmux session listing is reused within a pass
    #[serde(with = "duration::required")]
    pub session_list_ttl: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            full_interval: Duration::from_secs(30),
            visible_interval: Duration::from_secs(3),
            review_interval: Duration::from_secs(60),
            full_concurrency: 6,
            visible_concurrency: 3,
            session_list_ttl: Duration::from_millis(1500),
        }
    }
}

/// Code-review CLI settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub enabled: bool,

    /// Program invoked for review queries
    pub command: String,

    /// Upper bound on records fetched per project
    pub page_size: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "gh".to_string(),
            page_size: 100,
        }
    }
}

/// Interactive agent tools offered for the main session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub tools: Vec<String>,

    /// Preferred tool when several are available
    pub default: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tools: vec!["claude".to_string()],
            default: None,
        }
    }
}

impl ArborConfig {
    /// Load configuration from the environment-selected or default path,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ArborError::ConfigNotFound {
            path: path.to_path_buf(),
            source: Some(e),
        })?;
        let config = Self::from_yaml(&contents).map_err(|message| ArborError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> std::result::Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(contents).map_err(|e| e.to_string())?;
        config.projects_dir = expand_home(&config.projects_dir);
        Ok(config)
    }

    /// Apply `ARBOR_PROJECTS_DIR` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(PROJECTS_DIR_ENV) {
            self.projects_dir = expand_home(Path::new(&dir));
        }
        self
    }

    /// Override the projects directory (CLI flag).
    pub fn with_projects_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.projects_dir = expand_home(dir.as_ref());
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| -> Result<()> {
            Err(ArborError::ConfigValidation {
                message: message.to_string(),
            })
        };
        if self.refresh.full_concurrency == 0 || self.refresh.visible_concurrency == 0 {
            return fail("refresh concurrency must be at least 1");
        }
        if self.base_branches.is_empty() {
            return fail("base_branches must name at least one branch");
        }
        if self.review.page_size == 0 {
            return fail("review.page_size must be at least 1");
        }
        if self.refresh.full_interval.is_zero()
            || self.refresh.visible_interval.is_zero()
            || self.refresh.review_interval.is_zero()
        {
            return fail("refresh intervals must be non-zero");
        }
        Ok(())
    }
}

/// `~/.config/arbor/config.yaml`, if a config directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("arbor").join("config.yaml"))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
