//! External-tool probes for arbor.
//!
//! Everything arbor learns about a workspace comes from shelling out to
//! `git`, `tmux` or `gh` and parsing their text output.
//!
//! # Overview
//!
//! - [`Inventory`] finds projects and their worktrees under a base directory
//! - [`GitProbe`] computes modification, divergence and ahead/behind counts
//! - [`SessionRegistry`] names, creates, kills and classifies tmux sessions
//! - [`ReviewFetcher`] batch-fetches pull requests and joins them to paths
//!
//! All of them run commands through a shared [`CommandRunner`]. Tests swap
//! in `testing::ScriptedRunner` (feature `test-util`).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  ┌──────────┐  ┌─────────────────┐  ┌───────────────┐
//! │ Inventory │  │ GitProbe │  │ SessionRegistry │  │ ReviewFetcher │
//! └─────┬─────┘  └────┬─────┘  └────────┬────────┘  └───────┬───────┘
//!       └─────────────┴────────┬────────┴───────────────────┘
//!                              ▼
//!                    ┌───────────────────┐
//!                    │   CommandRunner   │
//!                    │ (git, tmux, gh)   │
//!                    └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use arbor_probe::{Inventory, SystemRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let inventory = Inventory::new("/home/me/projects", SystemRunner::shared());
//!     for workspace in inventory.workspaces().await {
//!         println!("{} at {}", workspace.id, workspace.path.display());
//!     }
//! }
//! ```

pub mod activity;
pub mod git;
pub mod inventory;
pub mod review;
pub mod runner;
pub mod sessions;
pub mod tmux;
pub mod worktree;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use git::{GitProbe, GitReport};
pub use inventory::{Inventory, Project};
pub use review::ReviewFetcher;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SharedRunner, SystemRunner};
pub use sessions::{AgentChoice, SessionRegistry, choose_agent_tool, session_name};
pub use tmux::{SessionEntry, SessionSnapshot};
