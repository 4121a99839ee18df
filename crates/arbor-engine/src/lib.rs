//! Reconciliation engine for arbor.
//!
//! Pulls from the probes in `arbor-probe` on several cadences, joins the
//! three signal sources into one [`MergedRecord`](arbor_core::MergedRecord)
//! per workspace, and publishes them.
//!
//! - [`RefreshScheduler`] - full, visible-page and review passes
//! - [`ReviewCache`] - path-keyed review statuses with explicit TTL
//! - [`Lifecycle`] - create and archive workspaces
//!
//! # Example
//!
//! ```no_run
//! use arbor_config::ArborConfig;
//! use arbor_engine::RefreshScheduler;
//! use arbor_probe::SystemRunner;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = ArborConfig::default();
//!     let scheduler = RefreshScheduler::from_config(&config, SystemRunner::shared());
//!     scheduler.full_refresh().await;
//!     for record in scheduler.records() {
//!         println!("{} {}", record.workspace.id, record.label.as_str());
//!     }
//! }
//! ```

pub mod cache;
pub mod guard;
pub mod lifecycle;
pub mod scheduler;

pub use cache::ReviewCache;
pub use guard::{InFlight, InFlightToken};
pub use lifecycle::{CreateRequest, Lifecycle};
pub use scheduler::{
    PageWindow, PassOutcome, RefreshScheduler, ReviewScope, SchedulerSettings, SkipReason, Trigger,
    derive_label,
};
