//! # arbor-core
//!
//! Core types, errors, and pure algorithms for arbor.
//!
//! This crate provides:
//! - [`ArborError`] / [`ProbeError`] - operation errors and signal-local probe failures
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - Workspace, GitStatus, SessionInfo, ReviewStatus, MergedRecord
//! - [`label`] - Status derivation and the static display table
//! - [`diff`] - Unified diff parsing and side-by-side alignment
//!
//! ## Example
//!
//! ```
//! use arbor_core::label::{derive, DeriveInput, Label};
//! use arbor_core::types::{AgentStatus, ReviewStatus};
//!
//! let review = ReviewStatus::NoPr;
//! let label = derive(&DeriveInput {
//!     agent: AgentStatus::Idle,
//!     attached: false,
//!     has_changes: true,
//!     ahead: 0,
//!     behind: 0,
//!     has_remote: true,
//!     diverged_from_base: false,
//!     review: &review,
//! });
//! assert_eq!(label, Label::Uncommitted);
//! ```

pub mod diff;
pub mod error;
pub mod label;
pub mod logging;
pub mod types;

pub use error::{ArborError, ProbeError, ProbeField, ProbeIssue, ProbeResult, Result};
pub use label::{Label, LabelStyle};
pub use logging::{ConsoleMode, LogGuard, LogOptions, init_logging};
pub use types::{
    AgentStatus, CheckRollup, GitStatus, MergedRecord, Mergeable, ReviewRecord, ReviewState,
    ReviewStatus, SessionInfo, SessionRole, SessionSet, Workspace, WorkspaceId,
};
