//! Logging for arbor.
//!
//! Every command appends JSON lines to a daily file under `~/.arbor/logs/`,
//! keeping the last [`RETAINED_LOG_FILES`] days. Human-readable output goes to
//! stderr. `arbor watch` redraws the terminal on each change, so its console
//! only shows warnings; the file still gets everything.
//!
//! `ARBOR_LOG` replaces the verbosity-derived filter, using `EnvFilter`
//! directive syntax (`ARBOR_LOG=arbor_engine::scheduler=trace`).
//!
//! ## Example
//!
//! ```no_run
//! use arbor_core::logging::{self, LogOptions};
//!
//! let _guard = logging::init_logging(LogOptions::new(1)).expect("logging init");
//! tracing::debug!(workspace = "api/login", "probing workspace");
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{ArborError, Result};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "ARBOR_LOG";

/// Daily log files kept in the log directory.
pub const RETAINED_LOG_FILES: usize = 7;

/// Target of per-pass refresh summaries.
pub const REFRESH_TARGET: &str = "arbor::refresh";

/// Target of workspace create/archive events.
pub const WORKSPACE_TARGET: &str = "arbor::workspace";

/// Guard that must be held to ensure log flushing on shutdown.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// What reaches stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleMode {
    /// Everything the filter lets through
    #[default]
    Full,
    /// Warnings and errors only, for full-screen output
    WarningsOnly,
}

impl ConsoleMode {
    fn level(self) -> LevelFilter {
        match self {
            Self::Full => LevelFilter::TRACE,
            Self::WarningsOnly => LevelFilter::WARN,
        }
    }
}

/// How to set up logging for one arbor command.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Defaults to `~/.arbor/logs/`
    pub log_dir: Option<PathBuf>,
    /// Count of `-v` flags
    pub verbosity: u8,
    pub console: ConsoleMode,
}

impl LogOptions {
    pub fn new(verbosity: u8) -> Self {
        Self {
            verbosity,
            ..Default::default()
        }
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_console(mut self, console: ConsoleMode) -> Self {
        self.console = console;
        self
    }

    fn verbose(&self) -> bool {
        self.verbosity > 0
    }
}

/// Filter directives for a `-v` count.
///
/// One `-v` turns on debug output except for the per-command lines of the
/// process runner, which need a second `-v`.
pub fn default_directives(verbosity: u8) -> String {
    match verbosity {
        0 => "arbor=info".to_string(),
        1 => "arbor=debug,arbor_probe::runner=info".to_string(),
        _ => "arbor=trace".to_string(),
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)))
}

fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir).map_err(|e| ArborError::DirectoryCreation {
        path: log_dir.to_path_buf(),
        source: e,
    })?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("arbor")
        .filename_suffix("log")
        .max_log_files(RETAINED_LOG_FILES)
        .build(log_dir)
        .map_err(|e| ArborError::internal(format!("cannot open log file in {}: {e}", log_dir.display())))
}

/// Install the global subscriber for an arbor command.
pub fn init_logging(options: LogOptions) -> Result<LogGuard> {
    let log_dir = match options.log_dir.clone() {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender(&log_dir)?);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(options.verbose())
        .with_file(options.verbosity > 1)
        .with_line_number(options.verbosity > 1)
        .compact()
        .with_filter(options.console.level());

    tracing_subscriber::registry()
        .with(env_filter(options.verbosity))
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(
        log_dir = %log_dir.display(),
        verbosity = options.verbosity,
        console = ?options.console,
        "logging initialized"
    );

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Initialize minimal console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(default_directives(2)))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path (`~/.arbor/logs/`).
pub fn default_log_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| ArborError::internal("home directory not resolvable"))?;
    Ok(home.join(".arbor").join("logs"))
}

/// Log the completion of a refresh pass.
///
/// ```ignore
/// log_pass_event!("visible", published = 12, dropped = 0);
/// ```
#[macro_export]
macro_rules! log_pass_event {
    ($pass:expr, $($field:tt)*) => {
        tracing::info!(
            target: $crate::logging::REFRESH_TARGET,
            pass = $pass,
            $($field)*,
            "refresh pass"
        )
    };
}

/// Log a workspace lifecycle action.
///
/// ```ignore
/// log_workspace_event!("api", "login", "archived");
/// ```
#[macro_export]
macro_rules! log_workspace_event {
    ($project:expr, $feature:expr, $event:expr) => {
        tracing::info!(
            target: $crate::logging::WORKSPACE_TARGET,
            project = $project,
            feature = $feature,
            event = $event,
            "workspace event"
        )
    };
}
