//! ARBOR - workspace status for parallel feature development
//!
//! Reconciles git worktrees, tmux sessions and pull requests into a single
//! status line per workspace.
//!
//! ## Usage
//!
//! ```bash
//! # One-shot status of every workspace
//! arbor status
//! arbor status --json
//!
//! # Keep refreshing until Ctrl-C
//! arbor watch
//!
//! # Side-by-side diff of a workspace against its base branch
//! arbor diff api login
//!
//! # Create, attach to and archive a workspace
//! arbor new api login --agent claude
//! arbor attach api login --role shell
//! arbor archive api login
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use arbor_config::ArborConfig;
use arbor_core::diff::{self, Cell, LineKind};
use arbor_core::{ArborError, ConsoleMode, LogGuard, LogOptions, MergedRecord, SessionRole, init_logging};
use arbor_engine::{CreateRequest, Lifecycle, PageWindow, RefreshScheduler, ReviewScope, Trigger};
use arbor_probe::sessions::tool_on_path;
use arbor_probe::{AgentChoice, Inventory, SessionRegistry, SharedRunner, SystemRunner, choose_agent_tool, session_name};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Rows printed by `watch`; the first page gets visible-cadence refreshes.
const WATCH_PAGE_SIZE: usize = 20;

/// Workspace status for parallel feature development
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.arbor/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Configuration file (defaults to $ARBOR_CONFIG or ~/.config/arbor/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory whose children are projects
    #[arg(long, global = true)]
    projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every workspace once and print its status
    Status {
        /// Print merged records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh continuously and reprint on every change
    Watch,
    /// Show a workspace's changes against its base branch side by side
    Diff {
        project: String,
        feature: String,
        /// Width of each column
        #[arg(long, default_value_t = 60)]
        width: usize,
    },
    /// Create a workspace with its sessions
    New {
        project: String,
        feature: String,
        /// Branch to fork from
        #[arg(long)]
        base: Option<String>,
        /// Agent tool for the main session
        #[arg(long)]
        agent: Option<String>,
    },
    /// Kill a workspace's sessions and move it to the archive
    Archive { project: String, feature: String },
    /// Attach to one of a workspace's sessions, creating it if needed
    Attach {
        project: String,
        feature: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Main)]
        role: RoleArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Main,
    Shell,
    Run,
}

impl From<RoleArg> for SessionRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Main => SessionRole::Main,
            RoleArg::Shell => SessionRole::Shell,
            RoleArg::Run => SessionRole::Run,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("arbor error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<ArborError>().and_then(ArborError::guidance) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> arbor_core::Result<LogGuard> {
    let console = match cli.command {
        Command::Watch => ConsoleMode::WarningsOnly,
        _ => ConsoleMode::Full,
    };
    init_logging(
        LogOptions::new(cli.verbose)
            .with_log_dir(cli.log_dir.clone())
            .with_console(console),
    )
}

/// Resolve configuration: file, then environment, then CLI flags.
fn load_config(cli: &Cli) -> anyhow::Result<ArborConfig> {
    let mut config = match &cli.config {
        Some(path) => ArborConfig::from_file(path)?.with_env_overrides(),
        None => ArborConfig::load()?,
    };
    if let Some(dir) = &cli.projects_dir {
        config = config.with_projects_dir(dir);
    }
    config.validate()?;
    Ok(config)
}

fn lifecycle(config: &ArborConfig, runner: SharedRunner) -> Lifecycle {
    Lifecycle::new(
        Inventory::new(config.projects_dir.clone(), runner.clone()),
        SessionRegistry::new(runner.clone()),
        runner,
        config.base_branches.clone(),
    )
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let runner = SystemRunner::shared();
    info!(projects_dir = %config.projects_dir.display(), "starting arbor");

    match cli.command {
        Command::Status { json } => {
            let scheduler = RefreshScheduler::from_config(&config, runner);
            scheduler.full_refresh().await;
            scheduler.refresh_reviews(ReviewScope::All).await;
            let records = scheduler.records();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&records);
            }
        }
        Command::Watch => watch(&config, runner).await,
        Command::Diff { project, feature, width } => {
            let scheduler = RefreshScheduler::from_config(&config, runner);
            let path = workspace_path(scheduler.inventory(), &project, &feature).await?;
            let text = scheduler
                .git()
                .diff_against_base(&path)
                .await
                .with_context(|| format!("diff of {project}/{feature}"))?;
            print_side_by_side(&text, width);
        }
        Command::New { project, feature, base, agent } => {
            let agent = match agent {
                Some(tool) => Some(tool),
                None => pick_agent(&config)?,
            };
            let mut request = CreateRequest::new(&project, &feature);
            if let Some(base) = base {
                request = request.with_base(base);
            }
            if let Some(tool) = agent {
                request = request.with_agent_tool(tool);
            }
            match lifecycle(&config, runner).create_workspace(&request).await {
                Some(ws) => println!("created {} at {}", ws.id, ws.path.display()),
                None => bail!("could not create {project}/{feature}; see the log for details"),
            }
        }
        Command::Archive { project, feature } => {
            if !lifecycle(&config, runner).archive_workspace(&project, &feature).await {
                bail!("could not archive {project}/{feature}; see the log for details");
            }
            println!("archived {project}/{feature}");
        }
        Command::Attach { project, feature, role } => {
            let role = SessionRole::from(role);
            let inventory = Inventory::new(config.projects_dir.clone(), runner.clone());
            let workspace = inventory
                .workspaces()
                .await
                .into_iter()
                .find(|ws| ws.project() == project && ws.feature() == feature)
                .with_context(|| format!("no workspace {project}/{feature}"))?;

            let agent = match role {
                SessionRole::Main => pick_agent(&config)?,
                _ => None,
            };
            if !lifecycle(&config, runner.clone())
                .ensure_session(&workspace, role, agent.as_deref())
                .await
            {
                bail!("no {role} session for {project}/{feature}");
            }
            let name = session_name(&project, &feature, role);
            SessionRegistry::new(runner).attach_interactive(&name).await?;
        }
    }
    Ok(())
}

async fn workspace_path(inventory: &Inventory, project: &str, feature: &str) -> anyhow::Result<PathBuf> {
    let project = inventory
        .project(project)
        .await
        .with_context(|| format!("no project {project}"))?;
    let path = project.workspace_path(feature);
    if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        bail!("no workspace {}/{feature}", project.name);
    }
    Ok(path)
}

fn pick_agent(config: &ArborConfig) -> anyhow::Result<Option<String>> {
    match choose_agent_tool(&config.agents.tools, config.agents.default.as_deref(), tool_on_path) {
        AgentChoice::Selected(tool) => Ok(Some(tool)),
        AgentChoice::Ambiguous(choices) => {
            bail!("several agent tools installed ({}); pass --agent", choices.join(", "))
        }
        AgentChoice::Unavailable => {
            warn!(tools = ?config.agents.tools, "no agent tool installed, starting a plain shell");
            Ok(None)
        }
    }
}

async fn watch(config: &ArborConfig, runner: SharedRunner) {
    let scheduler = RefreshScheduler::from_config(config, runner);
    let mut updates = scheduler.subscribe();
    let (triggers, rx) = mpsc::channel::<Trigger>(16);
    if triggers.send(Trigger::Visible(PageWindow::new(0, WATCH_PAGE_SIZE))).await.is_err() {
        warn!("refresh trigger channel closed before start");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let printer = async {
        while updates.changed().await.is_ok() {
            let records = scheduler.records();
            let page = &records[..records.len().min(WATCH_PAGE_SIZE)];
            print!("\x1b[2J\x1b[H");
            print_table(page);
            if records.len() > page.len() {
                println!("... {} more", records.len() - page.len());
            }
        }
    };

    tokio::select! {
        _ = scheduler.run(rx, shutdown) => {}
        _ = printer => {}
    }
    drop(triggers);
}

fn print_table(records: &[MergedRecord]) {
    if records.is_empty() {
        println!("no workspaces");
        return;
    }
    println!(
        "{:<32} {:<12} {:<8} {:>12} {:>8} {}",
        "WORKSPACE", "LABEL", "AGENT", "BASE +/-", "AHEAD", "REVIEW"
    );
    for record in records {
        let style = record.label.style();
        let label = format!("{:<12}", record.label.as_str());
        let review = match record.review.record() {
            Some(pr) => format!("#{} {}", pr.number, pr.title),
            None => String::new(),
        };
        println!(
            "{:<32} \x1b[{};{}m{}\x1b[0m {:<8} {:>12} {:>8} {}",
            record.workspace.id.to_string(),
            style.foreground.ansi_fg(),
            style.background.ansi_bg(),
            label,
            record.sessions.main.status.to_string(),
            format!("+{}/-{}", record.git.base_added_lines, record.git.base_deleted_lines),
            record.git.ahead,
            review,
        );
    }
}

fn print_side_by_side(text: &str, width: usize) {
    let lines = diff::parse_unified(text);
    if lines.is_empty() {
        println!("no changes");
        return;
    }
    for row in diff::align(&lines) {
        println!("{} | {}", render_cell(&row.left, width), render_cell(&row.right, width));
    }
}

fn render_cell(cell: &Cell, width: usize) -> String {
    let Some(line) = cell.line() else {
        return " ".repeat(width);
    };
    let (marker, color) = match line.kind {
        LineKind::Header => (' ', 36),
        LineKind::Context => (' ', 39),
        LineKind::Added => ('+', 32),
        LineKind::Removed => ('-', 31),
    };
    let text: String = line.text.chars().take(width.saturating_sub(1)).collect();
    let pad = width.saturating_sub(1 + text.chars().count());
    format!("\x1b[{color}m{marker}{text}\x1b[0m{}", " ".repeat(pad))
}
