//! Scripted [`CommandRunner`] for tests.
//!
//! Responses are registered per `(program, args)` and optionally per working
//! directory. Later registrations shadow earlier ones, so a test can change
//! what git reports between two refresh passes. Every invocation is recorded,
//! and the runner tracks how many calls were in flight at once.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arbor_core::{ProbeError, ProbeResult};
use async_trait::async_trait;

use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Unavailable,
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    /// `None` matches any arguments
    args: Option<Vec<String>>,
    cwd: Option<PathBuf>,
    response: Response,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.program == spec.program
            && self.args.as_ref().is_none_or(|args| *args == spec.args)
            && self.cwd.as_ref().is_none_or(|cwd| Some(cwd) == spec.cwd.as_ref())
    }
}

/// Runner that answers from a script instead of spawning processes.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
    interactive: Mutex<Vec<CommandSpec>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, rule: Rule) {
        self.rules.lock().unwrap().push(rule);
    }

    /// Answer `program args` in any directory.
    pub fn respond(&self, program: &str, args: &[&str], output: CommandOutput) -> &Self {
        self.push(Rule {
            program: program.into(),
            args: Some(owned(args)),
            cwd: None,
            response: Response::Output(output),
        });
        self
    }

    /// Answer `program args` only when run in `dir`.
    pub fn respond_in(&self, dir: impl AsRef<Path>, program: &str, args: &[&str], output: CommandOutput) -> &Self {
        self.push(Rule {
            program: program.into(),
            args: Some(owned(args)),
            cwd: Some(dir.as_ref().to_path_buf()),
            response: Response::Output(output),
        });
        self
    }

    /// Answer every invocation of `program` with the same output.
    pub fn respond_any(&self, program: &str, output: CommandOutput) -> &Self {
        self.push(Rule {
            program: program.into(),
            args: None,
            cwd: None,
            response: Response::Output(output),
        });
        self
    }

    /// Make `program` look uninstalled.
    pub fn unavailable(&self, program: &str) -> &Self {
        self.push(Rule {
            program: program.into(),
            args: None,
            cwd: None,
            response: Response::Unavailable,
        });
        self
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Every recorded non-interactive invocation, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded interactive invocations.
    pub fn interactive_calls(&self) -> Vec<CommandSpec> {
        self.interactive.lock().unwrap().clone()
    }

    /// Number of calls of `program` whose arguments start with `prefix`.
    pub fn count(&self, program: &str, prefix: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program && c.args.len() >= prefix.len())
            .filter(|c| c.args.iter().zip(prefix).all(|(a, p)| a == p))
            .count()
    }

    /// Highest number of simultaneously running calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        let rules = self.rules.lock().unwrap();
        match rules.iter().rev().find(|rule| rule.matches(spec)) {
            Some(Rule {
                response: Response::Output(output),
                ..
            }) => Ok(output.clone()),
            Some(Rule {
                response: Response::Unavailable,
                ..
            }) => Err(ProbeError::ToolUnavailable {
                program: spec.program.clone(),
                message: "No such file or directory (os error 2)".into(),
            }),
            None => Ok(CommandOutput::failed(1, format!("unscripted: {spec}"))),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.answer(spec)
    }

    async fn run_interactive(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        self.interactive.lock().unwrap().push(spec.clone());
        self.answer(spec)
    }
}
