//! Refresh scheduler.
//!
//! Owns the discovered workspace list and the published [`MergedRecord`]s and
//! drives three cadences:
//!
//! - **full**: rediscover workspaces, then probe all of them
//! - **visible**: re-probe only the workspaces in the current page window
//! - **reviews**: refresh the review cache for `all`, `visible` or `none`
//!
//! Each cadence holds its own [`InFlight`] slot, so the three run
//! independently and an overlapping tick or trigger is dropped. Full and
//! visible passes are capped by their own concurrency limit and are skipped
//! while a modal has focus. Records are always replaced whole.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use arbor_config::ArborConfig;
use arbor_core::label::{self, DeriveInput};
use arbor_core::{
    AgentStatus, GitStatus, Label, MergedRecord, ProbeField, ProbeIssue, ProbeResult, ReviewStatus,
    SessionSet, Workspace, WorkspaceId, log_pass_event,
};
use arbor_probe::{
    GitProbe, Inventory, Project, ReviewFetcher, SessionRegistry, SessionSnapshot, SharedRunner,
};
use chrono::Utc;
use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::{self, FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::ReviewCache;
use crate::guard::InFlight;

/// Offset and size of the page currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageWindow {
    pub offset: usize,
    pub size: usize,
}

impl PageWindow {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Clamp to a list of `len` items.
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.offset.min(len);
        let end = self.offset.saturating_add(self.size).min(len);
        start..end
    }
}

/// Which workspaces a review refresh covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewScope {
    All,
    Visible(PageWindow),
    None,
}

/// External requests fed into [`RefreshScheduler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    FullRefresh,
    /// Move the page window and refresh it
    Visible(PageWindow),
    Reviews(ReviewScope),
    ModalFocus(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    ModalFocus,
}

/// A pass the run loop can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Full,
    Visible(PageWindow),
    Reviews(ReviewScope),
}

type PassFuture<'a> = LocalBoxFuture<'a, (Pass, PassOutcome)>;

/// Result of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { refreshed: usize, dropped: usize },
    Skipped(SkipReason),
}

impl PassOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Tunables, usually taken from [`ArborConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub full_interval: Duration,
    pub visible_interval: Duration,
    pub review_interval: Duration,
    pub full_concurrency: usize,
    pub visible_concurrency: usize,
    pub session_list_ttl: Duration,
    pub idle_eviction: Option<Duration>,
}

impl From<&ArborConfig> for SchedulerSettings {
    fn from(config: &ArborConfig) -> Self {
        Self {
            full_interval: config.refresh.full_interval,
            visible_interval: config.refresh.visible_interval,
            review_interval: config.refresh.review_interval,
            full_concurrency: config.refresh.full_concurrency,
            visible_concurrency: config.refresh.visible_concurrency,
            session_list_ttl: config.refresh.session_list_ttl,
            idle_eviction: config.idle_eviction,
        }
    }
}

struct SessionMemo {
    snapshot: SessionSnapshot,
    taken_at: Instant,
}

#[derive(Default)]
struct SchedulerState {
    projects: Vec<Project>,
    /// Discovered workspaces, most recent first
    workspaces: Vec<Workspace>,
    records: HashMap<WorkspaceId, MergedRecord>,
    window: PageWindow,
    /// Main sessions seen idle, by session name, with when that started
    idle_since: HashMap<String, Instant>,
}

/// Label for a set of signals.
pub fn derive_label(git: &GitStatus, sessions: &SessionSet, review: &ReviewStatus) -> Label {
    label::derive(&DeriveInput {
        agent: sessions.main.status,
        attached: sessions.any_attached(),
        has_changes: git.has_changes,
        ahead: git.ahead,
        behind: git.behind,
        has_remote: git.has_remote,
        diverged_from_base: git.diverged_from_base,
        review,
    })
}

pub struct RefreshScheduler {
    inventory: Inventory,
    git: GitProbe,
    sessions: SessionRegistry,
    reviews: ReviewCache,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
    session_memo: Mutex<Option<SessionMemo>>,
    full_flight: InFlight,
    visible_flight: InFlight,
    review_flight: InFlight,
    modal_focus: AtomicBool,
    published: watch::Sender<u64>,
}

impl RefreshScheduler {
    pub fn new(
        inventory: Inventory,
        git: GitProbe,
        sessions: SessionRegistry,
        reviews: ReviewCache,
        settings: SchedulerSettings,
    ) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            inventory,
            git,
            sessions,
            reviews,
            settings,
            state: Mutex::new(SchedulerState::default()),
            session_memo: Mutex::new(None),
            full_flight: InFlight::new(),
            visible_flight: InFlight::new(),
            review_flight: InFlight::new(),
            modal_focus: AtomicBool::new(false),
            published,
        }
    }

    /// Wire every component from configuration over one runner.
    pub fn from_config(config: &ArborConfig, runner: SharedRunner) -> Self {
        let fetcher = ReviewFetcher::new(runner.clone(), config.review.command.clone(), config.review.page_size);
        Self::new(
            Inventory::new(&config.projects_dir, runner.clone()),
            GitProbe::new(runner.clone(), config.base_branches.clone()),
            SessionRegistry::new(runner),
            ReviewCache::new(fetcher, config.refresh.review_interval, config.review.enabled),
            SchedulerSettings::from(config),
        )
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn git(&self) -> &GitProbe {
        &self.git
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn reviews(&self) -> &ReviewCache {
        &self.reviews
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn memo(&self) -> MutexGuard<'_, Option<SessionMemo>> {
        self.session_memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receiver bumped every time records are published.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }

    /// Pause or resume the full and visible loops.
    pub fn set_modal_focus(&self, focused: bool) {
        self.modal_focus.store(focused, Ordering::Release);
        debug!(focused, "modal focus changed");
    }

    pub fn modal_focused(&self) -> bool {
        self.modal_focus.load(Ordering::Acquire)
    }

    pub fn window(&self) -> PageWindow {
        self.state().window
    }

    pub fn set_window(&self, window: PageWindow) {
        self.state().window = window;
    }

    /// Discovered workspaces, most recent first.
    pub fn workspaces(&self) -> Vec<Workspace> {
        self.state().workspaces.clone()
    }

    /// Published records in workspace order.
    pub fn records(&self) -> Vec<MergedRecord> {
        let state = self.state();
        state
            .workspaces
            .iter()
            .filter_map(|ws| state.records.get(&ws.id).cloned())
            .collect()
    }

    pub fn record(&self, id: &WorkspaceId) -> Option<MergedRecord> {
        self.state().records.get(id).cloned()
    }

    /// Tmux session list, reused while younger than the TTL unless `fresh`.
    async fn session_snapshot(&self, fresh: bool) -> (SessionSnapshot, Option<ProbeIssue>) {
        if !fresh {
            if let Some(memo) = self.memo().as_ref() {
                if memo.taken_at.elapsed() < self.settings.session_list_ttl {
                    return (memo.snapshot.clone(), None);
                }
            }
        }

        match self.sessions.list_sessions().await {
            Ok(snapshot) => {
                *self.memo() = Some(SessionMemo {
                    snapshot: snapshot.clone(),
                    taken_at: Instant::now(),
                });
                (snapshot, None)
            }
            Err(e) => {
                warn!(error = %e, "session list failed");
                (SessionSnapshot::default(), Some(ProbeIssue::new(ProbeField::Sessions, e)))
            }
        }
    }

    /// Probe one workspace into a complete record.
    ///
    /// A push observed during this probe (unpushed commits before, fully
    /// pushed now) with an open review re-fetches that review before the
    /// record is built.
    async fn probe_workspace(
        &self,
        workspace: &Workspace,
        snapshot: &SessionSnapshot,
        snapshot_issue: Option<&ProbeIssue>,
    ) -> ProbeResult<MergedRecord> {
        let report = self.git.probe(&workspace.path).await?;
        let (sessions, session_issues) = self.sessions.probe_sessions(workspace, snapshot).await;

        let previous = self.state().records.get(&workspace.id).map(|r| r.git.clone());
        let mut review = self.reviews.get(&workspace.path);
        let pushed_now = previous.is_some_and(|prev| prev.has_unpushed_commits()) && report.status.is_pushed;
        if pushed_now && review.is_open() {
            info!(workspace = %workspace.id, "push detected, refetching review");
            review = self.reviews.refetch(workspace).await;
        }

        let label = derive_label(&report.status, &sessions, &review);
        let mut issues = report.issues;
        issues.extend(session_issues);
        issues.extend(snapshot_issue.cloned());

        Ok(MergedRecord {
            workspace: workspace.clone(),
            git: report.status,
            sessions,
            review,
            label,
            issues,
            refreshed_at: Utc::now(),
        })
    }

    /// Probe workspaces with at most `cap` in flight. Failed workspaces are
    /// logged and left out.
    async fn probe_all(&self, workspaces: &[Workspace], cap: usize, fresh_sessions: bool) -> (Vec<MergedRecord>, usize) {
        let (snapshot, snapshot_issue) = self.session_snapshot(fresh_sessions).await;
        let snapshot = &snapshot;
        let snapshot_issue = snapshot_issue.as_ref();

        let results: Vec<(WorkspaceId, ProbeResult<MergedRecord>)> = stream::iter(workspaces)
            .map(|ws| async move { (ws.id.clone(), self.probe_workspace(ws, snapshot, snapshot_issue).await) })
            .buffer_unordered(cap.max(1))
            .collect()
            .await;

        let mut records = Vec::with_capacity(results.len());
        let mut dropped = 0;
        for (id, result) in results {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(workspace = %id, error = %e, "workspace dropped from pass");
                    dropped += 1;
                }
            }
        }
        (records, dropped)
    }

    fn publish(&self) {
        self.published.send_modify(|generation| *generation += 1);
    }

    /// Rediscover workspaces and probe every one of them.
    pub async fn full_refresh(&self) -> PassOutcome {
        if self.modal_focused() {
            return PassOutcome::Skipped(SkipReason::ModalFocus);
        }
        let Some(_token) = self.full_flight.try_begin() else {
            debug!("full pass already in flight");
            return PassOutcome::Skipped(SkipReason::InFlight);
        };

        let started = Instant::now();
        let projects = self.inventory.projects().await;
        let workspaces = self.inventory.workspaces().await;
        let (records, dropped) = self
            .probe_all(&workspaces, self.settings.full_concurrency, true)
            .await;
        let refreshed = records.len();

        let live: HashSet<PathBuf> = workspaces.iter().map(|w| w.path.clone()).collect();
        {
            let mut state = self.state();
            state.projects = projects;
            state.workspaces = workspaces;
            state.records = records.into_iter().map(|r| (r.workspace.id.clone(), r)).collect();
        }
        self.reviews.retain(&live);
        self.publish();
        self.evict_idle().await;

        log_pass_event!(
            "full",
            refreshed,
            dropped,
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        PassOutcome::Completed { refreshed, dropped }
    }

    /// Re-probe the workspaces inside `window` of the discovered list.
    pub async fn visible_refresh(&self, window: PageWindow) -> PassOutcome {
        if self.modal_focused() {
            return PassOutcome::Skipped(SkipReason::ModalFocus);
        }
        let Some(_token) = self.visible_flight.try_begin() else {
            debug!("visible pass already in flight");
            return PassOutcome::Skipped(SkipReason::InFlight);
        };

        let started = Instant::now();
        let slice: Vec<Workspace> = {
            let state = self.state();
            state.workspaces[window.range(state.workspaces.len())].to_vec()
        };
        let (records, dropped) = self
            .probe_all(&slice, self.settings.visible_concurrency, false)
            .await;
        let refreshed = records.len();

        {
            let mut state = self.state();
            let known: HashSet<WorkspaceId> = state.workspaces.iter().map(|w| w.id.clone()).collect();
            for record in records {
                if known.contains(&record.workspace.id) {
                    state.records.insert(record.workspace.id.clone(), record);
                }
            }
        }
        self.publish();
        self.evict_idle().await;

        log_pass_event!(
            "visible",
            refreshed,
            dropped,
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        PassOutcome::Completed { refreshed, dropped }
    }

    /// Refresh the review cache for `scope`, then re-derive published labels.
    ///
    /// `Visible` only fetches projects with a stale entry on the page.
    pub async fn refresh_reviews(&self, scope: ReviewScope) -> PassOutcome {
        let targets: Vec<Workspace> = {
            let state = self.state();
            match scope {
                ReviewScope::None => Vec::new(),
                ReviewScope::All => state.workspaces.clone(),
                ReviewScope::Visible(window) => state.workspaces[window.range(state.workspaces.len())].to_vec(),
            }
        };
        if targets.is_empty() || !self.reviews.enabled() {
            return PassOutcome::Completed {
                refreshed: 0,
                dropped: 0,
            };
        }
        let Some(_token) = self.review_flight.try_begin() else {
            return PassOutcome::Skipped(SkipReason::InFlight);
        };

        let now = Instant::now();
        let mut by_project: BTreeMap<String, Vec<&Workspace>> = BTreeMap::new();
        for ws in &targets {
            if matches!(scope, ReviewScope::Visible(_)) && !self.reviews.is_stale(&ws.path, now) {
                continue;
            }
            by_project.entry(ws.project().to_string()).or_default().push(ws);
        }

        let mut projects = self.state().projects.clone();
        if projects.is_empty() {
            projects = self.inventory.projects().await;
        }
        let roots: HashMap<String, PathBuf> = projects.into_iter().map(|p| (p.name, p.root)).collect();

        let mut refreshed = 0;
        let mut dropped = 0;
        for (project, workspaces) in &by_project {
            let Some(root) = roots.get(project) else {
                dropped += workspaces.len();
                continue;
            };
            if self.reviews.refresh_project(root, workspaces).await {
                refreshed += workspaces.len();
            } else {
                dropped += workspaces.len();
            }
        }

        if !self.modal_focused() {
            self.relabel();
        }
        log_pass_event!("reviews", refreshed, dropped, projects = by_project.len());
        PassOutcome::Completed { refreshed, dropped }
    }

    /// Replace each published record with one carrying the cached review.
    fn relabel(&self) {
        {
            let mut state = self.state();
            for record in state.records.values_mut() {
                let review = self.reviews.get(&record.workspace.path);
                if review == record.review {
                    continue;
                }
                let label = derive_label(&record.git, &record.sessions, &review);
                *record = MergedRecord {
                    review,
                    label,
                    ..record.clone()
                };
            }
        }
        self.publish();
    }

    /// Kill main sessions that have stayed idle past the configured limit.
    async fn evict_idle(&self) {
        let Some(limit) = self.settings.idle_eviction else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut state = self.state();
            let idle: Vec<String> = state
                .records
                .values()
                .filter(|r| r.sessions.main.status == AgentStatus::Idle)
                .map(|r| r.sessions.main.name.clone())
                .collect();
            state.idle_since.retain(|name, _| idle.contains(name));
            for name in &idle {
                state.idle_since.entry(name.clone()).or_insert(now);
            }
            state
                .idle_since
                .iter()
                .filter(|(_, since)| now.duration_since(**since) >= limit)
                .map(|(name, _)| name.clone())
                .collect()
        };

        for name in expired {
            match self.sessions.kill(&name).await {
                Ok(()) => {
                    info!(session = %name, "evicted idle session");
                    self.state().idle_since.remove(&name);
                }
                Err(e) => warn!(session = %name, error = %e, "idle eviction failed"),
            }
        }
    }

    fn start(&self, pass: Pass) -> PassFuture<'_> {
        async move {
            let outcome = match pass {
                Pass::Full => self.full_refresh().await,
                Pass::Visible(window) => self.visible_refresh(window).await,
                Pass::Reviews(scope) => self.refresh_reviews(scope).await,
            };
            (pass, outcome)
        }
        .boxed_local()
    }

    /// Turn a trigger into a pass to start, applying focus and window
    /// changes immediately.
    fn dispatch(&self, trigger: Trigger) -> Option<Pass> {
        match trigger {
            Trigger::FullRefresh => Some(Pass::Full),
            Trigger::Visible(window) => {
                self.set_window(window);
                Some(Pass::Visible(window))
            }
            Trigger::Reviews(scope) => Some(Pass::Reviews(scope)),
            Trigger::ModalFocus(focused) => {
                self.set_modal_focus(focused);
                None
            }
        }
    }

    /// Drive all cadences until `shutdown` resolves or the trigger channel
    /// closes.
    ///
    /// Passes run concurrently with each other and with trigger handling. A
    /// tick or trigger for a cadence whose pass is still running hits that
    /// cadence's in-flight slot and is dropped. Once the channel closes, no
    /// new passes start and the loop returns when the running ones finish.
    pub async fn run(&self, mut triggers: mpsc::Receiver<Trigger>, shutdown: impl Future<Output = ()>) {
        let mut full = tokio::time::interval(self.settings.full_interval);
        let mut visible = tokio::time::interval(self.settings.visible_interval);
        let mut reviews = tokio::time::interval(self.settings.review_interval);
        for timer in [&mut full, &mut visible, &mut reviews] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
        // the first full pass covers the page, and reviews follow it
        visible.reset();
        reviews.reset();

        info!(
            full_secs = self.settings.full_interval.as_secs(),
            visible_secs = self.settings.visible_interval.as_secs(),
            review_secs = self.settings.review_interval.as_secs(),
            "refresh scheduler started"
        );

        let mut passes: FuturesUnordered<PassFuture<'_>> = FuturesUnordered::new();
        let mut reviews_primed = false;
        let mut draining = false;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some((pass, outcome)) = passes.next(), if !passes.is_empty() => {
                    if let PassOutcome::Skipped(reason) = outcome {
                        debug!(?pass, ?reason, "pass dropped");
                    }
                    if pass == Pass::Full && !outcome.is_skipped() && !reviews_primed {
                        reviews_primed = true;
                        passes.push(self.start(Pass::Reviews(ReviewScope::All)));
                    }
                    if draining && passes.is_empty() {
                        break;
                    }
                }
                _ = full.tick(), if !draining => passes.push(self.start(Pass::Full)),
                _ = visible.tick(), if !draining => passes.push(self.start(Pass::Visible(self.window()))),
                _ = reviews.tick(), if !draining => passes.push(self.start(Pass::Reviews(ReviewScope::All))),
                trigger = triggers.recv(), if !draining => match trigger {
                    Some(trigger) => {
                        if let Some(pass) = self.dispatch(trigger) {
                            passes.push(self.start(pass));
                        }
                    }
                    None => {
                        draining = true;
                        if passes.is_empty() {
                            break;
                        }
                    }
                },
            }
        }
        info!(abandoned = passes.len(), "refresh scheduler stopped");
    }
}
