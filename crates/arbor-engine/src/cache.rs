//! Review status cache.
//!
//! Entries are keyed by workspace path and replaced wholesale by a project's
//! batch fetch. Each entry carries the instant it was fetched, and the cache
//! owns its TTL, so staleness is a property of the cache rather than of a
//! global clock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use arbor_core::{ReviewStatus, Workspace};
use arbor_probe::ReviewFetcher;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    status: ReviewStatus,
    fetched_at: Option<Instant>,
}

pub struct ReviewCache {
    fetcher: ReviewFetcher,
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl ReviewCache {
    pub fn new(fetcher: ReviewFetcher, ttl: Duration, enabled: bool) -> Self {
        Self {
            fetcher,
            enabled,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached status of a workspace; a miss is [`ReviewStatus::NotChecked`].
    pub fn get(&self, path: &Path) -> ReviewStatus {
        self.entries()
            .get(path)
            .map(|e| e.status.clone())
            .unwrap_or_default()
    }

    /// Whether the entry is missing, still loading, or older than the TTL.
    pub fn is_stale(&self, path: &Path, now: Instant) -> bool {
        match self.entries().get(path) {
            Some(CacheEntry {
                fetched_at: Some(at),
                ..
            }) => now.duration_since(*at) >= self.ttl,
            _ => true,
        }
    }

    /// Drop one entry; the next read is `NotChecked`.
    pub fn invalidate(&self, path: &Path) {
        self.entries().remove(path);
    }

    /// Keep only entries for the given paths.
    pub fn retain(&self, live: &HashSet<PathBuf>) {
        self.entries().retain(|path, _| live.contains(path));
    }

    fn store(&self, path: PathBuf, status: ReviewStatus, fetched_at: Option<Instant>) {
        self.entries().insert(path, CacheEntry { status, fetched_at });
    }

    /// Batch-fetch a project and replace the entries of its workspaces.
    ///
    /// Workspaces still without a status become `Loading` during the fetch.
    /// On failure, entries that already hold a result keep it and the rest
    /// become `Error`.
    pub async fn refresh_project(&self, root: &Path, workspaces: &[&Workspace]) -> bool {
        if !self.enabled {
            return false;
        }
        {
            let mut entries = self.entries();
            for ws in workspaces {
                entries.entry(ws.path.clone()).or_insert(CacheEntry {
                    status: ReviewStatus::Loading,
                    fetched_at: None,
                });
            }
        }

        match self.fetcher.fetch_statuses(root).await {
            Ok(statuses) => {
                let now = Instant::now();
                let mut entries = self.entries();
                for ws in workspaces {
                    let status = statuses.get(&ws.path).cloned().unwrap_or(ReviewStatus::NoPr);
                    entries.insert(
                        ws.path.clone(),
                        CacheEntry {
                            status,
                            fetched_at: Some(now),
                        },
                    );
                }
                debug!(root = %root.display(), count = workspaces.len(), "review cache refreshed");
                true
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "review fetch failed");
                let mut entries = self.entries();
                for ws in workspaces {
                    if let Some(entry) = entries.get_mut(&ws.path) {
                        if matches!(entry.status, ReviewStatus::NotChecked | ReviewStatus::Loading) {
                            entry.status = ReviewStatus::Error {
                                message: e.to_string(),
                            };
                        }
                    }
                }
                false
            }
        }
    }

    /// Re-fetch a single workspace's review and store the result.
    pub async fn refetch(&self, workspace: &Workspace) -> ReviewStatus {
        if !self.enabled {
            return ReviewStatus::NotChecked;
        }
        let Some(branch) = workspace.branch.as_deref() else {
            self.store(workspace.path.clone(), ReviewStatus::NoPr, Some(Instant::now()));
            return ReviewStatus::NoPr;
        };

        let status = match self.fetcher.fetch_branch(&workspace.path, branch).await {
            Ok(Some(record)) => ReviewStatus::Exists(record),
            Ok(None) => ReviewStatus::NoPr,
            Err(e) => {
                warn!(workspace = %workspace.id, error = %e, "review refetch failed");
                return self.get(&workspace.path);
            }
        };
        debug!(workspace = %workspace.id, "review refetched");
        self.store(workspace.path.clone(), status.clone(), Some(Instant::now()));
        status
    }
}
