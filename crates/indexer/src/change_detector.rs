use crate::scanner::{hash_bytes, is_binary};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Snapshots retained per file for debugging.
const HISTORY_LIMIT: usize = 10;

/// Capacity of the logical-event channel.
const EVENT_QUEUE: usize = 1_024;

/// Logical file-change kinds, after debouncing and no-op suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A logical change event: what the rest of the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub rel_path: String,
    pub old_rel_path: Option<String>,
    pub previous_hash: Option<String>,
    pub current_hash: Option<String>,
    pub timestamp_ms: i64,
}

/// Raw input from the watcher, before hashing and deduplication.
#[derive(Debug, Clone)]
pub enum RawChange {
    /// File appeared or its bytes may have changed.
    Upsert { rel_path: String },
    /// File disappeared.
    Removed { rel_path: String },
    /// Coalesced rename from the watcher's rename window.
    Renamed { from: String, to: String },
}

/// Per-file snapshot history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub hash: String,
    pub at_ms: i64,
}

/// Turns raw watcher events into deduplicated logical change events.
///
/// Owns the live mirror (`rel_path → current hash`); all mutation happens
/// through this one value, and per-path debounce timers are cancellable:
/// a second change while one is pending replaces the pending work.
#[derive(Clone)]
pub struct ChangeDetector {
    inner: Arc<DetectorInner>,
}

struct DetectorInner {
    root: PathBuf,
    debounce: Duration,
    events_tx: mpsc::Sender<FileChangeEvent>,
    mirror: Mutex<HashMap<String, String>>,
    history: Mutex<HashMap<String, VecDeque<Snapshot>>>,
    pending: Mutex<HashMap<String, PendingTask>>,
    generation: AtomicU64,
}

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

impl ChangeDetector {
    /// Create a detector for a project root; returns the logical-event
    /// receiver alongside.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        debounce_ms: u64,
    ) -> (Self, mpsc::Receiver<FileChangeEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let detector = Self {
            inner: Arc::new(DetectorInner {
                root: root.into(),
                debounce: Duration::from_millis(debounce_ms),
                events_tx,
                mirror: Mutex::new(HashMap::new()),
                history: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        };
        (detector, events_rx)
    }

    /// Prime the mirror from a known state (catalog or initial scan)
    /// without emitting events.
    pub fn seed(&self, rel_path: &str, hash: &str) {
        self.inner
            .mirror
            .lock()
            .expect("mirror lock")
            .insert(rel_path.to_string(), hash.to_string());
    }

    /// Feed one raw change from the watcher.
    pub async fn on_raw_change(&self, change: RawChange) {
        match change {
            RawChange::Upsert { rel_path } => self.schedule_upsert(rel_path),
            RawChange::Removed { rel_path } => self.handle_removed(&rel_path).await,
            RawChange::Renamed { from, to } => self.handle_renamed(from, to).await,
        }
    }

    /// Current mirror hash for a path.
    #[must_use]
    pub fn mirror_hash(&self, rel_path: &str) -> Option<String> {
        self.inner
            .mirror
            .lock()
            .expect("mirror lock")
            .get(rel_path)
            .cloned()
    }

    /// Bounded snapshot history for a path (most recent last).
    #[must_use]
    pub fn history(&self, rel_path: &str) -> Vec<Snapshot> {
        self.inner
            .history
            .lock()
            .expect("history lock")
            .get(rel_path)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Process every pending debounced path immediately. Test-harness
    /// helper for draining without waiting out the debounce window.
    pub async fn flush(&self) {
        let drained: Vec<(String, PendingTask)> = {
            let mut pending = self.inner.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (rel_path, task) in drained {
            task.handle.abort();
            DetectorInner::process_upsert(&self.inner, &rel_path).await;
        }
    }

    fn schedule_upsert(&self, rel_path: String) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = self.inner.clone();
        let task_rel = rel_path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            DetectorInner::process_upsert(&inner, &task_rel).await;
            let mut pending = inner.pending.lock().expect("pending lock");
            if pending
                .get(&task_rel)
                .is_some_and(|t| t.generation == generation)
            {
                pending.remove(&task_rel);
            }
        });

        let mut pending = self.inner.pending.lock().expect("pending lock");
        if let Some(replaced) = pending.insert(rel_path, PendingTask { generation, handle }) {
            // A second change while pending replaces the pending work.
            replaced.handle.abort();
        }
    }

    async fn handle_removed(&self, rel_path: &str) {
        self.cancel_pending(rel_path);

        let previous = self
            .inner
            .mirror
            .lock()
            .expect("mirror lock")
            .remove(rel_path);
        let Some(previous_hash) = previous else {
            log::debug!("delete for untracked file {rel_path}; ignoring");
            return;
        };
        self.inner.history.lock().expect("history lock").remove(rel_path);

        self.inner
            .send(FileChangeEvent {
                kind: ChangeKind::Deleted,
                rel_path: rel_path.to_string(),
                old_rel_path: None,
                previous_hash: Some(previous_hash),
                current_hash: None,
                timestamp_ms: unix_millis(),
            })
            .await;
    }

    async fn handle_renamed(&self, from: String, to: String) {
        self.cancel_pending(&from);

        let moved = {
            let mut mirror = self.inner.mirror.lock().expect("mirror lock");
            mirror.remove(&from).map(|hash| {
                mirror.insert(to.clone(), hash.clone());
                hash
            })
        };

        let Some(hash) = moved else {
            // Rename of a record we never tracked: treat as a create.
            log::warn!("rename of untracked file {from} -> {to}; treating as create");
            self.schedule_upsert(to);
            return;
        };

        {
            let mut history = self.inner.history.lock().expect("history lock");
            if let Some(snapshots) = history.remove(&from) {
                history.insert(to.clone(), snapshots);
            }
        }

        // No rehash on rename: content moved, bytes did not change.
        self.inner
            .send(FileChangeEvent {
                kind: ChangeKind::Renamed,
                rel_path: to,
                old_rel_path: Some(from),
                previous_hash: Some(hash.clone()),
                current_hash: Some(hash),
                timestamp_ms: unix_millis(),
            })
            .await;
    }

    fn cancel_pending(&self, rel_path: &str) {
        let mut pending = self.inner.pending.lock().expect("pending lock");
        if let Some(task) = pending.remove(rel_path) {
            task.handle.abort();
        }
    }
}

impl DetectorInner {
    async fn process_upsert(inner: &Arc<DetectorInner>, rel_path: &str) {
        let abs = inner.root.join(rel_path);
        let bytes = match tokio::fs::read(&abs).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("skipping vanished or unreadable file {rel_path}: {e}");
                return;
            }
        };
        if is_binary(&bytes) {
            return;
        }
        let current_hash = hash_bytes(&bytes);

        let previous = {
            let mut mirror = inner.mirror.lock().expect("mirror lock");
            match mirror.get(rel_path) {
                // Unchanged bytes: no logical event.
                Some(prior) if *prior == current_hash => return,
                prior => {
                    let prior = prior.cloned();
                    mirror.insert(rel_path.to_string(), current_hash.clone());
                    prior
                }
            }
        };

        {
            let mut history = inner.history.lock().expect("history lock");
            let snapshots = history.entry(rel_path.to_string()).or_default();
            snapshots.push_back(Snapshot {
                hash: current_hash.clone(),
                at_ms: unix_millis(),
            });
            while snapshots.len() > HISTORY_LIMIT {
                snapshots.pop_front();
            }
        }

        let kind = if previous.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        };
        inner
            .send(FileChangeEvent {
                kind,
                rel_path: rel_path.to_string(),
                old_rel_path: None,
                previous_hash: previous,
                current_hash: Some(current_hash),
                timestamp_ms: unix_millis(),
            })
            .await;
    }

    async fn send(&self, event: FileChangeEvent) {
        if self.events_tx.send(event).await.is_err() {
            log::debug!("change-event receiver dropped; detector now inert");
        }
    }
}

fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
