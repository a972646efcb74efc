use crate::error::{IndexerError, Result};
use crate::scanner::{hash_bytes, is_binary};
use ignore::WalkBuilder;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use semsync_protocol::{PathFilter, TraversalConfig, WatcherConfig};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Capacity of the raw notify-event bridge and the outgoing event channel.
const EVENT_QUEUE: usize = 1_024;

/// Raw watcher output, one step below the change detector: paths are
/// project-relative, renames are already coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added { rel_path: String },
    Changed { rel_path: String },
    Deleted { rel_path: String },
    Renamed { from: String, to: String },
    Error { message: String },
    /// Initial registration finished; subsequent events are live.
    Ready,
}

enum WatcherCommand {
    Flush,
    Shutdown,
}

/// OS-notification watcher for one project root.
///
/// Directories are watched non-recursively, enumerated up front and
/// extended dynamically as directories appear. Delete events are parked for
/// the rename window and collapsed into `Renamed` when a matching add
/// (same content hash and size) arrives in time.
#[derive(Clone)]
pub struct ProjectWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    root: PathBuf,
    command_tx: mpsc::Sender<WatcherCommand>,
    ready_rx: tokio::sync::watch::Receiver<bool>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    watch_state: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ProjectWatcher {
    /// Start watching a root. A missing root is warned about and produces
    /// an inert watcher (ready, zero watches) rather than an error.
    pub fn start(
        root: impl AsRef<Path>,
        config: WatcherConfig,
        traversal: &TraversalConfig,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let root = root.as_ref().to_path_buf();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (ready_tx, ready_rx) = tokio::sync::watch::channel(false);

        // Watcher-specific ignores merge into the traversal excludes, and
        // ignore files are resolved at start time.
        let mut filter_config = traversal.clone();
        filter_config
            .exclude_patterns
            .extend(config.ignored.iter().cloned());
        let mut filter = PathFilter::new(&filter_config);
        filter.refresh(&root, &filter_config);

        let watcher = Arc::new(Mutex::new(None));
        let watch_state = Arc::new(Mutex::new(HashSet::new()));

        if root.exists() {
            let (raw_tx, raw_rx) = mpsc::channel(EVENT_QUEUE);
            let os_watcher = create_fs_watcher(&root, &filter, raw_tx, &watch_state)?;
            *watcher.lock().expect("watcher lock") = Some(os_watcher);

            spawn_watch_loop(WatchLoop {
                root: root.clone(),
                config,
                filter,
                raw_rx,
                command_rx,
                events_tx,
                ready_tx,
                watcher: watcher.clone(),
                watch_state: watch_state.clone(),
            });
        } else {
            log::warn!(
                "watch root {} does not exist; watcher is inert",
                root.display()
            );
            let events_tx_ready = events_tx.clone();
            tokio::spawn(async move {
                let _ = ready_tx.send(true);
                let _ = events_tx_ready.send(WatchEvent::Ready).await;
                // Keep the command channel alive so stop() still works.
                let mut command_rx = command_rx;
                while let Some(cmd) = command_rx.recv().await {
                    if matches!(cmd, WatcherCommand::Shutdown) {
                        break;
                    }
                }
            });
        }

        Ok((
            Self {
                inner: Arc::new(WatcherInner {
                    root,
                    command_tx,
                    ready_rx,
                    watcher,
                    watch_state,
                }),
            },
            events_rx,
        ))
    }

    /// Whether the given directory is under an active watch.
    #[must_use]
    pub fn is_watching(&self, path: &Path) -> bool {
        self.inner
            .watch_state
            .lock()
            .expect("watch state lock")
            .contains(path)
    }

    /// Directories currently watched.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .inner
            .watch_state
            .lock()
            .expect("watch state lock")
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner
            .watch_state
            .lock()
            .expect("watch state lock")
            .len()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Force pending rename-window deletes out as `Deleted` events now.
    /// Test-harness helper for deterministic draining.
    pub async fn flush_events(&self) {
        let _ = self.inner.command_tx.send(WatcherCommand::Flush).await;
    }

    /// Block until the initial scan has completed (the `Ready` event has
    /// been emitted), or the timeout elapses. Returns whether ready.
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut ready_rx = self.inner.ready_rx.clone();
        tokio::time::timeout(timeout, async {
            while !*ready_rx.borrow() {
                if ready_rx.changed().await.is_err() {
                    return false;
                }
            }
            true
        })
        .await
        .unwrap_or(false)
    }

    /// Stop watching and release the OS handles.
    pub async fn stop(&self) {
        let _ = self.inner.command_tx.send(WatcherCommand::Shutdown).await;
        self.release_os_watcher();
    }

    fn release_os_watcher(&self) {
        // Dropping the notify watcher releases its OS handles; this runs on
        // every exit path, including abnormal ones, via ProjectWatcher's
        // Drop.
        self.inner.watcher.lock().expect("watcher lock").take();
        self.inner
            .watch_state
            .lock()
            .expect("watch state lock")
            .clear();
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let _ = self.command_tx.try_send(WatcherCommand::Shutdown);
        self.watcher.lock().expect("watcher lock").take();
    }
}

fn create_fs_watcher(
    root: &Path,
    filter: &PathFilter,
    sender: mpsc::Sender<notify::Result<Event>>,
    watch_state: &Arc<Mutex<HashSet<PathBuf>>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
    )
    .map_err(|e| IndexerError::WatchFailed(format!("watcher init failed: {e}")))?;

    let mut guard = watch_state.lock().expect("watch state lock");
    for dir in build_watch_list(root, filter) {
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            log::warn!("failed to watch {}: {err}", dir.display());
            continue;
        }
        guard.insert(dir);
    }
    Ok(watcher)
}

/// Enumerate the directories to watch: the root plus every non-ignored
/// subdirectory.
fn build_watch_list(root: &Path, filter: &PathFilter) -> Vec<PathBuf> {
    let mut out: HashSet<PathBuf> = HashSet::new();
    out.insert(root.to_path_buf());

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false);

    for entry in builder.build() {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        if is_watchable_dir(root, path, filter) {
            out.insert(path.to_path_buf());
        }
    }

    out.into_iter().collect()
}

fn is_watchable_dir(root: &Path, path: &Path, filter: &PathFilter) -> bool {
    if path == root {
        return true;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    for component in relative.components() {
        if let std::path::Component::Normal(name) = component {
            if filter.should_ignore_dir(&name.to_string_lossy()) {
                return false;
            }
        }
    }
    true
}

fn maybe_add_watches(
    root: &Path,
    filter: &PathFilter,
    event: &Event,
    watcher: &Arc<Mutex<Option<RecommendedWatcher>>>,
    watch_state: &Arc<Mutex<HashSet<PathBuf>>>,
) {
    for path in &event.paths {
        let Ok(meta) = std::fs::metadata(path) else {
            continue;
        };
        if !meta.is_dir() || !is_watchable_dir(root, path, filter) {
            continue;
        }

        let newly_tracked = watch_state
            .lock()
            .expect("watch state lock")
            .insert(path.clone());
        if !newly_tracked {
            continue;
        }
        let mut guard = watcher.lock().expect("watcher lock");
        if let Some(watcher) = guard.as_mut() {
            if let Err(err) = watcher.watch(path, RecursiveMode::NonRecursive) {
                log::warn!("failed to watch new dir {}: {err}", path.display());
                watch_state.lock().expect("watch state lock").remove(path);
            }
        }
    }
}

/// Delete events parked for the rename window, keyed by relative path.
struct RenameTracker {
    window: Duration,
    pending: HashMap<String, PendingDelete>,
}

struct PendingDelete {
    hash: String,
    size: u64,
    expires_at: Instant,
}

impl RenameTracker {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    fn park_delete(&mut self, rel_path: String, hash: String, size: u64) {
        self.pending.insert(
            rel_path,
            PendingDelete {
                hash,
                size,
                expires_at: Instant::now() + self.window,
            },
        );
    }

    /// An add matching a parked delete (same hash and size) within the
    /// window turns the pair into a rename; returns the old path.
    fn match_add(&mut self, hash: &str, size: u64) -> Option<String> {
        let from = self
            .pending
            .iter()
            .find(|(_, d)| d.hash == hash && d.size == size)
            .map(|(rel, _)| rel.clone())?;
        self.pending.remove(&from);
        Some(from)
    }

    /// Deletes whose window has expired; they are real deletes after all.
    fn take_expired(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, d)| d.expires_at <= now)
            .map(|(rel, _)| rel.clone())
            .collect();
        for rel in &expired {
            self.pending.remove(rel);
        }
        expired
    }

    fn drain(&mut self) -> Vec<String> {
        let mut all: Vec<String> = self.pending.drain().map(|(rel, _)| rel).collect();
        all.sort();
        all
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.pending.values().map(|d| d.expires_at).min()
    }
}

struct WatchLoop {
    root: PathBuf,
    config: WatcherConfig,
    filter: PathFilter,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    command_rx: mpsc::Receiver<WatcherCommand>,
    events_tx: mpsc::Sender<WatchEvent>,
    ready_tx: tokio::sync::watch::Sender<bool>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    watch_state: Arc<Mutex<HashSet<PathBuf>>>,
}

fn spawn_watch_loop(ctx: WatchLoop) {
    tokio::spawn(async move {
        let WatchLoop {
            root,
            config,
            filter,
            mut raw_rx,
            mut command_rx,
            events_tx,
            ready_tx,
            watcher,
            watch_state,
        } = ctx;

        // Snapshot of live files: rel path → (hash, size). Seeds rename
        // matching and suppresses no-op events for pre-existing files.
        let mut seen: HashMap<String, (String, u64)> = HashMap::new();
        initial_scan(&root, &filter, &mut seen).await;

        if !config.ignore_initial {
            let mut initial: Vec<&String> = seen.keys().collect();
            initial.sort();
            for rel_path in initial {
                let _ = events_tx
                    .send(WatchEvent::Added {
                        rel_path: rel_path.clone(),
                    })
                    .await;
            }
        }
        let _ = ready_tx.send(true);
        let _ = events_tx.send(WatchEvent::Ready).await;

        let mut renames = RenameTracker::new(Duration::from_millis(config.rename_window_ms));

        loop {
            let deadline = renames.next_expiry();
            tokio::select! {
                maybe_event = raw_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    handle_raw_event(
                        &root,
                        &filter,
                        &events_tx,
                        &watcher,
                        &watch_state,
                        &mut seen,
                        &mut renames,
                        event,
                    )
                    .await;
                }
                maybe_cmd = command_rx.recv() => {
                    match maybe_cmd {
                        Some(WatcherCommand::Flush) => {
                            for rel_path in renames.drain() {
                                seen.remove(&rel_path);
                                let _ = events_tx.send(WatchEvent::Deleted { rel_path }).await;
                            }
                        }
                        Some(WatcherCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(at) = deadline {
                        time::sleep_until(at).await;
                    }
                }, if deadline.is_some() => {
                    for rel_path in renames.take_expired(Instant::now()) {
                        seen.remove(&rel_path);
                        let _ = events_tx.send(WatchEvent::Deleted { rel_path }).await;
                    }
                }
            }
        }
    });
}

async fn initial_scan(
    root: &Path,
    filter: &PathFilter,
    seen: &mut HashMap<String, (String, u64)>,
) {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false);

    for entry in builder.build() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(rel_path) = relative_path(root, path) else {
            continue;
        };
        if filter.should_ignore_file(&rel_path) {
            continue;
        }
        if let Ok(bytes) = tokio::fs::read(path).await {
            if !is_binary(&bytes) {
                seen.insert(rel_path, (hash_bytes(&bytes), bytes.len() as u64));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_raw_event(
    root: &Path,
    filter: &PathFilter,
    events_tx: &mpsc::Sender<WatchEvent>,
    watcher: &Arc<Mutex<Option<RecommendedWatcher>>>,
    watch_state: &Arc<Mutex<HashSet<PathBuf>>>,
    seen: &mut HashMap<String, (String, u64)>,
    renames: &mut RenameTracker,
    event: notify::Result<Event>,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            log::warn!("watcher error on {}: {err}", root.display());
            let _ = events_tx
                .send(WatchEvent::Error {
                    message: err.to_string(),
                })
                .await;
            return;
        }
    };

    maybe_add_watches(root, filter, &event, watcher, watch_state);

    for path in &event.paths {
        let Some(rel_path) = relative_path(root, path) else {
            continue;
        };
        if filter.should_ignore_file(&rel_path) {
            continue;
        }

        if path.is_file() {
            let Ok(bytes) = tokio::fs::read(path).await else {
                continue;
            };
            if is_binary(&bytes) {
                continue;
            }
            let hash = hash_bytes(&bytes);
            let size = bytes.len() as u64;

            if !seen.contains_key(&rel_path) {
                if let Some(from) = renames.match_add(&hash, size) {
                    seen.remove(&from);
                    seen.insert(rel_path.clone(), (hash, size));
                    let _ = events_tx
                        .send(WatchEvent::Renamed {
                            from,
                            to: rel_path.clone(),
                        })
                        .await;
                    continue;
                }
                seen.insert(rel_path.clone(), (hash, size));
                let _ = events_tx
                    .send(WatchEvent::Added {
                        rel_path: rel_path.clone(),
                    })
                    .await;
            } else {
                let unchanged = seen
                    .get(&rel_path)
                    .is_some_and(|(prior, _)| *prior == hash);
                seen.insert(rel_path.clone(), (hash, size));
                if !unchanged {
                    let _ = events_tx
                        .send(WatchEvent::Changed {
                            rel_path: rel_path.clone(),
                        })
                        .await;
                }
            }
        } else if !path.exists() {
            // Park tracked deletions for the rename window.
            if let Some((hash, size)) = seen.get(&rel_path).cloned() {
                seen.remove(&rel_path);
                renames.park_delete(rel_path.clone(), hash, size);
            }
        }
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .filter(|rel| !rel.is_empty())
}
