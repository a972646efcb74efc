use crate::change_detector::{ChangeDetector, ChangeKind, FileChangeEvent, RawChange};
use crate::error::{IndexerError, Result};
use crate::events::{EventBus, FileMetrics, IndexingEvent};
use crate::memory::{rss_bytes, MemoryMonitor};
use crate::recovery::RecoveryRegistry;
use crate::runtime::{BatchRunner, RetryRunner};
use crate::scanner::{FileRecord, FileScanner};
use crate::status::{ProjectStatus, StatusRegistry};
use crate::watcher::{ProjectWatcher, WatchEvent};
use semsync_catalog::{HashCatalog, HashUpdate, ProjectIds, ProjectRow, ProjectStatusKind};
use semsync_code_chunker::{Chunker, CodeChunk};
use semsync_protocol::IndexingConfig;
use semsync_vector_store::{
    default_dimensions, DistanceMetric, Embedder, EmbeddingInput, VectorPoint, VectorStore,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Files past this size get a warning before chunking.
const LARGE_FILE_WARNING_BYTES: u64 = 1024 * 1024;

/// Per-file memory growth (as a percentage of the configured limit) that
/// triggers a memory warning event.
const FILE_MEMORY_WARN_PERCENT: f64 = 80.0;

/// The orchestrator: owns per-project state, the FIFO indexing queue, the
/// event bus, and the wiring from watchers through change detection down to
/// the vector store.
#[derive(Clone)]
pub struct ProjectCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: IndexingConfig,
    catalog: Arc<HashCatalog>,
    ids: Arc<ProjectIds>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventBus>,
    statuses: Arc<StatusRegistry>,
    recovery: Arc<RecoveryRegistry>,
    chunker: Arc<Chunker>,
    queue_tx: mpsc::UnboundedSender<IndexJob>,
    active: Mutex<HashMap<String, ActiveProject>>,
    watch_sessions: Mutex<HashMap<String, WatchSession>>,
}

struct ActiveProject {
    stop: Arc<AtomicBool>,
}

struct IndexJob {
    project_id: String,
    root: PathBuf,
    stop: Arc<AtomicBool>,
}

struct WatchSession {
    watcher: ProjectWatcher,
    pump: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// Shared context for per-file indexing work.
struct FileJobCtx {
    inner: Arc<CoordinatorInner>,
    project_id: String,
    collection: String,
}

impl ProjectCoordinator {
    /// Build a coordinator and start its queue worker.
    pub fn new(
        config: IndexingConfig,
        catalog: Arc<HashCatalog>,
        ids: Arc<ProjectIds>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate().map_err(IndexerError::InvalidConfig)?;
        let chunker = Arc::new(Chunker::new(config.chunking.clone())?);

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<IndexJob>();
        let inner = Arc::new(CoordinatorInner {
            config,
            catalog,
            ids,
            store,
            embedder,
            events: Arc::new(EventBus::new()),
            statuses: Arc::new(StatusRegistry::new()),
            recovery: Arc::new(RecoveryRegistry::with_defaults()),
            chunker,
            queue_tx,
            active: Mutex::new(HashMap::new()),
            watch_sessions: Mutex::new(HashMap::new()),
        });

        // Single worker drains the FIFO project queue; one project indexes
        // at a time per queue slot, and a failing project never tears the
        // loop down.
        let worker = inner.clone();
        tokio::spawn(async move {
            while let Some(job) = queue_rx.recv().await {
                run_and_settle_job(&worker, job).await;
            }
        });

        Ok(Self { inner })
    }

    /// Begin (re)indexing the project rooted at `path`; returns its id.
    ///
    /// Fails synchronously with `AlreadyIndexing` — without mutating any
    /// state — when the project is queued or indexing.
    pub async fn start_indexing(&self, path: impl AsRef<Path>) -> Result<String> {
        let project_id = self.inner.ids.generate_or_fetch(path.as_ref())?;
        // All downstream work uses the canonical root recorded in the
        // mapping, so vector payload paths stay byte-identical between full
        // runs and live updates.
        let root = PathBuf::from(
            self.inner
                .ids
                .get(&project_id)
                .ok_or_else(|| IndexerError::ProjectNotFound(project_id.clone()))?
                .path,
        );

        let stop = Arc::new(AtomicBool::new(false));
        {
            let mut active = self.inner.active.lock().expect("active lock");
            if active.contains_key(&project_id) {
                return Err(IndexerError::AlreadyIndexing(project_id));
            }
            active.insert(project_id.clone(), ActiveProject { stop: stop.clone() });
        }

        match self.prepare_and_enqueue(&project_id, &root, stop).await {
            Ok(()) => Ok(project_id),
            Err(err) => {
                self.inner.release_active(&project_id);
                Err(err)
            }
        }
    }

    /// Drop the previous collection and statuses, then start fresh.
    pub async fn reindex(&self, path: impl AsRef<Path>) -> Result<String> {
        let root = path.as_ref().to_path_buf();
        let project_id = self.inner.ids.generate_or_fetch(&root)?;
        if self
            .inner
            .active
            .lock()
            .expect("active lock")
            .contains_key(&project_id)
        {
            return Err(IndexerError::AlreadyIndexing(project_id));
        }

        let collection = semsync_catalog::collection_name(&project_id);
        if let Err(e) = self.inner.store.delete_collection(&collection).await {
            log::warn!("reindex: best-effort collection drop failed: {e}");
        }
        self.inner.statuses.remove(&project_id);
        self.inner.catalog.cleanup_project_entries(&project_id)?;

        self.start_indexing(&root).await
    }

    /// Cooperative stop: dequeues a queued project, lets an in-flight batch
    /// finish, and prevents further batches and retries. The watcher, if
    /// any, stays up. Returns whether there was anything to stop.
    pub fn stop_indexing(&self, project_id: &str) -> bool {
        let active = self.inner.active.lock().expect("active lock");
        match active.get(project_id) {
            Some(project) => {
                project.stop.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Tear the project down completely: watcher, collection, catalog rows,
    /// id mapping, statuses.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        if let Some(project) = self
            .inner
            .active
            .lock()
            .expect("active lock")
            .get(project_id)
        {
            project.stop.store(true, Ordering::Relaxed);
        }
        self.unwatch_project(project_id).await;

        let collection = semsync_catalog::collection_name(project_id);
        if let Err(e) = self.inner.store.delete_collection(&collection).await {
            log::warn!("delete_project: collection drop failed: {e}");
        }
        self.inner.catalog.delete_project(project_id)?;
        self.inner.ids.remove(project_id)?;
        self.inner.statuses.remove(project_id);
        Ok(())
    }

    #[must_use]
    pub fn get_status(&self, project_id: &str) -> Option<ProjectStatus> {
        self.inner.statuses.get(project_id)
    }

    #[must_use]
    pub fn all_statuses(&self) -> Vec<ProjectStatus> {
        self.inner.statuses.all()
    }

    /// The coordinator's event bus, for subscribing to lifecycle events.
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }

    /// Start live watching for an indexed project: watcher → change
    /// detector → single-file index updates.
    pub async fn watch_project(&self, project_id: &str) -> Result<()> {
        let mapping = self
            .inner
            .ids
            .get(project_id)
            .ok_or_else(|| IndexerError::ProjectNotFound(project_id.to_string()))?;
        let root = PathBuf::from(&mapping.path);

        {
            let sessions = self.inner.watch_sessions.lock().expect("session lock");
            if sessions.contains_key(project_id) {
                return Ok(());
            }
        }

        let (watcher, mut watch_rx) = ProjectWatcher::start(
            &root,
            self.inner.config.watcher.clone(),
            &self.inner.config.traversal,
        )?;
        if !watcher.wait_for_ready(Duration::from_secs(30)).await {
            log::warn!("watcher for {project_id} did not become ready in time");
        }

        let (detector, mut change_rx) =
            ChangeDetector::new(&root, self.inner.config.watcher.debounce_ms);
        // Prime the mirror so pre-existing files produce Modified, not
        // Created, and unchanged rewrites produce nothing.
        for entry in self.inner.catalog.entries_for_project(project_id)? {
            detector.seed(&entry.rel_path, &entry.content_hash);
        }

        let pump_detector = detector.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = watch_rx.recv().await {
                let raw = match event {
                    WatchEvent::Added { rel_path } | WatchEvent::Changed { rel_path } => {
                        RawChange::Upsert { rel_path }
                    }
                    WatchEvent::Deleted { rel_path } => RawChange::Removed { rel_path },
                    WatchEvent::Renamed { from, to } => RawChange::Renamed { from, to },
                    WatchEvent::Error { message } => {
                        log::warn!("watcher reported: {message}");
                        continue;
                    }
                    WatchEvent::Ready => {
                        log::debug!("watcher ready");
                        continue;
                    }
                };
                pump_detector.on_raw_change(raw).await;
            }
        });

        let consumer_inner = self.inner.clone();
        let consumer_project = project_id.to_string();
        let consumer = tokio::spawn(async move {
            while let Some(change) = change_rx.recv().await {
                if let Err(e) =
                    handle_file_change(&consumer_inner, &consumer_project, &change).await
                {
                    log::error!(
                        "file change for {} failed ({}): {e}{}",
                        change.rel_path,
                        e.kind().as_str(),
                        e.hint().map(|h| format!(" ({h})")).unwrap_or_default()
                    );
                }
            }
        });

        self.inner
            .watch_sessions
            .lock()
            .expect("session lock")
            .insert(
                project_id.to_string(),
                WatchSession {
                    watcher,
                    pump,
                    consumer,
                },
            );
        Ok(())
    }

    /// Stop live watching for a project, releasing the OS handles.
    pub async fn unwatch_project(&self, project_id: &str) {
        let session = self
            .inner
            .watch_sessions
            .lock()
            .expect("session lock")
            .remove(project_id);
        if let Some(session) = session {
            session.watcher.stop().await;
            session.pump.abort();
            session.consumer.abort();
        }
    }

    /// Whether a live watcher is running for the project.
    #[must_use]
    pub fn is_watching(&self, project_id: &str) -> bool {
        self.inner
            .watch_sessions
            .lock()
            .expect("session lock")
            .contains_key(project_id)
    }

    /// Apply a single logical file change outside of watch mode (the watch
    /// pipeline calls the same code internally).
    pub async fn apply_file_change(
        &self,
        project_id: &str,
        change: &FileChangeEvent,
    ) -> Result<()> {
        handle_file_change(&self.inner, project_id, change).await
    }

    async fn prepare_and_enqueue(
        &self,
        project_id: &str,
        root: &Path,
        stop: Arc<AtomicBool>,
    ) -> Result<()> {
        let inner = &self.inner;
        let collection = semsync_catalog::collection_name(project_id);
        let space = semsync_catalog::space_name(project_id);

        // Reindex semantics: a previously indexed project loses its old
        // collection before the new run begins.
        let previously_indexed = inner.catalog.get_project(project_id)?.is_some();
        if previously_indexed {
            if let Err(e) = inner.store.delete_collection(&collection).await {
                log::warn!("dropping previous collection {collection} failed: {e}");
            }
        }

        let dimensions = match inner.embedder.provider_info().await {
            Ok(info) if info.available && info.dimensions > 0 => info.dimensions,
            Ok(info) => {
                log::warn!(
                    "embedding provider {} reported no usable dimension; using defaults",
                    info.name
                );
                default_dimensions(&inner.config.embedder)
            }
            Err(e) => {
                log::warn!("embedding provider unreachable ({e}); using default dimensions");
                default_dimensions(&inner.config.embedder)
            }
        };

        let retry = RetryRunner::new(inner.config.retry.clone(), inner.recovery.clone());
        retry
            .execute_with_retry("create_collection", || {
                let store = inner.store.clone();
                let collection = collection.clone();
                async move {
                    store
                        .create_collection(&collection, dimensions, DistanceMetric::Cosine)
                        .await
                        .map_err(IndexerError::from)
                }
            })
            .await?;

        let now = unix_now();
        inner.catalog.upsert_project(&ProjectRow {
            id: project_id.to_string(),
            path: root.to_string_lossy().to_string(),
            collection_name: collection,
            space_name: space,
            created_at: now,
            updated_at: now,
            last_indexed_at: None,
            status: ProjectStatusKind::Indexing,
        })?;

        inner
            .statuses
            .begin(project_id, &root.to_string_lossy());

        inner
            .queue_tx
            .send(IndexJob {
                project_id: project_id.to_string(),
                root: root.to_path_buf(),
                stop,
            })
            .map_err(|_| IndexerError::Other("index queue closed".to_string()))?;

        inner.events.emit(IndexingEvent::IndexingStarted {
            project_id: project_id.to_string(),
        });
        Ok(())
    }
}

impl CoordinatorInner {
    fn release_active(&self, project_id: &str) {
        self.active.lock().expect("active lock").remove(project_id);
    }
}

/// Run one queued job and settle every outcome: success, stop, failure.
async fn run_and_settle_job(inner: &Arc<CoordinatorInner>, job: IndexJob) {
    if job.stop.load(Ordering::Relaxed) {
        log::info!("project {} stopped while queued", job.project_id);
        inner.statuses.complete(&job.project_id, None);
        let _ = inner
            .catalog
            .set_project_status(&job.project_id, ProjectStatusKind::Active);
        inner.release_active(&job.project_id);
        return;
    }

    match run_index_job(inner, &job).await {
        Ok(()) => {}
        Err(err) => {
            let hint = err
                .hint()
                .map(|h| format!(" ({h})"))
                .unwrap_or_default();
            log::error!(
                "indexing {} failed ({}): {err}{hint}",
                job.project_id,
                err.kind().as_str()
            );
            inner.statuses.complete(&job.project_id, None);
            let _ = inner
                .catalog
                .set_project_status(&job.project_id, ProjectStatusKind::Failed);
            inner.events.emit(IndexingEvent::IndexingError {
                project_id: job.project_id.clone(),
                message: format!("{err}{hint}"),
            });
        }
    }
    inner.release_active(&job.project_id);
}

async fn run_index_job(inner: &Arc<CoordinatorInner>, job: &IndexJob) -> Result<()> {
    // 1. Traverse on a blocking thread.
    let scan_root = job.root.clone();
    let scan_config = inner.config.traversal.clone();
    let traversal = tokio::task::spawn_blocking(move || {
        FileScanner::new(scan_root, scan_config).scan()
    })
    .await
    .map_err(|e| IndexerError::Other(format!("traversal task failed: {e}")))??;

    for error in &traversal.errors {
        log::warn!("traversal ({}): {error}", job.project_id);
    }
    inner
        .statuses
        .set_total(&job.project_id, traversal.files.len());

    // 2. Adaptive batches over the file list.
    let ctx = Arc::new(FileJobCtx {
        inner: inner.clone(),
        project_id: job.project_id.clone(),
        collection: semsync_catalog::collection_name(&job.project_id),
    });
    let runner = BatchRunner::new(
        inner.config.batching.clone(),
        MemoryMonitor::new(&inner.config.memory),
    )
    .with_stop_flag(job.stop.clone());

    let processor_ctx = ctx.clone();
    let progress_inner = inner.clone();
    let progress_project = job.project_id.clone();
    let results = runner
        .process_batches(
            traversal.files,
            "index-files",
            move |record| {
                let ctx = processor_ctx.clone();
                async move { index_one_file(&ctx, record).await }
            },
            move |report| {
                if let Some(percent) = progress_inner.statuses.progress(&progress_project) {
                    progress_inner.events.emit(IndexingEvent::IndexingProgress {
                        project_id: progress_project.clone(),
                        percent,
                    });
                }
                log::debug!(
                    "batch {} of project {}: {} files in {:?}, next batch {}",
                    report.index,
                    progress_project,
                    report.size,
                    report.duration,
                    report.next_size
                );
            },
        )
        .await;

    // 3. Settle.
    if job.stop.load(Ordering::Relaxed) {
        log::info!(
            "project {} stopped after {} of its files were dispatched",
            job.project_id,
            results.len()
        );
        inner.statuses.complete(&job.project_id, None);
        inner
            .catalog
            .set_project_status(&job.project_id, ProjectStatusKind::Active)?;
        return Ok(());
    }

    let now = unix_now();
    inner.statuses.complete(&job.project_id, Some(now));
    inner.catalog.touch_project_indexed(&job.project_id)?;
    inner.ids.touch_indexed(&job.project_id)?;
    inner.events.emit(IndexingEvent::IndexingCompleted {
        project_id: job.project_id.clone(),
    });
    Ok(())
}

/// Index one file end to end: read, chunk, embed, upsert, record. Failures
/// are charged to the file and never abort the batch.
async fn index_one_file(ctx: &Arc<FileJobCtx>, record: FileRecord) -> Result<()> {
    let project_id = ctx.project_id.clone();
    let outcome = index_file_inner(ctx, &record).await;
    match outcome {
        Ok(metrics) => {
            ctx.inner.statuses.record_files(&project_id, 1, 0);
            maybe_emit_memory_warning(ctx, &metrics);
            ctx.inner.events.emit(IndexingEvent::IndexingMetrics {
                project_id,
                rel_path: record.rel_path,
                metrics,
            });
            Ok(())
        }
        Err(err) => {
            ctx.inner.statuses.record_files(&project_id, 0, 1);
            log::warn!(
                "indexing file {} failed ({}): {err}",
                record.rel_path,
                err.kind().as_str()
            );
            Err(err)
        }
    }
}

async fn index_file_inner(ctx: &Arc<FileJobCtx>, record: &FileRecord) -> Result<FileMetrics> {
    let inner = &ctx.inner;
    let started = Instant::now();
    let rss_before = rss_bytes().unwrap_or(0);

    if record.size > LARGE_FILE_WARNING_BYTES {
        log::warn!(
            "large file {} ({} bytes); chunking may be slow",
            record.rel_path,
            record.size
        );
    }

    let content = tokio::fs::read_to_string(&record.abs_path).await?;
    let language = record.language.as_deref().unwrap_or("unknown");
    let chunks = inner
        .chunker
        .chunk(&content, language, &record.rel_path)?;

    if !chunks.is_empty() {
        let points = embed_chunks(ctx, record, &chunks).await?;
        let retry = RetryRunner::new(inner.config.retry.clone(), inner.recovery.clone());
        let collection = ctx.collection.clone();
        retry
            .execute_with_retry("upsert_vectors", || {
                let store = inner.store.clone();
                let collection = collection.clone();
                let points = points.clone();
                async move {
                    store
                        .upsert(&collection, points)
                        .await
                        .map_err(IndexerError::from)
                }
            })
            .await?;
    }

    inner.catalog.put(&HashUpdate {
        project_id: ctx.project_id.clone(),
        rel_path: record.rel_path.clone(),
        file_path: record.abs_path.to_string_lossy().to_string(),
        content_hash: record.content_hash.clone(),
        file_size: record.size as i64,
        last_modified: record.mtime,
        language: record.language.clone(),
        file_type: (!record.extension.is_empty()).then(|| record.extension.clone()),
    })?;

    let rss_after = rss_bytes().unwrap_or(rss_before);
    Ok(FileMetrics {
        file_size: record.size,
        chunk_count: chunks.len(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        memory_delta_bytes: rss_after as i64 - rss_before as i64,
    })
}

async fn embed_chunks(
    ctx: &Arc<FileJobCtx>,
    record: &FileRecord,
    chunks: &[CodeChunk],
) -> Result<Vec<VectorPoint>> {
    let inner = &ctx.inner;
    let inputs: Vec<EmbeddingInput> = chunks
        .iter()
        .map(|chunk| EmbeddingInput::new(chunk.content.clone()))
        .collect();

    let retry = RetryRunner::new(inner.config.retry.clone(), inner.recovery.clone());
    let outputs = retry
        .execute_with_retry("embed_chunks", || {
            let embedder = inner.embedder.clone();
            let inputs = inputs.clone();
            async move { embedder.embed(inputs).await.map_err(IndexerError::from) }
        })
        .await?;

    if outputs.len() != chunks.len() {
        return Err(IndexerError::Embedder(
            semsync_vector_store::EmbedderError::ResultCountMismatch {
                expected: chunks.len(),
                actual: outputs.len(),
            },
        ));
    }

    Ok(chunks
        .iter()
        .zip(outputs)
        .map(|(chunk, output)| VectorPoint {
            id: vector_point_id(chunk),
            vector: output.vector,
            payload: chunk_payload(record, chunk),
        })
        .collect())
}

fn maybe_emit_memory_warning(ctx: &Arc<FileJobCtx>, metrics: &FileMetrics) {
    let limit = ctx.inner.config.memory.memory_limit_mb * 1024 * 1024;
    if limit == 0 || metrics.memory_delta_bytes <= 0 {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let delta_percent = metrics.memory_delta_bytes as f64 / limit as f64 * 100.0;
    if delta_percent > FILE_MEMORY_WARN_PERCENT {
        ctx.inner.events.emit(IndexingEvent::MemoryWarning {
            project_id: ctx.project_id.clone(),
            used_percent: delta_percent,
            threshold_percent: FILE_MEMORY_WARN_PERCENT,
        });
    }
}

/// React to one logical change event: deletes remove points, upserts
/// re-chunk and re-embed, renames re-point the payload.
async fn handle_file_change(
    inner: &Arc<CoordinatorInner>,
    project_id: &str,
    change: &FileChangeEvent,
) -> Result<()> {
    let mapping = inner
        .ids
        .get(project_id)
        .ok_or_else(|| IndexerError::ProjectNotFound(project_id.to_string()))?;
    let root = PathBuf::from(&mapping.path);
    let collection = mapping.collection_name.clone();

    match change.kind {
        ChangeKind::Deleted => {
            delete_file_points(inner, &collection, &root, &change.rel_path).await?;
            inner.catalog.delete(project_id, &change.rel_path)?;
        }
        ChangeKind::Created | ChangeKind::Modified => {
            delete_file_points(inner, &collection, &root, &change.rel_path).await?;
            reindex_single_file(inner, project_id, &collection, &root, &change.rel_path).await?;
        }
        ChangeKind::Renamed => {
            let old_rel = change
                .old_rel_path
                .as_deref()
                .ok_or_else(|| IndexerError::Other("rename without old path".to_string()))?;
            inner.catalog.rename(project_id, old_rel, &change.rel_path)?;
            delete_file_points(inner, &collection, &root, old_rel).await?;
            reindex_single_file(inner, project_id, &collection, &root, &change.rel_path).await?;
        }
    }
    Ok(())
}

async fn delete_file_points(
    inner: &Arc<CoordinatorInner>,
    collection: &str,
    root: &Path,
    rel_path: &str,
) -> Result<()> {
    let abs = root.join(rel_path);
    let ids = inner
        .store
        .find_point_ids_by_payload(
            collection,
            "file_path",
            &json!(abs.to_string_lossy().to_string()),
        )
        .await?;
    if !ids.is_empty() {
        inner.store.delete_points(collection, &ids).await?;
    }
    Ok(())
}

async fn reindex_single_file(
    inner: &Arc<CoordinatorInner>,
    project_id: &str,
    collection: &str,
    root: &Path,
    rel_path: &str,
) -> Result<()> {
    let abs = root.join(rel_path);
    let Some(record) = single_file_record(inner, root, &abs, rel_path)? else {
        // Unsupported or binary: tracked nowhere, nothing to index.
        return Ok(());
    };

    let ctx = Arc::new(FileJobCtx {
        inner: inner.clone(),
        project_id: project_id.to_string(),
        collection: collection.to_string(),
    });
    index_file_inner(&ctx, &record).await.map(|_| ())
}

/// Build a `FileRecord` for a single live file, applying the same size,
/// language and binary gates as traversal.
fn single_file_record(
    inner: &Arc<CoordinatorInner>,
    _root: &Path,
    abs: &Path,
    rel_path: &str,
) -> Result<Option<FileRecord>> {
    let extension = abs
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let language = match inner.config.traversal.supported_extensions.get(&extension) {
        Some(language) => language.clone(),
        None => return Ok(None),
    };

    let metadata = std::fs::metadata(abs)?;
    if metadata.len() > inner.config.traversal.max_file_size {
        return Err(IndexerError::FileTooLarge {
            rel_path: rel_path.to_string(),
            size: metadata.len(),
            limit: inner.config.traversal.max_file_size,
        });
    }

    let bytes = std::fs::read(abs)?;
    if crate::scanner::is_binary(&bytes) {
        return Ok(None);
    }

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(Some(FileRecord {
        abs_path: abs.to_path_buf(),
        rel_path: rel_path.to_string(),
        name: abs
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        extension,
        size: metadata.len(),
        content_hash: crate::scanner::hash_bytes(&bytes),
        mtime,
        language: Some(language),
        is_binary: false,
    }))
}

/// Stable vector-point id: the normalized `path_start-end` stem truncated
/// to leave room for an 8-hex content suffix, which keeps ids unique even
/// when truncation collides.
fn vector_point_id(chunk: &CodeChunk) -> String {
    let raw = format!(
        "{}_{}-{}",
        chunk.rel_path, chunk.start_line, chunk.end_line
    );
    let mut stem: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.truncate(246);
    let suffix = &chunk.id[..8.min(chunk.id.len())];
    format!("{stem}_{suffix}")
}

fn chunk_payload(record: &FileRecord, chunk: &CodeChunk) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(
        "file_path".to_string(),
        json!(record.abs_path.to_string_lossy().to_string()),
    );
    payload.insert("rel_path".to_string(), json!(chunk.rel_path));
    payload.insert("start_line".to_string(), json!(chunk.start_line));
    payload.insert("end_line".to_string(), json!(chunk.end_line));
    payload.insert("chunk_type".to_string(), json!(chunk.chunk_type.as_str()));
    payload.insert("content".to_string(), json!(chunk.content));
    if let Some(language) = &chunk.language {
        payload.insert("language".to_string(), json!(language));
    }
    if let Some(name) = &chunk.function_name {
        payload.insert("function_name".to_string(), json!(name));
    }
    if let Some(name) = &chunk.class_name {
        payload.insert("class_name".to_string(), json!(name));
    }
    payload
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
