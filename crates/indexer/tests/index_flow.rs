use semsync_catalog::{HashCatalog, ProjectIds};
use semsync_indexer::{IndexerError, IndexingEvent, ProjectCoordinator};
use semsync_protocol::{BatchConfig, IndexingConfig, TraversalConfig};
use semsync_vector_store::{
    Embedder, EmbedderResult, EmbeddingInput, EmbeddingOutput, HashEmbedder, InMemoryVectorStore,
    ProviderInfo, VectorStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIMS: usize = 32;

struct Fixture {
    _state_dir: TempDir,
    project_dir: TempDir,
    coordinator: ProjectCoordinator,
    store: Arc<InMemoryVectorStore>,
    catalog: Arc<HashCatalog>,
}

fn fixture_with(config: IndexingConfig, embedder: Arc<dyn Embedder>) -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let project_dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let catalog = Arc::new(HashCatalog::open_in_memory().unwrap());
    let ids = Arc::new(ProjectIds::open(state_dir.path().join("projects.json")).unwrap());

    let coordinator = ProjectCoordinator::new(
        config,
        catalog.clone(),
        ids,
        store.clone(),
        embedder,
    )
    .unwrap();

    Fixture {
        _state_dir: state_dir,
        project_dir,
        coordinator,
        store,
        catalog,
    }
}

fn fixture() -> Fixture {
    fixture_with(IndexingConfig::default(), Arc::new(HashEmbedder::new(DIMS)))
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

async fn wait_for_completion(coordinator: &ProjectCoordinator, id: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(status) = coordinator.get_status(id) {
                if !status.is_indexing {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("indexing should terminate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fresh_index_creates_collection_and_points() {
    let fx = fixture();
    write(fx.project_dir.path(), "a.js", "const x=1;\n");

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    let collection = format!("project-{id}");
    assert!(fx.store.has_collection(&collection).await);
    assert_eq!(fx.store.collection_dimensions(&collection).await, Some(DIMS));
    assert_eq!(fx.store.point_count(&collection).await, 1);

    // The single point carries the file's absolute (canonical) path and
    // full span.
    let abs = fx
        .project_dir
        .path()
        .canonicalize()
        .unwrap()
        .join("a.js")
        .to_string_lossy()
        .to_string();
    let ids = fx
        .store
        .find_point_ids_by_payload(&collection, "file_path", &serde_json::json!(abs))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    let point = fx.store.get_point(&collection, &ids[0]).await.unwrap();
    assert_eq!(point.payload.get("start_line"), Some(&serde_json::json!(1)));
    assert_eq!(point.payload.get("end_line"), Some(&serde_json::json!(1)));

    let status = fx.coordinator.get_status(&id).unwrap();
    assert!(!status.is_indexing);
    assert_eq!(status.total_files, 1);
    assert_eq!(status.indexed_files, 1);
    assert_eq!(status.failed_files, 0);
    assert_eq!(status.progress_percent, 100);
    assert!(status.last_indexed.is_some());

    // The catalog remembers the file hash for change detection.
    assert!(fx.catalog.get(&id, "a.js").unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ignored_directories_contribute_nothing() {
    let fx = fixture();
    write(fx.project_dir.path(), "a.js", "const x=1;\n");
    write(
        fx.project_dir.path(),
        "node_modules/big.js",
        "module.exports = {};\n",
    );

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    let status = fx.coordinator.get_status(&id).unwrap();
    assert_eq!(status.total_files, 1);
    assert_eq!(fx.store.point_count(&format!("project-{id}")).await, 1);
    assert!(fx.catalog.get(&id, "node_modules/big.js").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversize_files_are_filtered_not_failed() {
    let config = IndexingConfig {
        traversal: TraversalConfig {
            max_file_size: 1024,
            ..Default::default()
        },
        ..Default::default()
    };
    let fx = fixture_with(config, Arc::new(HashEmbedder::new(DIMS)));
    write(fx.project_dir.path(), "ok.js", "const ok = true;\n");
    write(fx.project_dir.path(), "big.js", &"x".repeat(20 * 1024));

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    let status = fx.coordinator.get_status(&id).unwrap();
    assert_eq!(status.total_files, 1);
    assert_eq!(status.indexed_files, 1);
    // Filtered, not failed.
    assert_eq!(status.failed_files, 0);
    assert_eq!(fx.store.point_count(&format!("project-{id}")).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_while_indexing_is_rejected() {
    let embedder = Arc::new(SlowEmbedder {
        inner: HashEmbedder::new(DIMS),
        delay: Duration::from_millis(20),
    });
    let fx = fixture_with(IndexingConfig::default(), embedder);
    for i in 0..30 {
        write(
            fx.project_dir.path(),
            &format!("src/file_{i}.js"),
            &format!("export const value_{i} = {i};\n"),
        );
    }

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();

    // The first call holds the active slot until its run terminates.
    let second = fx.coordinator.start_indexing(fx.project_dir.path()).await;
    match second {
        Err(IndexerError::AlreadyIndexing(other)) => assert_eq!(other, id),
        other => panic!("expected AlreadyIndexing, got {other:?}"),
    }

    wait_for_completion(&fx.coordinator, &id).await;
    let status = fx.coordinator.get_status(&id).unwrap();
    assert_eq!(status.indexed_files, 30);
    assert_eq!(status.progress_percent, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifecycle_events_are_published() {
    let fx = fixture();
    write(fx.project_dir.path(), "a.js", "const x=1;\n");

    let mut events = fx.coordinator.events().subscribe();
    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    let mut saw_started = false;
    let mut saw_metrics = false;
    let mut saw_completed = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(500), events.recv()).await
    {
        match event {
            IndexingEvent::IndexingStarted { project_id } => {
                assert_eq!(project_id, id);
                saw_started = true;
            }
            IndexingEvent::IndexingMetrics {
                rel_path, metrics, ..
            } => {
                assert_eq!(rel_path, "a.js");
                assert_eq!(metrics.chunk_count, 1);
                saw_metrics = true;
            }
            IndexingEvent::IndexingCompleted { project_id } => {
                assert_eq!(project_id, id);
                saw_completed = true;
                break;
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_metrics && saw_completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_provider_falls_back_to_default_dimensions() {
    let config = IndexingConfig {
        embedder: "ollama".to_string(),
        ..Default::default()
    };
    let fx = fixture_with(config, Arc::new(HashEmbedder::unavailable()));
    write(fx.project_dir.path(), "a.js", "const x=1;\n");

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    // Collection was created with the ollama fallback dimension even though
    // embedding itself failed.
    let collection = format!("project-{id}");
    assert_eq!(fx.store.collection_dimensions(&collection).await, Some(768));

    let status = fx.coordinator.get_status(&id).unwrap();
    assert_eq!(status.failed_files, 1);
    assert_eq!(status.indexed_files, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reindex_replaces_stale_points() {
    let fx = fixture();
    write(fx.project_dir.path(), "a.js", "const x=1;\n");

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    write(fx.project_dir.path(), "a.js", "const x=2;\n");
    let same_id = fx.coordinator.reindex(fx.project_dir.path()).await.unwrap();
    assert_eq!(same_id, id);
    wait_for_completion(&fx.coordinator, &id).await;

    let collection = format!("project-{id}");
    assert_eq!(fx.store.point_count(&collection).await, 1);
    let ids = fx
        .store
        .find_point_ids_by_payload(
            &collection,
            "rel_path",
            &serde_json::json!("a.js"),
        )
        .await
        .unwrap();
    let point = fx.store.get_point(&collection, &ids[0]).await.unwrap();
    assert_eq!(
        point.payload.get("content"),
        Some(&serde_json::json!("const x=2;\n"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_project_removes_every_trace() {
    let fx = fixture();
    write(fx.project_dir.path(), "a.js", "const x=1;\n");

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    wait_for_completion(&fx.coordinator, &id).await;

    fx.coordinator.delete_project(&id).await.unwrap();

    assert!(fx.coordinator.get_status(&id).is_none());
    assert!(!fx.store.has_collection(&format!("project-{id}")).await);
    assert!(fx.catalog.entries_for_project(&id).unwrap().is_empty());
    assert_eq!(fx.catalog.cleanup_expired(0).unwrap(), 0);
}

/// Embedder that answers slowly, to hold an indexing run open long enough
/// for a cooperative stop to land between batches.
struct SlowEmbedder {
    inner: HashEmbedder,
    delay: Duration,
}

#[async_trait::async_trait]
impl Embedder for SlowEmbedder {
    async fn provider_info(&self) -> EmbedderResult<ProviderInfo> {
        self.inner.provider_info().await
    }

    async fn embed(&self, inputs: Vec<EmbeddingInput>) -> EmbedderResult<Vec<EmbeddingOutput>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(inputs).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_indexing_halts_between_batches() {
    let config = IndexingConfig {
        batching: BatchConfig {
            initial_size: 1,
            min_size: 1,
            max_size: 1,
            adjustment_factor: 1.5,
            performance_threshold_ms: 10_000,
            max_concurrency: 1,
        },
        ..Default::default()
    };
    let embedder = Arc::new(SlowEmbedder {
        inner: HashEmbedder::new(DIMS),
        delay: Duration::from_millis(50),
    });
    let fx = fixture_with(config, embedder);
    for i in 0..20 {
        write(
            fx.project_dir.path(),
            &format!("f{i}.js"),
            &format!("export const v{i} = {i};\n"),
        );
    }

    let id = fx
        .coordinator
        .start_indexing(fx.project_dir.path())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(fx.coordinator.stop_indexing(&id));

    wait_for_completion(&fx.coordinator, &id).await;
    let status = fx.coordinator.get_status(&id).unwrap();
    assert!(!status.is_indexing);
    assert!(
        status.indexed_files < 20,
        "stop should leave later batches undone (indexed {})",
        status.indexed_files
    );

    // Stopping an idle project reports nothing to stop.
    assert!(!fx.coordinator.stop_indexing(&id));
}
