use semsync_catalog::{HashCatalog, ProjectIds};
use semsync_indexer::{
    ChangeDetector, ChangeKind, FileChangeEvent, ProjectCoordinator, RawChange,
};
use semsync_protocol::IndexingConfig;
use semsync_vector_store::{HashEmbedder, InMemoryVectorStore, VectorStore};
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
    project_id: String,
}

async fn indexed_fixture(files: &[(&str, &str)]) -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let project_dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let catalog = Arc::new(HashCatalog::open_in_memory().unwrap());
    let ids = Arc::new(ProjectIds::open(state_dir.path().join("projects.json")).unwrap());

    for (rel, content) in files {
        write(project_dir.path(), rel, content);
    }

    let coordinator = ProjectCoordinator::new(
        IndexingConfig::default(),
        catalog.clone(),
        ids,
        store.clone(),
        Arc::new(HashEmbedder::new(DIMS)),
    )
    .unwrap();

    let project_id = coordinator
        .start_indexing(project_dir.path())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(status) = coordinator.get_status(&project_id) {
                if !status.is_indexing {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("initial index should finish");

    Fixture {
        _state_dir: state_dir,
        project_dir,
        coordinator,
        store,
        catalog,
        project_id,
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn change(kind: ChangeKind, rel_path: &str) -> FileChangeEvent {
    FileChangeEvent {
        kind,
        rel_path: rel_path.to_string(),
        old_rel_path: None,
        previous_hash: None,
        current_hash: None,
        timestamp_ms: 0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn modification_replaces_the_points_for_that_file() {
    let fx = indexed_fixture(&[("a.js", "const x=1;\n"), ("b.js", "const y=2;\n")]).await;
    let collection = format!("project-{}", fx.project_id);
    assert_eq!(fx.store.point_count(&collection).await, 2);

    write(fx.project_dir.path(), "a.js", "const x=2;\n");
    fx.coordinator
        .apply_file_change(&fx.project_id, &change(ChangeKind::Modified, "a.js"))
        .await
        .unwrap();

    // Exactly one point per file survives, with the new content.
    assert_eq!(fx.store.point_count(&collection).await, 2);
    let ids = fx
        .store
        .find_point_ids_by_payload(&collection, "rel_path", &serde_json::json!("a.js"))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    let point = fx.store.get_point(&collection, &ids[0]).await.unwrap();
    assert_eq!(
        point.payload.get("content"),
        Some(&serde_json::json!("const x=2;\n"))
    );

    // The catalog reflects the new hash.
    let stored = fx.catalog.get(&fx.project_id, "a.js").unwrap().unwrap();
    assert_eq!(stored.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletion_removes_points_and_catalog_entry() {
    let fx = indexed_fixture(&[("a.js", "const x=1;\n")]).await;
    let collection = format!("project-{}", fx.project_id);

    std::fs::remove_file(fx.project_dir.path().join("a.js")).unwrap();
    fx.coordinator
        .apply_file_change(&fx.project_id, &change(ChangeKind::Deleted, "a.js"))
        .await
        .unwrap();

    assert_eq!(fx.store.point_count(&collection).await, 0);
    assert!(fx.catalog.get(&fx.project_id, "a.js").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_keeps_one_point_per_file_and_moves_the_hash() {
    let fx = indexed_fixture(&[("a.js", "const x=1;\n")]).await;
    let collection = format!("project-{}", fx.project_id);
    let old_hash = fx.catalog.get(&fx.project_id, "a.js").unwrap().unwrap();

    std::fs::rename(
        fx.project_dir.path().join("a.js"),
        fx.project_dir.path().join("b.js"),
    )
    .unwrap();
    let event = FileChangeEvent {
        kind: ChangeKind::Renamed,
        rel_path: "b.js".to_string(),
        old_rel_path: Some("a.js".to_string()),
        previous_hash: Some(old_hash.clone()),
        current_hash: Some(old_hash.clone()),
        timestamp_ms: 0,
    };
    fx.coordinator
        .apply_file_change(&fx.project_id, &event)
        .await
        .unwrap();

    assert_eq!(fx.store.point_count(&collection).await, 1);
    let ids = fx
        .store
        .find_point_ids_by_payload(&collection, "rel_path", &serde_json::json!("b.js"))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    // Hash preserved under the new path, gone from the old one.
    assert_eq!(
        fx.catalog.get(&fx.project_id, "b.js").unwrap(),
        Some(old_hash)
    );
    assert!(fx.catalog.get(&fx.project_id, "a.js").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detector_feeds_coordinator_end_to_end() {
    let fx = indexed_fixture(&[("a.js", "const x=1;\n")]).await;
    let collection = format!("project-{}", fx.project_id);

    let (detector, mut changes) = ChangeDetector::new(fx.project_dir.path(), 20);
    for entry in fx.catalog.entries_for_project(&fx.project_id).unwrap() {
        detector.seed(&entry.rel_path, &entry.content_hash);
    }

    // An identical rewrite produces no logical change at all.
    write(fx.project_dir.path(), "a.js", "const x=1;\n");
    detector
        .on_raw_change(RawChange::Upsert {
            rel_path: "a.js".to_string(),
        })
        .await;
    detector.flush().await;
    assert!(
        tokio::time::timeout(Duration::from_millis(100), changes.recv())
            .await
            .is_err(),
        "no-op rewrite must not emit"
    );

    // A real edit flows through to the vector store.
    write(fx.project_dir.path(), "a.js", "const x=42;\n");
    detector
        .on_raw_change(RawChange::Upsert {
            rel_path: "a.js".to_string(),
        })
        .await;
    detector.flush().await;

    let event = tokio::time::timeout(Duration::from_secs(2), changes.recv())
        .await
        .expect("change event in time")
        .expect("channel open");
    assert_eq!(event.kind, ChangeKind::Modified);

    fx.coordinator
        .apply_file_change(&fx.project_id, &event)
        .await
        .unwrap();

    let ids = fx
        .store
        .find_point_ids_by_payload(&collection, "rel_path", &serde_json::json!("a.js"))
        .await
        .unwrap();
    let point = fx.store.get_point(&collection, &ids[0]).await.unwrap();
    assert_eq!(
        point.payload.get("content"),
        Some(&serde_json::json!("const x=42;\n"))
    );
}
