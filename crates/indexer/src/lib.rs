//! # Semsync Indexer
//!
//! The indexing and synchronization engine: keeps a project's vector
//! collection consistent with its on-disk state.
//!
//! ## Pipeline
//!
//! ```text
//! Full index:
//!   Coordinator ──> Traversal (path filter, hashes)
//!               ──> Chunker ──> Embedder ──> Vector Store
//!               ──> Hash Catalog ──> Event Bus (progress / completed)
//!
//! Live change:
//!   Watcher (rename window) ──> Change Detector (debounce, live mirror)
//!   ──> Coordinator ──> same tail, single file
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use semsync_catalog::{HashCatalog, ProjectIds};
//! use semsync_indexer::ProjectCoordinator;
//! use semsync_protocol::IndexingConfig;
//! use semsync_vector_store::{HashEmbedder, InMemoryVectorStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = ProjectCoordinator::new(
//!         IndexingConfig::default(),
//!         Arc::new(HashCatalog::open_in_memory()?),
//!         Arc::new(ProjectIds::open("/tmp/projects.json")?),
//!         Arc::new(InMemoryVectorStore::new()),
//!         Arc::new(HashEmbedder::new(384)),
//!     )?;
//!
//!     let id = coordinator.start_indexing("/path/to/project").await?;
//!     println!("indexing started for {id}");
//!     Ok(())
//! }
//! ```

mod change_detector;
mod coordinator;
mod error;
mod events;
mod memory;
mod recovery;
mod runtime;
mod scanner;
mod status;
mod watcher;

pub use change_detector::{ChangeDetector, ChangeKind, FileChangeEvent, RawChange, Snapshot};
pub use coordinator::ProjectCoordinator;
pub use error::{IndexerError, Result};
pub use events::{EventBus, FileMetrics, IndexingEvent};
pub use memory::{MemoryMonitor, MemorySample};
pub use recovery::{ErrorKind, RecoveryPlan, RecoveryRegistry};
pub use runtime::{process_with_concurrency, BatchReport, BatchRunner, RetryRunner};
pub use scanner::{FileRecord, FileScanner, TraversalResult};
pub use status::{ProjectStatus, StatusRegistry};
pub use watcher::{ProjectWatcher, WatchEvent};
