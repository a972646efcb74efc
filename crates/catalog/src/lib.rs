//! # Semsync Catalog
//!
//! Durable per-project state: the hash catalog (project-relative path →
//! content hash, SQLite-backed with an LRU/TTL cache in front) and the
//! project identity manager (stable ids, collection and space names,
//! atomically persisted JSON mapping).
//!
//! The catalog is what makes change detection cheap across restarts: a file
//! whose stored hash matches its current bytes needs no re-index.

mod cache;
mod error;
mod ids;
mod store;

pub use error::{CatalogError, Result};
pub use ids::{collection_name, space_name, ProjectIds, ProjectMapping};
pub use store::{HashCatalog, HashEntry, HashUpdate, ProjectRow, ProjectStatusKind};

/// Current unix time in seconds; the catalog's single clock.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
