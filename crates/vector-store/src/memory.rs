use crate::error::{EmbedderError, EmbedderResult, Result, VectorStoreError};
use crate::types::{
    DistanceMetric, Embedder, EmbeddingInput, EmbeddingOutput, ProviderInfo, VectorPoint,
    VectorStore,
};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Hermetic vector store for tests and local runs: collections are plain
/// maps, payload filtering is linear scan.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

struct Collection {
    dimensions: usize,
    #[allow(dead_code)]
    metric: DistanceMetric,
    points: HashMap<String, VectorPoint>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_collection(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    pub async fn point_count(&self, name: &str) -> usize {
        self.collections
            .read()
            .await
            .get(name)
            .map_or(0, |c| c.points.len())
    }

    pub async fn get_point(&self, name: &str, id: &str) -> Option<VectorPoint> {
        self.collections
            .read()
            .await
            .get(name)
            .and_then(|c| c.points.get(id).cloned())
    }

    pub async fn collection_dimensions(&self, name: &str) -> Option<usize> {
        self.collections.read().await.get(name).map(|c| c.dimensions)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            if existing.dimensions != dimensions {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: existing.dimensions,
                    actual: dimensions,
                });
            }
            return Ok(());
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimensions,
                metric,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        for point in points {
            if point.vector.len() != collection.dimensions {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: collection.dimensions,
                    actual: point.vector.len(),
                });
            }
            collection.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_points(&self, name: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        for id in ids {
            collection.points.remove(id);
        }
        Ok(())
    }

    async fn find_point_ids_by_payload(
        &self,
        name: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        let mut ids: Vec<String> = collection
            .points
            .values()
            .filter(|p| p.payload.get(field) == Some(value))
            .map(|p| p.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Deterministic embedder: the vector is derived from a SHA-256 stream over
/// the input text, so identical text always embeds identically and tests
/// need no model downloads.
pub struct HashEmbedder {
    dimensions: usize,
    available: bool,
    calls: AtomicUsize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            available: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// An embedder whose provider cannot be reached; `provider_info` and
    /// `embed` both fail. Exercises the dimension-fallback path.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            dimensions: 0,
            available: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls served, for assertions on batching.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimensions);
        let mut counter = 0u32;
        while out.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks(2) {
                if out.len() >= self.dimensions {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                out.push(f32::from(raw) / f32::from(u16::MAX) - 0.5);
            }
            counter += 1;
        }
        out
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn provider_info(&self) -> EmbedderResult<ProviderInfo> {
        if !self.available {
            return Err(EmbedderError::Unavailable("stub provider offline".to_string()));
        }
        Ok(ProviderInfo {
            name: "stub".to_string(),
            model: "hash-embedder".to_string(),
            dimensions: self.dimensions,
            available: true,
        })
    }

    async fn embed(&self, inputs: Vec<EmbeddingInput>) -> EmbedderResult<Vec<EmbeddingOutput>> {
        if !self.available {
            return Err(EmbedderError::Unavailable("stub provider offline".to_string()));
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(inputs
            .iter()
            .map(|input| EmbeddingOutput {
                vector: self.vector_for(&input.text),
                model: "hash-embedder".to_string(),
                dimensions: self.dimensions,
                processing_time_ms: 0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, dims: usize, file_path: &str) -> VectorPoint {
        let mut payload = serde_json::Map::new();
        payload.insert("file_path".to_string(), json!(file_path));
        VectorPoint {
            id: id.to_string(),
            vector: vec![0.0; dims],
            payload,
        }
    }

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("c", 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .create_collection("c", 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert!(store.has_collection("c").await);

        let conflict = store.create_collection("c", 8, DistanceMetric::Cosine).await;
        assert!(conflict.is_err());
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("c", 2, DistanceMetric::Cosine)
            .await
            .unwrap();

        store
            .upsert("c", vec![point("p1", 2, "a.rs")])
            .await
            .unwrap();
        store
            .upsert("c", vec![point("p1", 2, "b.rs")])
            .await
            .unwrap();

        assert_eq!(store.point_count("c").await, 1);
        let fetched = store.get_point("c", "p1").await.unwrap();
        assert_eq!(fetched.payload.get("file_path"), Some(&json!("b.rs")));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("c", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        let result = store.upsert("c", vec![point("p1", 3, "a.rs")]).await;
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn payload_filter_finds_matching_points() {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("c", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("p1", 2, "a.rs"),
                    point("p2", 2, "a.rs"),
                    point("p3", 2, "b.rs"),
                ],
            )
            .await
            .unwrap();

        let ids = store
            .find_point_ids_by_payload("c", "file_path", &json!("a.rs"))
            .await
            .unwrap();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);

        store.delete_points("c", &ids).await.unwrap();
        assert_eq!(store.point_count("c").await, 1);
    }

    #[tokio::test]
    async fn deleting_missing_collection_is_fine() {
        let store = InMemoryVectorStore::new();
        assert!(store.delete_collection("ghost").await.is_ok());
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16);
        let a = embedder
            .embed(vec![EmbeddingInput::new("fn main() {}")])
            .await
            .unwrap();
        let b = embedder
            .embed(vec![EmbeddingInput::new("fn main() {}")])
            .await
            .unwrap();
        assert_eq!(a[0].vector, b[0].vector);
        assert_eq!(a[0].vector.len(), 16);

        let c = embedder
            .embed(vec![EmbeddingInput::new("something else")])
            .await
            .unwrap();
        assert_ne!(a[0].vector, c[0].vector);
        assert_eq!(embedder.embed_calls(), 3);
    }

    #[tokio::test]
    async fn unavailable_embedder_fails_both_calls() {
        let embedder = HashEmbedder::unavailable();
        assert!(embedder.provider_info().await.is_err());
        assert!(embedder.embed(vec![]).await.is_err());
    }
}
