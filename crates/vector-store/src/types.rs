use crate::error::{EmbedderResult, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One embedded chunk as stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// Similarity metric for a collection. The engine always creates cosine
/// collections; the other variants exist for completeness of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    Dot,
}

impl DistanceMetric {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Dot => "dot",
        }
    }
}

/// Identity and capability report from an embedding provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub dimensions: usize,
    pub available: bool,
}

/// One text to embed, with payload metadata carried alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingInput {
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EmbeddingInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Map::new(),
        }
    }
}

/// One embedding result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingOutput {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    #[serde(default)]
    pub processing_time_ms: u64,
}

/// Wire shape tolerance: providers answer a single-input request with either
/// a bare result object or a one-element list. Deserialize either and
/// normalize with [`EmbedResponse::into_vec`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbedResponse {
    Many(Vec<EmbeddingOutput>),
    One(EmbeddingOutput),
}

impl EmbedResponse {
    #[must_use]
    pub fn into_vec(self) -> Vec<EmbeddingOutput> {
        match self {
            EmbedResponse::Many(outputs) => outputs,
            EmbedResponse::One(output) => vec![output],
        }
    }
}

/// Fallback embedding dimension per provider name, used when the provider
/// cannot be queried at collection-creation time.
#[must_use]
pub fn default_dimensions(provider: &str) -> usize {
    let provider = provider.to_lowercase();
    if provider.starts_with("custom") {
        return 768;
    }
    match provider.as_str() {
        "openai" => 1536,
        "ollama" => 768,
        "gemini" => 768,
        "mistral" => 1024,
        "siliconflow" => 1024,
        _ => 1024,
    }
}

/// The vector database the engine writes to. Upserts are idempotent: a
/// point with an existing id overwrites it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<()>;

    /// Dropping a collection that does not exist is not an error.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<()>;

    async fn delete_points(&self, name: &str, ids: &[String]) -> Result<()>;

    /// Ids of points whose payload field equals the given value.
    async fn find_point_ids_by_payload(
        &self,
        name: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>>;
}

/// The embedding provider the engine calls out to.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn provider_info(&self) -> EmbedderResult<ProviderInfo>;

    /// Embed a batch of texts; implementations must return one output per
    /// input, in order.
    async fn embed(&self, inputs: Vec<EmbeddingInput>) -> EmbedderResult<Vec<EmbeddingOutput>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_dimension_table() {
        assert_eq!(default_dimensions("openai"), 1536);
        assert_eq!(default_dimensions("OLLAMA"), 768);
        assert_eq!(default_dimensions("gemini"), 768);
        assert_eq!(default_dimensions("mistral"), 1024);
        assert_eq!(default_dimensions("siliconflow"), 1024);
        assert_eq!(default_dimensions("custom-local"), 768);
        assert_eq!(default_dimensions("somebody-else"), 1024);
    }

    #[test]
    fn embed_response_accepts_both_shapes() {
        let single = r#"{"vector": [0.1, 0.2], "model": "m", "dimensions": 2}"#;
        let parsed: EmbedResponse = serde_json::from_str(single).unwrap();
        assert_eq!(parsed.into_vec().len(), 1);

        let list = r#"[{"vector": [0.1], "model": "m", "dimensions": 1},
                       {"vector": [0.2], "model": "m", "dimensions": 1}]"#;
        let parsed: EmbedResponse = serde_json::from_str(list).unwrap();
        assert_eq!(parsed.into_vec().len(), 2);
    }

    #[test]
    fn metric_names() {
        assert_eq!(DistanceMetric::Cosine.as_str(), "cosine");
        assert_eq!(DistanceMetric::default(), DistanceMetric::Cosine);
    }
}
