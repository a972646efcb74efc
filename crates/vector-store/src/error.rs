use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;
pub type EmbedderResult<T> = std::result::Result<T, EmbedderError>;

/// Failures reported by a vector-store backend.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store backend error: {0}")]
    Backend(String),
}

/// Failures reported by an embedding provider.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned {actual} results for {expected} inputs")]
    ResultCountMismatch { expected: usize, actual: usize },
}
