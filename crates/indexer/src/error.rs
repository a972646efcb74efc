use crate::recovery::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunker error: {0}")]
    Chunker(#[from] semsync_code_chunker::ChunkerError),

    #[error("catalog error: {0}")]
    Catalog(#[from] semsync_catalog::CatalogError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] semsync_vector_store::VectorStoreError),

    #[error("embedder error: {0}")]
    Embedder(#[from] semsync_vector_store::EmbedderError),

    #[error("project {0} is already indexing")]
    AlreadyIndexing(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("file too large: {rel_path} is {size} bytes (limit {limit}); skipped")]
    FileTooLarge {
        rel_path: String,
        size: u64,
        limit: u64,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("file watch failed: {0}")]
    WatchFailed(String),

    #[error("change detection failed: {0}")]
    ChangeDetectionFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Classify this error for the recovery registry.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexerError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            IndexerError::Io(_) => ErrorKind::TransientIo,
            IndexerError::Chunker(semsync_code_chunker::ChunkerError::ParseError(_)) => {
                ErrorKind::ParseFailure
            }
            IndexerError::Chunker(_) => ErrorKind::ProgrammerError,
            IndexerError::Catalog(_) => ErrorKind::IndexUpdateFailed,
            IndexerError::VectorStore(_) => ErrorKind::VectorStoreFailure,
            IndexerError::Embedder(semsync_vector_store::EmbedderError::Unavailable(_)) => {
                ErrorKind::EmbedderUnavailable
            }
            IndexerError::Embedder(_) => ErrorKind::TransientIo,
            IndexerError::AlreadyIndexing(_) | IndexerError::InvalidConfig(_) => {
                ErrorKind::ProgrammerError
            }
            IndexerError::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            IndexerError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            IndexerError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            IndexerError::WatchFailed(_) => ErrorKind::FileWatchFailed,
            IndexerError::ChangeDetectionFailed(_) => ErrorKind::ChangeDetectionFailed,
            IndexerError::Other(_) => ErrorKind::TransientIo,
        }
    }

    /// A user-facing hint for fatal surfaces, when a recovery path is known.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::VectorStoreFailure | ErrorKind::IndexUpdateFailed => {
                Some("run `reindex` to recover from a partial index")
            }
            ErrorKind::EmbedderUnavailable => {
                Some("check that the embedding provider is reachable")
            }
            _ => None,
        }
    }
}
