use thiserror::Error;

/// Result type for chunker operations.
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur during code chunking.
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// The AST strategy could not parse the source.
    #[error("parse error: {0}")]
    ParseError(String),

    /// No tree-sitter grammar for the requested language.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Invalid chunking configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tree-sitter rejected the grammar or query.
    #[error("tree-sitter error: {0}")]
    TreeSitter(String),
}

impl ChunkerError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
