//! # Semsync Protocol
//!
//! Shared configuration and filtering primitives for the indexing engine.
//!
//! Everything downstream of the engine's public surface — traversal,
//! watching, chunking, batching — is shaped by the knobs defined here.
//! The crate is deliberately dependency-light so every other member can
//! depend on it without cycles.

mod config;
mod language;
mod path_filter;

pub use config::{
    BatchConfig, ChunkingConfig, IndexingConfig, MemoryConfig, RetryConfig, TraversalConfig,
    WatcherConfig,
};
pub use language::{default_supported_extensions, language_for_extension};
pub use path_filter::PathFilter;
