//! # Semsync Code Chunker
//!
//! Splits file contents into semantically meaningful chunks for embedding.
//!
//! ## Pipeline
//!
//! ```text
//! Source + language
//!     │
//!     ├──> Small-file shortcut (single whole-file chunk)
//!     │
//!     ├──> Strategy selection (first that applies wins)
//!     │    ├─> Markdown   (headings / paragraphs / code fences)
//!     │    ├─> AST        (tree-sitter functions & classes)
//!     │    ├─> Semantic   (declaration boundaries, complex files)
//!     │    ├─> Bracket    (balanced-brace blocks)
//!     │    └─> Line       (fixed windows, terminal fallback)
//!     │
//!     └──> Post-processing
//!          ├─> merge-or-drop undersized chunks
//!          ├─> split oversized chunks at blank-line boundaries
//!          └─> drop near-duplicates
//! ```
//!
//! ## Example
//!
//! ```rust
//! use semsync_code_chunker::Chunker;
//! use semsync_protocol::ChunkingConfig;
//!
//! let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
//! let chunks = chunker.chunk("fn main() {}\n", "rust", "src/main.rs").unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

mod ast_analyzer;
mod chunker;
mod complexity;
mod error;
mod language;
mod post_process;
mod strategy;
mod types;

pub use chunker::Chunker;
pub use complexity::complexity_score;
pub use error::{ChunkerError, Result};
pub use language::Language;
pub use strategy::ChunkStrategy;
pub use types::{ChunkType, CodeChunk};

// Re-export the config so downstream crates have a single import point.
pub use semsync_protocol::ChunkingConfig;
