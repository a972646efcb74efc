use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous span of a source file, the unit of embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    /// Stable identifier derived from path, span and a content-hash prefix.
    pub id: String,

    /// The chunk's source text.
    pub content: String,

    /// Project-relative path of the originating file.
    pub rel_path: String,

    /// Start line (1-indexed).
    pub start_line: usize,

    /// End line (1-indexed, inclusive).
    pub end_line: usize,

    /// Language of the originating file, if known.
    pub language: Option<String>,

    /// Semantic kind of this chunk.
    pub chunk_type: ChunkType,

    /// Function name for function/method chunks.
    pub function_name: Option<String>,

    /// Enclosing or defined class name, when applicable.
    pub class_name: Option<String>,

    /// Weighted control-flow complexity of the chunk content.
    pub complexity: Option<u32>,
}

impl CodeChunk {
    /// Create a chunk, deriving its stable id.
    pub fn new(
        rel_path: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: impl Into<String>,
        language: Option<String>,
        chunk_type: ChunkType,
    ) -> Self {
        let rel_path = rel_path.into();
        let content = content.into();
        let id = chunk_id(&rel_path, start_line, end_line, &content);
        Self {
            id,
            content,
            rel_path,
            start_line,
            end_line,
            language,
            chunk_type,
            function_name: None,
            class_name: None,
            complexity: None,
        }
    }

    /// Number of lines covered by this chunk.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Whether this chunk covers the given (1-indexed) line.
    #[must_use]
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Recompute the id after content or span edits (post-processing).
    pub fn refresh_id(&mut self) {
        self.id = chunk_id(&self.rel_path, self.start_line, self.end_line, &self.content);
    }
}

/// Stable chunk id: path, span, and a prefix of the content hash, hashed
/// together and truncated to 16 hex chars.
fn chunk_id(rel_path: &str, start_line: usize, end_line: usize, content: &str) -> String {
    let content_digest = Sha256::digest(content.as_bytes());
    let content_prefix = hex_prefix(&content_digest, 16);

    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    hasher.update(format!(":{start_line}-{end_line}:"));
    hasher.update(content_prefix.as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// Semantic kind of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Method,
    Interface,
    Import,
    CodeBlock,
    Heading,
    Paragraph,
    Line,
    Overlap,
    Merged,
    Generic,
}

impl ChunkType {
    /// Human-readable name, also used in vector payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Class => "class",
            ChunkType::Method => "method",
            ChunkType::Interface => "interface",
            ChunkType::Import => "import",
            ChunkType::CodeBlock => "code_block",
            ChunkType::Heading => "heading",
            ChunkType::Paragraph => "paragraph",
            ChunkType::Line => "line",
            ChunkType::Overlap => "overlap",
            ChunkType::Merged => "merged",
            ChunkType::Generic => "generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable() {
        let a = CodeChunk::new("src/lib.rs", 1, 10, "fn a() {}", None, ChunkType::Function);
        let b = CodeChunk::new("src/lib.rs", 1, 10, "fn a() {}", None, ChunkType::Function);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn chunk_id_depends_on_span_and_content() {
        let base = CodeChunk::new("src/lib.rs", 1, 10, "fn a() {}", None, ChunkType::Function);
        let moved = CodeChunk::new("src/lib.rs", 2, 11, "fn a() {}", None, ChunkType::Function);
        let edited = CodeChunk::new("src/lib.rs", 1, 10, "fn b() {}", None, ChunkType::Function);
        assert_ne!(base.id, moved.id);
        assert_ne!(base.id, edited.id);
    }

    #[test]
    fn line_count_is_inclusive() {
        let chunk = CodeChunk::new("a.rs", 10, 15, "x", None, ChunkType::Line);
        assert_eq!(chunk.line_count(), 6);
        assert!(chunk.contains_line(10));
        assert!(chunk.contains_line(15));
        assert!(!chunk.contains_line(16));
    }

    #[test]
    fn refresh_id_tracks_edits() {
        let mut chunk = CodeChunk::new("a.rs", 1, 1, "x", None, ChunkType::Line);
        let before = chunk.id.clone();
        chunk.content.push_str("y");
        chunk.refresh_id();
        assert_ne!(before, chunk.id);
    }
}
