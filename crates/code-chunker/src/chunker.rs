use crate::complexity::complexity_score;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::post_process::post_process;
use crate::strategy::{ChunkStrategy, StrategySelector};
use crate::types::{ChunkType, CodeChunk};
use semsync_protocol::ChunkingConfig;

/// Main chunking interface: strategy selection plus post-processing.
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker, validating the configuration up front.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    /// Chunk file content for the given language name (see the protocol
    /// language table) and project-relative path.
    ///
    /// Empty content yields no chunks. Files at or below the small-file
    /// threshold bypass strategy selection entirely and come back as a
    /// single whole-file chunk.
    pub fn chunk(&self, content: &str, language: &str, rel_path: &str) -> Result<Vec<CodeChunk>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let language = Language::from_name(language);

        if content.len() <= self.config.small_file_threshold {
            return Ok(vec![self.whole_file_chunk(content, language, rel_path)]);
        }

        let selector = StrategySelector::new(&self.config);
        let (strategy, chunks) = selector.execute(content, language, rel_path);
        log::debug!(
            "chunked {rel_path} via {} strategy into {} chunks",
            strategy.as_str(),
            chunks.len()
        );

        let mut chunks = post_process(chunks, &self.config, language);
        if chunks.is_empty() {
            // Post-processing must never erase a non-empty file entirely.
            chunks.push(self.whole_file_chunk(content, language, rel_path));
        }
        debug_assert!(chunks.iter().all(|c| c.start_line <= c.end_line));
        Ok(chunks)
    }

    /// Which strategy selection would pick for this input, without running
    /// the full pipeline. Exposed for diagnostics and tests.
    #[must_use]
    pub fn strategy_for(&self, content: &str, language: &str) -> ChunkStrategy {
        let language = Language::from_name(language);
        let selector = StrategySelector::new(&self.config);
        let (strategy, _) = selector.execute(content, language, "probe");
        strategy
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn whole_file_chunk(&self, content: &str, language: Language, rel_path: &str) -> CodeChunk {
        let total_lines = content.lines().count().max(1);
        let language_name =
            (language != Language::Unknown).then(|| language.as_str().to_string());
        let mut chunk = CodeChunk::new(
            rel_path,
            1,
            total_lines,
            content,
            language_name,
            ChunkType::Generic,
        );
        chunk.complexity = Some(complexity_score(content));
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semsync_protocol::ChunkingConfig;

    #[test]
    fn empty_content_yields_no_chunks() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        assert!(chunker.chunk("", "rust", "a.rs").unwrap().is_empty());
        assert!(chunker.chunk("   \n  ", "rust", "a.rs").unwrap().is_empty());
    }

    #[test]
    fn small_file_bypasses_strategy_selection() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        let content = "const x = 1;\n";
        let chunks = chunker.chunk(content, "javascript", "a.js").unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Generic);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChunkingConfig {
            min_chunk_size: 10_000,
            max_chunk_size: 100,
            ..Default::default()
        };
        assert!(Chunker::new(config).is_err());
    }

    #[test]
    fn large_rust_file_uses_ast_strategy() {
        let config = ChunkingConfig {
            small_file_threshold: 50,
            min_chunk_size: 10,
            ..Default::default()
        };
        let chunker = Chunker::new(config).unwrap();
        let content = "fn first() -> u32 { 10 }\n\nfn second() -> u32 { 20 }\n\nfn third() -> u32 { 30 }\n";
        assert_eq!(
            chunker.strategy_for(content, "rust"),
            ChunkStrategy::Ast
        );

        let chunks = chunker.chunk(content, "rust", "src/nums.rs").unwrap();
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            assert!(pair[0].start_line <= pair[1].start_line);
        }
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let config = ChunkingConfig {
            small_file_threshold: 10,
            min_chunk_size: 5,
            ..Default::default()
        };
        let chunker = Chunker::new(config).unwrap();
        let content = "fn a() { 1 }\n\nfn b() { 2 }\n";
        let first = chunker.chunk(content, "rust", "src/x.rs").unwrap();
        let second = chunker.chunk(content, "rust", "src/x.rs").unwrap();
        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn unknown_language_still_chunks() {
        let config = ChunkingConfig {
            small_file_threshold: 10,
            max_lines_per_chunk: 4,
            min_chunk_size: 4,
            ..Default::default()
        };
        let chunker = Chunker::new(config).unwrap();
        let content = (1..=12)
            .map(|i| format!("entry number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunker.chunk(&content, "plaintext", "notes.txt").unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.language.is_none()));
    }

    #[test]
    fn no_two_non_overlap_chunks_share_a_line() {
        let config = ChunkingConfig {
            small_file_threshold: 10,
            max_lines_per_chunk: 5,
            overlap_size: 2,
            min_chunk_size: 4,
            ..Default::default()
        };
        let chunker = Chunker::new(config).unwrap();
        let content = (1..=40)
            .map(|i| format!("unique line payload {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunker.chunk(&content, "plaintext", "data.txt").unwrap();

        let mut core: Vec<&CodeChunk> = chunks
            .iter()
            .filter(|c| c.chunk_type != ChunkType::Overlap)
            .collect();
        core.sort_by_key(|c| c.start_line);
        for pair in core.windows(2) {
            assert!(
                pair[0].end_line < pair[1].start_line,
                "chunks share lines: {}-{} vs {}-{}",
                pair[0].start_line,
                pair[0].end_line,
                pair[1].start_line,
                pair[1].end_line
            );
        }
    }
}
