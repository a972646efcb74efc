use crate::ast_analyzer::AstAnalyzer;
use crate::complexity::complexity_score;
use crate::language::Language;
use crate::types::{ChunkType, CodeChunk};
use once_cell::sync::Lazy;
use regex::Regex;
use semsync_protocol::ChunkingConfig;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Chunking strategy, in canonical priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Markdown,
    Ast,
    Semantic,
    Bracket,
    Line,
}

impl ChunkStrategy {
    pub const PRIORITY: [ChunkStrategy; 5] = [
        ChunkStrategy::Markdown,
        ChunkStrategy::Ast,
        ChunkStrategy::Semantic,
        ChunkStrategy::Bracket,
        ChunkStrategy::Line,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChunkStrategy::Markdown => "markdown",
            ChunkStrategy::Ast => "ast",
            ChunkStrategy::Semantic => "semantic",
            ChunkStrategy::Bracket => "bracket",
            ChunkStrategy::Line => "line",
        }
    }
}

/// Runs the strategy table: first applicable strategy that produces chunks
/// wins; the line strategy is the terminal fallback and never opts out.
pub(crate) struct StrategySelector<'a> {
    config: &'a ChunkingConfig,
}

impl<'a> StrategySelector<'a> {
    pub(crate) fn new(config: &'a ChunkingConfig) -> Self {
        Self { config }
    }

    pub(crate) fn execute(
        &self,
        content: &str,
        language: Language,
        rel_path: &str,
    ) -> (ChunkStrategy, Vec<CodeChunk>) {
        for strategy in ChunkStrategy::PRIORITY {
            if !self.applies(strategy, language, content) {
                continue;
            }
            let chunks = self.run(strategy, content, language, rel_path);
            if !chunks.is_empty() {
                return (strategy, chunks);
            }
        }
        // Unreachable for non-empty content, but keep a safe terminal.
        (
            ChunkStrategy::Line,
            self.line_chunks(content, language, rel_path),
        )
    }

    fn applies(&self, strategy: ChunkStrategy, language: Language, content: &str) -> bool {
        match strategy {
            ChunkStrategy::Markdown => language == Language::Markdown,
            ChunkStrategy::Ast => language.supports_ast(),
            ChunkStrategy::Semantic => {
                complexity_score(content) > self.config.complexity_threshold
            }
            ChunkStrategy::Bracket => language.uses_braces(),
            ChunkStrategy::Line => true,
        }
    }

    fn run(
        &self,
        strategy: ChunkStrategy,
        content: &str,
        language: Language,
        rel_path: &str,
    ) -> Vec<CodeChunk> {
        match strategy {
            ChunkStrategy::Markdown => self.markdown_chunks(content, rel_path),
            ChunkStrategy::Ast => match AstAnalyzer::new(language) {
                Ok(mut analyzer) => match analyzer.chunk(content, rel_path, self.config) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        log::debug!("ast strategy opted out for {rel_path}: {e}");
                        Vec::new()
                    }
                },
                Err(e) => {
                    log::debug!("ast analyzer unavailable for {rel_path}: {e}");
                    Vec::new()
                }
            },
            ChunkStrategy::Semantic => self.semantic_chunks(content, language, rel_path),
            ChunkStrategy::Bracket => self.bracket_chunks(content, language, rel_path),
            ChunkStrategy::Line => self.line_chunks(content, language, rel_path),
        }
    }

    /// Markdown: fenced code blocks, heading-led sections, paragraph runs.
    fn markdown_chunks(&self, content: &str, rel_path: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        let mut chunks = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if line.trim_start().starts_with("```") || line.trim_start().starts_with("~~~") {
                let fence = &line.trim_start()[..3];
                let start = i;
                i += 1;
                while i < lines.len() && !lines[i].trim_start().starts_with(fence) {
                    i += 1;
                }
                let end = i.min(lines.len().saturating_sub(1));
                i = (i + 1).min(lines.len());
                push_lines_chunk(
                    &mut chunks,
                    &lines,
                    start,
                    end,
                    rel_path,
                    Language::Markdown,
                    ChunkType::CodeBlock,
                );
                continue;
            }

            if is_heading(line) {
                let start = i;
                let mut size = line.len();
                i += 1;
                while i < lines.len()
                    && !is_heading(lines[i])
                    && !lines[i].trim_start().starts_with("```")
                    && size + lines[i].len() < self.config.max_chunk_size
                {
                    size += lines[i].len() + 1;
                    i += 1;
                }
                push_lines_chunk(
                    &mut chunks,
                    &lines,
                    start,
                    i - 1,
                    rel_path,
                    Language::Markdown,
                    ChunkType::Heading,
                );
                continue;
            }

            if line.trim().is_empty() {
                i += 1;
                continue;
            }

            // Paragraph run: accumulate until a structural marker or the
            // size bound.
            let start = i;
            let mut size = 0;
            while i < lines.len()
                && !is_heading(lines[i])
                && !lines[i].trim_start().starts_with("```")
                && size + lines[i].len() < self.config.max_chunk_size
            {
                size += lines[i].len() + 1;
                i += 1;
            }
            if i == start {
                i += 1;
            }
            push_lines_chunk(
                &mut chunks,
                &lines,
                start,
                i - 1,
                rel_path,
                Language::Markdown,
                ChunkType::Paragraph,
            );
        }

        chunks
    }

    /// Semantic: split a complex file at top-level declaration boundaries
    /// and blank lines, respecting the size bounds.
    fn semantic_chunks(
        &self,
        content: &str,
        language: Language,
        rel_path: &str,
    ) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut size = 0usize;
        let hard_cap = self.config.max_chunk_size + self.config.max_chunk_size / 2;

        for (idx, line) in lines.iter().enumerate() {
            let at_boundary = idx > start
                && ((is_declaration_line(line) && size >= self.config.min_chunk_size)
                    || (line.trim().is_empty() && size >= self.config.max_chunk_size)
                    || size + line.len() > hard_cap);
            if at_boundary {
                push_lines_chunk(
                    &mut chunks,
                    &lines,
                    start,
                    idx - 1,
                    rel_path,
                    language,
                    ChunkType::CodeBlock,
                );
                start = idx;
                size = 0;
            }
            size += line.len() + 1;
        }
        if start < lines.len() {
            push_lines_chunk(
                &mut chunks,
                &lines,
                start,
                lines.len() - 1,
                rel_path,
                language,
                ChunkType::CodeBlock,
            );
        }

        chunks
    }

    /// Bracket-balanced: close a chunk when brace depth returns to zero and
    /// the size is within bounds, or at the hard overflow limit.
    fn bracket_chunks(&self, content: &str, language: Language, rel_path: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        let hard_cap = self.config.max_chunk_size + self.config.max_chunk_size / 2;
        let mut chunks = Vec::new();
        let mut tracker = DepthTracker::new(language);
        let mut start = 0usize;
        let mut size = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            tracker.feed_line(line);
            size += line.len() + 1;

            let balanced = tracker.depth == 0;
            let in_bounds =
                size >= self.config.min_chunk_size && size <= self.config.max_chunk_size;
            if (balanced && in_bounds) || size >= hard_cap {
                push_lines_chunk(
                    &mut chunks,
                    &lines,
                    start,
                    idx,
                    rel_path,
                    language,
                    ChunkType::CodeBlock,
                );
                start = idx + 1;
                size = 0;
            }
        }
        if start < lines.len() {
            push_lines_chunk(
                &mut chunks,
                &lines,
                start,
                lines.len() - 1,
                rel_path,
                language,
                ChunkType::CodeBlock,
            );
        }

        chunks
    }

    /// Line windows: disjoint fixed-size chunks plus deduplicated overlap
    /// chunks bridging consecutive windows, bounded by the overlap ratio.
    fn line_chunks(&self, content: &str, language: Language, rel_path: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let window = self.config.max_lines_per_chunk.max(1);
        let overlap = self.config.overlap_size;
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let overlap_budget =
            (self.config.max_overlap_ratio * lines.len() as f64).floor() as usize;

        let mut chunks = Vec::new();
        let mut seen_hashes: HashSet<[u8; 32]> = HashSet::new();
        let mut used_overlap = 0usize;
        let mut start = 0usize;

        while start < lines.len() {
            let end = (start + window).min(lines.len());
            let text = lines[start..end].join("\n");
            let digest: [u8; 32] = Sha256::digest(text.as_bytes()).into();
            if seen_hashes.insert(digest) {
                push_lines_chunk(
                    &mut chunks,
                    &lines,
                    start,
                    end - 1,
                    rel_path,
                    language,
                    ChunkType::Line,
                );
            }

            // Overlap chunk bridging this window and the next.
            if overlap > 0 && end < lines.len() {
                let ov_start = end.saturating_sub(overlap);
                let ov_end = (end + overlap).min(lines.len());
                let cost = ov_end - ov_start;
                if used_overlap + cost <= overlap_budget {
                    let text = lines[ov_start..ov_end].join("\n");
                    let digest: [u8; 32] = Sha256::digest(text.as_bytes()).into();
                    if seen_hashes.insert(digest) {
                        used_overlap += cost;
                        push_lines_chunk(
                            &mut chunks,
                            &lines,
                            ov_start,
                            ov_end - 1,
                            rel_path,
                            language,
                            ChunkType::Overlap,
                        );
                    }
                }
            }

            start = end;
        }

        chunks.sort_by_key(|c| (c.start_line, c.end_line));
        chunks
    }
}

/// Append a chunk covering `lines[start..=end]` (0-indexed input).
fn push_lines_chunk(
    out: &mut Vec<CodeChunk>,
    lines: &[&str],
    start: usize,
    end: usize,
    rel_path: &str,
    language: Language,
    chunk_type: ChunkType,
) {
    if start > end || start >= lines.len() {
        return;
    }
    let end = end.min(lines.len() - 1);
    let text = lines[start..=end].join("\n");
    if text.trim().is_empty() {
        return;
    }
    let language_name = (language != Language::Unknown).then(|| language.as_str().to_string());
    let mut chunk = CodeChunk::new(
        rel_path,
        start + 1,
        end + 1,
        text.as_str(),
        language_name,
        chunk_type,
    );
    chunk.complexity = Some(complexity_score(&text));
    out.push(chunk);
}

fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#')
        && trimmed
            .trim_start_matches('#')
            .starts_with(|c: char| c == ' ' || c == '\t')
}

static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(pub\s+|export\s+|public\s+|private\s+|protected\s+|static\s+|async\s+)*(fn|struct|enum|trait|impl|mod|class|def|function|interface|type)\b",
    )
    .expect("declaration regex is valid")
});

fn is_declaration_line(line: &str) -> bool {
    // Top-level declarations only: indented lines are member definitions.
    !line.starts_with(char::is_whitespace) && DECLARATION_RE.is_match(line)
}

/// Brace-depth tracker that ignores braces inside string literals and
/// comments.
struct DepthTracker {
    depth: i64,
    in_block_comment: bool,
    line_comment: &'static [&'static str],
}

impl DepthTracker {
    fn new(language: Language) -> Self {
        Self {
            depth: 0,
            in_block_comment: false,
            line_comment: language.line_comment_prefixes(),
        }
    }

    fn feed_line(&mut self, line: &str) {
        let bytes: Vec<char> = line.chars().collect();
        let mut i = 0;
        let mut in_string: Option<char> = None;

        while i < bytes.len() {
            let c = bytes[i];

            if self.in_block_comment {
                if c == '*' && bytes.get(i + 1) == Some(&'/') {
                    self.in_block_comment = false;
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }

            if let Some(quote) = in_string {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == quote {
                    in_string = None;
                }
                i += 1;
                continue;
            }

            if c == '/' && bytes.get(i + 1) == Some(&'*') {
                self.in_block_comment = true;
                i += 2;
                continue;
            }
            let at_line_comment = self.line_comment.iter().any(|prefix| {
                prefix
                    .chars()
                    .enumerate()
                    .all(|(k, pc)| bytes.get(i + k) == Some(&pc))
            });
            if at_line_comment {
                break;
            }

            match c {
                '"' | '`' => in_string = Some(c),
                // Single quotes open a string only for a well-formed char
                // literal; a lone apostrophe (Rust lifetime, contraction in a
                // comment) must not swallow the rest of the line.
                '\'' => {
                    if bytes.get(i + 1) == Some(&'\\') && bytes.get(i + 3) == Some(&'\'') {
                        i += 3;
                    } else if bytes.get(i + 2) == Some(&'\'') {
                        i += 2;
                    }
                }
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
            i += 1;
        }
        // Strings do not continue across lines for depth purposes.
    }
}
