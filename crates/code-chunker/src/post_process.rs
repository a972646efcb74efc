use crate::language::Language;
use crate::types::{ChunkType, CodeChunk};
use semsync_protocol::ChunkingConfig;

/// Post-process a strategy's output: merge-or-drop undersized chunks, split
/// oversized ones at semantic boundaries, then drop near-duplicates.
pub(crate) fn post_process(
    chunks: Vec<CodeChunk>,
    config: &ChunkingConfig,
    language: Language,
) -> Vec<CodeChunk> {
    let chunks = merge_small(chunks, config);
    let chunks = rebalance_large(chunks, config);
    let mut chunks = dedupe_similar(chunks, config, language);
    chunks.sort_by_key(|c| (c.start_line, c.end_line));
    chunks
}

/// Chunks below the minimum size are merged into the previous chunk, else
/// into the next; a chunk left with no neighbor is dropped with a warning.
fn merge_small(chunks: Vec<CodeChunk>, config: &ChunkingConfig) -> Vec<CodeChunk> {
    if chunks.len() <= 1 {
        // A lone undersized chunk has no merge target; keep it rather than
        // erase the file's only representation.
        return chunks;
    }

    let mut out: Vec<CodeChunk> = Vec::with_capacity(chunks.len());
    let mut pending_forward: Option<CodeChunk> = None;

    for mut chunk in chunks {
        if let Some(small) = pending_forward.take() {
            // Could not attach backward: fold into this chunk's front.
            merge_into_front(&mut chunk, small);
        }

        if chunk.content.len() >= config.min_chunk_size
            || chunk.chunk_type == ChunkType::Overlap
        {
            out.push(chunk);
            continue;
        }

        match out.last_mut() {
            Some(prev) if prev.chunk_type != ChunkType::Overlap => {
                merge_into_back(prev, chunk);
            }
            _ => pending_forward = Some(chunk),
        }
    }

    if let Some(small) = pending_forward {
        log::warn!(
            "dropping isolated undersized chunk {}:{}-{} ({} bytes)",
            small.rel_path,
            small.start_line,
            small.end_line,
            small.content.len()
        );
    }

    out
}

fn merge_into_back(target: &mut CodeChunk, small: CodeChunk) {
    target.content.push('\n');
    target.content.push_str(&small.content);
    target.end_line = target.end_line.max(small.end_line);
    target.chunk_type = ChunkType::Merged;
    target.refresh_id();
}

fn merge_into_front(target: &mut CodeChunk, small: CodeChunk) {
    let mut content = small.content;
    content.push('\n');
    content.push_str(&target.content);
    target.content = content;
    target.start_line = target.start_line.min(small.start_line);
    target.chunk_type = ChunkType::Merged;
    target.refresh_id();
}

/// Chunks above the maximum size are split at the nearest semantic boundary:
/// a blank line, or failing that a block-closing line, or the size limit.
fn rebalance_large(chunks: Vec<CodeChunk>, config: &ChunkingConfig) -> Vec<CodeChunk> {
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.content.len() <= config.max_chunk_size {
            out.push(chunk);
            continue;
        }
        split_chunk(chunk, config, &mut out);
    }
    out
}

fn split_chunk(chunk: CodeChunk, config: &ChunkingConfig, out: &mut Vec<CodeChunk>) {
    let lines: Vec<&str> = chunk.content.lines().collect();
    if lines.len() <= 1 {
        // A single monster line cannot be split on a boundary.
        out.push(chunk);
        return;
    }

    let mut part_start = 0usize;
    let mut size = 0usize;
    let mut last_boundary: Option<usize> = None;

    let mut parts: Vec<(usize, usize)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        size += line.len() + 1;
        if line.trim().is_empty() || is_block_end(line) {
            last_boundary = Some(idx);
        }
        if size > config.max_chunk_size && idx > part_start {
            let split_at = last_boundary
                .filter(|b| *b >= part_start)
                .unwrap_or(idx.saturating_sub(1));
            parts.push((part_start, split_at));
            part_start = split_at + 1;
            size = lines[part_start..=idx]
                .iter()
                .map(|l| l.len() + 1)
                .sum();
            last_boundary = None;
        }
    }
    if part_start < lines.len() {
        parts.push((part_start, lines.len() - 1));
    }

    for (start, end) in parts {
        if start > end {
            continue;
        }
        let text = lines[start..=end].join("\n");
        if text.trim().is_empty() {
            continue;
        }
        let mut part = CodeChunk::new(
            &chunk.rel_path,
            chunk.start_line + start,
            chunk.start_line + end,
            text.as_str(),
            chunk.language.clone(),
            chunk.chunk_type,
        );
        part.function_name = chunk.function_name.clone();
        part.class_name = chunk.class_name.clone();
        part.complexity = chunk.complexity;
        out.push(part);
    }
}

fn is_block_end(line: &str) -> bool {
    let trimmed = line.trim();
    matches!(trimmed, "}" | "};" | "end" | ")" | ");")
}

/// Pairs of chunks whose normalized contents are Levenshtein-similar beyond
/// the threshold are merged when their spans touch, otherwise the later one
/// is dropped.
fn dedupe_similar(
    chunks: Vec<CodeChunk>,
    config: &ChunkingConfig,
    language: Language,
) -> Vec<CodeChunk> {
    if chunks.len() <= 1 || config.similarity_threshold >= 1.0 {
        return chunks;
    }

    let normalized: Vec<String> = chunks
        .iter()
        .map(|c| normalize_content(&c.content, language))
        .collect();

    let mut keep: Vec<Option<CodeChunk>> = chunks.into_iter().map(Some).collect();
    for i in 0..keep.len() {
        if keep[i].is_none() {
            continue;
        }
        for j in (i + 1)..keep.len() {
            if keep[j].is_none() {
                continue;
            }
            if !length_comparable(&normalized[i], &normalized[j], config.similarity_threshold) {
                continue;
            }
            let similarity = levenshtein_similarity(&normalized[i], &normalized[j]);
            if similarity < config.similarity_threshold {
                continue;
            }

            let (left, right) = (keep[i].as_ref().unwrap(), keep[j].as_ref().unwrap());
            let touching = right.start_line <= left.end_line + 1;
            if touching {
                let absorbed = keep[j].take().unwrap();
                let target = keep[i].as_mut().unwrap();
                target.end_line = target.end_line.max(absorbed.end_line);
                if absorbed.content.len() > target.content.len() {
                    target.content = absorbed.content;
                }
                target.chunk_type = ChunkType::Merged;
                target.refresh_id();
            } else {
                log::debug!(
                    "dropping near-duplicate chunk at lines {}-{} (similar to {}-{})",
                    right.start_line,
                    right.end_line,
                    left.start_line,
                    left.end_line
                );
                keep[j] = None;
            }
        }
    }

    keep.into_iter().flatten().collect()
}

/// Quick reject: two strings can only reach the similarity threshold when
/// their lengths are comparable.
fn length_comparable(a: &str, b: &str, threshold: f64) -> bool {
    let (short, long) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };
    if long == 0 {
        return true;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = short as f64 / long as f64;
    ratio >= threshold
}

/// Strip comments and collapse whitespace so formatting noise does not mask
/// duplicated logic.
fn normalize_content(content: &str, language: Language) -> String {
    let prefixes = language.line_comment_prefixes();
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let mut line = line;
        for prefix in prefixes {
            if let Some(pos) = line.find(prefix) {
                line = &line[..pos];
            }
        }
        for token in line.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(token);
        }
    }
    out
}

/// Levenshtein similarity in `0.0..=1.0`, computed over chars with the input
/// capped to keep the quadratic cost bounded.
fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    const CAP: usize = 1_000;
    let a: Vec<char> = a.chars().take(CAP).collect();
    let b: Vec<char> = b.chars().take(CAP).collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.len().max(b.len());
    let distance = levenshtein(&a, &b);
    #[allow(clippy::cast_precision_loss)]
    let similarity = 1.0 - distance as f64 / max_len as f64;
    similarity
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(prev[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkType, CodeChunk};
    use semsync_protocol::ChunkingConfig;

    fn chunk(start: usize, end: usize, content: &str) -> CodeChunk {
        CodeChunk::new("src/lib.rs", start, end, content, None, ChunkType::CodeBlock)
    }

    #[test]
    fn small_chunk_merges_into_previous() {
        let config = ChunkingConfig {
            min_chunk_size: 20,
            ..Default::default()
        };
        let chunks = vec![
            chunk(1, 5, "fn alpha() { do_something_substantial(); }"),
            chunk(6, 6, "x();"),
        ];
        let out = post_process(chunks, &config, Language::Rust);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk_type, ChunkType::Merged);
        assert!(out[0].content.contains("x();"));
        assert_eq!(out[0].end_line, 6);
    }

    #[test]
    fn leading_small_chunk_merges_forward() {
        let config = ChunkingConfig {
            min_chunk_size: 20,
            similarity_threshold: 1.0,
            ..Default::default()
        };
        let chunks = vec![
            chunk(1, 1, "use x;"),
            chunk(2, 6, "fn beta() { do_something_substantial(); }"),
        ];
        let out = post_process(chunks, &config, Language::Rust);
        assert_eq!(out.len(), 1);
        assert!(out[0].content.starts_with("use x;"));
        assert_eq!(out[0].start_line, 1);
    }

    #[test]
    fn lone_small_chunk_survives() {
        let config = ChunkingConfig {
            min_chunk_size: 100,
            ..Default::default()
        };
        let out = post_process(vec![chunk(1, 1, "tiny")], &config, Language::Rust);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn oversize_chunk_splits_at_blank_line() {
        let config = ChunkingConfig {
            min_chunk_size: 10,
            max_chunk_size: 120,
            similarity_threshold: 1.0,
            ..Default::default()
        };
        let mut content = String::new();
        for i in 0..6 {
            content.push_str(&format!("fn f_{i}() {{ body_{i}(); body_{i}(); }}\n\n"));
        }
        let big = chunk(1, 12, content.trim_end());
        let out = post_process(vec![big], &config, Language::Rust);

        assert!(out.len() > 1);
        for part in &out {
            assert!(
                part.content.len() <= 2 * config.max_chunk_size,
                "part too large: {}",
                part.content.len()
            );
            assert!(part.start_line <= part.end_line);
        }
        // Line ranges remain disjoint and ordered.
        for pair in out.windows(2) {
            assert!(pair[0].end_line < pair[1].start_line);
        }
    }

    #[test]
    fn near_duplicates_are_dropped() {
        let config = ChunkingConfig {
            min_chunk_size: 5,
            similarity_threshold: 0.8,
            ..Default::default()
        };
        let a = chunk(1, 3, "fn compute(x: u32) -> u32 { x + 1 }");
        let b = chunk(40, 42, "fn compute(x: u32) -> u32 { x + 2 }");
        let out = post_process(vec![a, b], &config, Language::Rust);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_line, 1);
    }

    #[test]
    fn adjacent_duplicates_merge_instead() {
        let config = ChunkingConfig {
            min_chunk_size: 5,
            similarity_threshold: 0.8,
            ..Default::default()
        };
        let a = chunk(1, 3, "fn compute(x: u32) -> u32 { x + 1 }");
        let b = chunk(4, 6, "fn compute(x: u32) -> u32 { x + 2 }");
        let out = post_process(vec![a, b], &config, Language::Rust);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk_type, ChunkType::Merged);
        assert_eq!(out[0].end_line, 6);
    }

    #[test]
    fn comment_noise_does_not_mask_duplicates() {
        let left = normalize_content("x + 1 // increment\n", Language::Rust);
        let right = normalize_content("x   +   1\n", Language::Rust);
        assert_eq!(left, right);
    }

    #[test]
    fn levenshtein_similarity_bounds() {
        assert_eq!(levenshtein_similarity("abc", "abc"), 1.0);
        assert_eq!(levenshtein_similarity("", ""), 1.0);
        assert!(levenshtein_similarity("abc", "xyz") < 0.5);
    }

    #[test]
    fn dissimilar_chunks_are_kept() {
        let config = ChunkingConfig {
            min_chunk_size: 5,
            similarity_threshold: 0.8,
            ..Default::default()
        };
        let a = chunk(1, 3, "fn alpha() { parse_headers(); }");
        let b = chunk(10, 12, "fn omega() { write_trailers_and_flush(); }");
        let out = post_process(vec![a, b], &config, Language::Rust);
        assert_eq!(out.len(), 2);
    }
}
