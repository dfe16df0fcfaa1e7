//! Greedy token-budget packing and adjacent-chunk merging.
//!
//! [`fit`] walks ranked chunks best first and keeps each one that still
//! fits the remaining budget. A chunk that does not fit is counted as
//! excluded and the scan goes on, so a smaller chunk further down can
//! still be taken. The kept set is then put in reading order (source,
//! file, start line) and [`merge_adjacent`] joins touching or overlapping
//! windows of the same file.

use crate::chunk::{chunk_id, estimate_tokens};
use crate::models::RankedChunk;

#[derive(Debug, Clone)]
pub struct FitResult {
    /// Accepted chunks in reading order, adjacent ones merged.
    pub chunks: Vec<RankedChunk>,
    /// Tokens of `chunks`; never above the budget.
    pub total_tokens: usize,
    /// Input chunks accepted before merging. `accepted + excluded` equals
    /// the input length.
    pub accepted: usize,
    pub excluded: usize,
}

/// Pack `ranked` (best first) into `budget` tokens.
///
/// A zero budget is rejected upstream; here it simply excludes everything.
pub fn fit(ranked: Vec<RankedChunk>, budget: usize) -> FitResult {
    let mut kept = Vec::new();
    let mut used = 0usize;
    let mut excluded = 0usize;

    for chunk in ranked {
        if used + chunk.chunk.tokens <= budget {
            used += chunk.chunk.tokens;
            kept.push(chunk);
        } else {
            excluded += 1;
        }
    }

    let accepted = kept.len();
    sort_reading_order(&mut kept);
    let chunks = merge_adjacent(kept);
    let total_tokens = chunks.iter().map(|c| c.chunk.tokens).sum();

    FitResult {
        chunks,
        total_tokens,
        accepted,
        excluded,
    }
}

fn sort_reading_order(chunks: &mut [RankedChunk]) {
    chunks.sort_by(|a, b| {
        (&a.chunk.source_id, &a.chunk.file_path, a.chunk.start_line, a.chunk.end_line, &a.chunk.id).cmp(&(
            &b.chunk.source_id,
            &b.chunk.file_path,
            b.chunk.start_line,
            b.chunk.end_line,
            &b.chunk.id,
        ))
    });
}

/// Merge chunks of the same file whose line ranges touch or overlap.
///
/// Expects reading order. Idempotent: no two chunks of the output can be
/// merged further.
pub fn merge_adjacent(chunks: Vec<RankedChunk>) -> Vec<RankedChunk> {
    let mut merged: Vec<RankedChunk> = Vec::with_capacity(chunks.len());

    for next in chunks {
        match merged.last_mut() {
            Some(prev) if touches(prev, &next) => absorb(prev, next),
            _ => merged.push(next),
        }
    }

    merged
}

fn touches(prev: &RankedChunk, next: &RankedChunk) -> bool {
    prev.chunk.source_id == next.chunk.source_id
        && prev.chunk.file_path == next.chunk.file_path
        && next.chunk.start_line <= prev.chunk.end_line + 1
}

fn absorb(prev: &mut RankedChunk, next: RankedChunk) {
    let tokens_sum = prev.chunk.tokens + next.chunk.tokens;

    if next.chunk.end_line > prev.chunk.end_line {
        // Lines of `next` already present in `prev`.
        let shared = (prev.chunk.end_line + 1).saturating_sub(next.chunk.start_line);
        let tail: Vec<&str> = next.chunk.content.split('\n').skip(shared).collect();
        if !tail.is_empty() {
            prev.chunk.content.push('\n');
            prev.chunk.content.push_str(&tail.join("\n"));
        }
        prev.chunk.end_line = next.chunk.end_line;
        prev.chunk.tokens = estimate_tokens(&prev.chunk.content).min(tokens_sum).max(1);
        prev.chunk.id = chunk_id(
            &prev.chunk.source_id,
            &prev.chunk.file_path,
            prev.chunk.start_line,
            prev.chunk.end_line,
        );
    }

    prev.score = prev.score.max(next.score);
    prev.similarity = prev.similarity.max(next.similarity);
    prev.boost = prev.boost.max(next.boost);
    prev.chunk.embedding = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::models::Chunk;

    fn ranked(file: &str, start: usize, end: usize, tokens: usize, score: f32) -> RankedChunk {
        let content = (start..=end)
            .map(|n| format!("line {}", n))
            .collect::<Vec<_>>()
            .join("\n");
        RankedChunk {
            chunk: Chunk {
                id: chunk_id("src", file, start, end),
                source_id: "src".to_string(),
                file_path: file.to_string(),
                content,
                start_line: start,
                end_line: end,
                tokens,
                embedding: None,
            },
            similarity: score,
            boost: 0.0,
            score,
        }
    }

    #[test]
    fn test_skips_large_then_takes_small() {
        let input = vec![
            ranked("a.rs", 1, 10, 60, 0.9),
            ranked("b.rs", 1, 10, 50, 0.8),
            ranked("c.rs", 1, 10, 30, 0.7),
        ];
        let result = fit(input, 90);
        let files: Vec<&str> = result.chunks.iter().map(|c| c.chunk.file_path.as_str()).collect();
        assert_eq!(files, vec!["a.rs", "c.rs"]);
        assert_eq!(result.total_tokens, 90);
        assert_eq!(result.excluded, 1);
        assert_eq!(result.chunks.len() + result.excluded, 3);
    }

    #[test]
    fn test_budget_never_exceeded_and_counts_add_up() {
        let input: Vec<RankedChunk> = (0..20)
            .map(|i| ranked(&format!("f{}.rs", i), 1, 5, 7 + (i * 13) % 40, 1.0 - i as f32 * 0.01))
            .collect();
        for budget in [1, 10, 50, 100, 333, 10_000] {
            let result = fit(input.clone(), budget);
            assert!(result.total_tokens <= budget);
            assert_eq!(result.accepted + result.excluded, input.len());
            assert_eq!(result.chunks.len(), result.accepted);
        }
    }

    #[test]
    fn test_deterministic() {
        let input = vec![
            ranked("b.rs", 20, 30, 10, 0.9),
            ranked("a.rs", 40, 50, 10, 0.8),
            ranked("a.rs", 1, 10, 10, 0.7),
        ];
        let a = fit(input.clone(), 25);
        let b = fit(input, 25);
        let ids_a: Vec<&str> = a.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
        let ids_b: Vec<&str> = b.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_output_in_reading_order() {
        let input = vec![
            ranked("b.rs", 1, 5, 5, 0.9),
            ranked("a.rs", 40, 50, 5, 0.8),
            ranked("a.rs", 1, 10, 5, 0.7),
        ];
        let result = fit(input, 100);
        let order: Vec<(&str, usize)> = result
            .chunks
            .iter()
            .map(|c| (c.chunk.file_path.as_str(), c.chunk.start_line))
            .collect();
        assert_eq!(order, vec![("a.rs", 1), ("a.rs", 40), ("b.rs", 1)]);
    }

    #[test]
    fn test_merge_adjacent_and_overlapping() {
        let input = vec![
            ranked("a.rs", 1, 5, 5, 0.4),
            ranked("a.rs", 6, 8, 3, 0.9),
            ranked("a.rs", 7, 12, 6, 0.5),
            ranked("a.rs", 20, 22, 3, 0.3),
        ];
        let merged = merge_adjacent(input);
        assert_eq!(merged.len(), 2);
        let first = &merged[0].chunk;
        assert_eq!((first.start_line, first.end_line), (1, 12));
        let expected: Vec<String> = (1..=12).map(|n| format!("line {}", n)).collect();
        assert_eq!(first.content, expected.join("\n"));
        assert_eq!(first.id, chunk_id("src", "a.rs", 1, 12));
        assert!(first.tokens <= 14);
        assert!((merged[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let text: String = (1..=300).map(|n| format!("fn item_{}() {{}}\n", n)).collect();
        let input: Vec<RankedChunk> = chunk_text("src", "lib.rs", &text, 80, 10)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| RankedChunk {
                chunk,
                similarity: 0.5,
                boost: 0.0,
                score: 0.5 - i as f32 * 0.001,
            })
            .collect();
        let once = fit(input, 200).chunks;
        let twice = merge_adjacent(once.clone());
        let view = |v: &[RankedChunk]| {
            v.iter()
                .map(|c| (c.chunk.id.clone(), c.chunk.content.clone(), c.chunk.tokens))
                .collect::<Vec<_>>()
        };
        assert_eq!(view(&once), view(&twice));
    }

    #[test]
    fn test_merge_keeps_files_apart() {
        let merged = merge_adjacent(vec![ranked("a.rs", 1, 5, 5, 0.5), ranked("b.rs", 6, 9, 4, 0.5)]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_zero_budget_excludes_all() {
        let result = fit(vec![ranked("a.rs", 1, 2, 1, 0.5)], 0);
        assert!(result.chunks.is_empty());
        assert_eq!(result.excluded, 1);
        assert_eq!(result.total_tokens, 0);
    }
}
