//! Final ordering of search hits.
//!
//! `score = similarity + boost`, where `boost` is a lexical nudge for
//! chunks that literally contain the query or its words. The boost never
//! exceeds `lexical_boost`, itself capped at [`MAX_LEXICAL_BOOST`], so it
//! can reorder near ties but never overturn a clear similarity gap.
//! Ranking keeps every input chunk.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::MAX_LEXICAL_BOOST;
use crate::models::{RankedChunk, ScoredChunk};

/// Rank scored chunks: score desc, then similarity desc, then id asc.
pub fn rank(scored: Vec<ScoredChunk>, query: &str, lexical_boost: f32) -> Vec<RankedChunk> {
    let max_boost = lexical_boost.clamp(0.0, MAX_LEXICAL_BOOST);
    let needle = query.trim().to_lowercase();
    let terms = query_terms(query);

    let mut ranked: Vec<RankedChunk> = scored
        .into_iter()
        .map(|s| {
            let boost = boost_for(&s.chunk.content, &needle, &terms, max_boost);
            RankedChunk {
                score: s.similarity + boost,
                similarity: s.similarity,
                boost,
                chunk: s.chunk,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    ranked
}

/// Full boost for a literal match of the whole query; otherwise half the
/// boost scaled by the share of query terms found.
fn boost_for(content: &str, needle: &str, terms: &BTreeSet<String>, max_boost: f32) -> f32 {
    if max_boost == 0.0 || needle.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    if haystack.contains(needle) {
        return max_boost;
    }
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    max_boost / 2.0 * matched as f32 / terms.len() as f32
}

fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(id: &str, content: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                source_id: "src".to_string(),
                file_path: "f.rs".to_string(),
                content: content.to_string(),
                start_line: 1,
                end_line: 1,
                tokens: 1,
                embedding: None,
            },
            similarity,
        }
    }

    #[test]
    fn test_literal_match_gets_full_boost() {
        let ranked = rank(
            vec![scored("a", "fn parse_config(path)", 0.5)],
            "PARSE_CONFIG",
            0.05,
        );
        assert!((ranked[0].boost - 0.05).abs() < 1e-6);
        assert!((ranked[0].score - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_partial_terms_get_partial_boost() {
        let ranked = rank(
            vec![scored("a", "open the database", 0.5)],
            "database pool",
            0.1,
        );
        assert!((ranked[0].boost - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_boost_breaks_near_ties() {
        let ranked = rank(
            vec![
                scored("plain", "unrelated words", 0.61),
                scored("literal", "call load_index here", 0.60),
            ],
            "load_index",
            0.05,
        );
        assert_eq!(ranked[0].chunk.id, "literal");
    }

    #[test]
    fn test_boost_cannot_overturn_large_gap() {
        let ranked = rank(
            vec![
                scored("literal", "load_index", 0.30),
                scored("similar", "something else", 0.90),
            ],
            "load_index",
            1.0,
        );
        assert_eq!(ranked[0].chunk.id, "similar");
        assert!(ranked[1].boost <= MAX_LEXICAL_BOOST + f32::EPSILON);
    }

    #[test]
    fn test_never_drops_and_ties_are_deterministic() {
        let input = vec![
            scored("b", "x", 0.4),
            scored("a", "x", 0.4),
            scored("c", "y", 0.9),
        ];
        let ranked = rank(input, "zzz", 0.05);
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
