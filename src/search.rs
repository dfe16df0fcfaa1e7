//! Brute-force cosine similarity search.
//!
//! Every stored vector in the (optionally source-filtered) chunk set is
//! compared against the query vector. At single-project scale (thousands
//! of chunks) this needs no approximate index.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{Chunk, ScoredChunk};
use crate::store::IndexStore;

/// Default `retrieval.limit`: number of hits returned.
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct SearchOptions<'a> {
    pub limit: usize,
    pub source_ids: Option<&'a [String]>,
}

/// Search the store for the chunks most similar to `query_vec`.
pub async fn search(
    store: &IndexStore,
    query_vec: &[f32],
    options: &SearchOptions<'_>,
) -> Result<Vec<ScoredChunk>> {
    let chunks = store.list_chunks(options.source_ids).await?;
    let candidates = chunks.len();
    let hits = score_chunks(chunks, query_vec, options.limit);
    log::debug!("search: {} candidates, {} hits", candidates, hits.len());
    Ok(hits)
}

/// Score `chunks` against `query_vec`, best first, truncated to `limit`.
///
/// Chunks without an embedding are ignored. Equal similarities order by
/// chunk id ascending.
pub fn score_chunks(chunks: Vec<Chunk>, query_vec: &[f32], limit: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let similarity = cosine_similarity(query_vec, chunk.embedding.as_deref()?);
            Some(ScoredChunk { chunk, similarity })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_id: "src".to_string(),
            file_path: format!("{}.rs", id),
            content: "x".to_string(),
            start_line: 1,
            end_line: 1,
            tokens: 1,
            embedding,
        }
    }

    #[test]
    fn test_orders_by_similarity() {
        let chunks = vec![
            chunk("far", Some(vec![0.0, 1.0])),
            chunk("near", Some(vec![1.0, 0.1])),
            chunk("exact", Some(vec![1.0, 0.0])),
        ];
        let hits = score_chunks(chunks, &[1.0, 0.0], 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_id_and_limit_applies() {
        let chunks = vec![
            chunk("c", Some(vec![1.0, 1.0])),
            chunk("a", Some(vec![2.0, 2.0])),
            chunk("b", Some(vec![3.0, 3.0])),
        ];
        let hits = score_chunks(chunks, &[1.0, 1.0], 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_and_missing_vectors() {
        let chunks = vec![
            chunk("zero", Some(vec![0.0, 0.0])),
            chunk("none", None),
            chunk("ok", Some(vec![0.5, 0.5])),
        ];
        let hits = score_chunks(chunks, &[1.0, 0.0], 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "ok");
        assert_eq!(hits[1].similarity, -1.0);
    }
}
