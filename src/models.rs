//! Core data models used throughout the indexing and selection pipeline.
//!
//! Files flow in as [`DiscoveredFile`]s, are cut into [`Chunk`]s and
//! persisted; queries come back out as [`ScoredChunk`] → [`RankedChunk`] →
//! [`SelectionResult`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A file found under a source root, fully read into memory.
///
/// Never persisted; discarded after chunking.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    /// Path relative to the source root, `/`-separated.
    pub rel_path: String,
    pub source_id: String,
    pub content: String,
    pub size: u64,
}

/// A token-bounded slice of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub file_path: String,
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub tokens: usize,
    pub embedding: Option<Vec<f32>>,
}

/// Per-source summary refreshed on each indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub source_id: String,
    pub path: String,
    pub file_count: i64,
    pub chunk_count: i64,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A chunk with its cosine similarity against a query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// A scored chunk with its final ranking score.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub similarity: f32,
    /// Bounded additive adjustment applied on top of `similarity`.
    pub boost: f32,
    pub score: f32,
}

/// Outcome of one selection query.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub query: String,
    pub budget: usize,
    /// Ranked, budget-fitted and merged chunks in file order.
    pub chunks: Vec<RankedChunk>,
    pub total_tokens: usize,
    pub considered: usize,
    pub excluded: usize,
    pub elapsed_ms: u64,
    /// True when the index held no chunks to search.
    pub is_empty: bool,
}
