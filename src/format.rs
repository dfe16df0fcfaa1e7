//! Rendering of a [`SelectionResult`] as text and as structured JSON.
//!
//! Pure: no I/O. The CLI prints `text` or `data`; the tool server returns
//! `data`.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{RankedChunk, SelectionResult};

#[derive(Debug, Clone)]
pub struct Formatted {
    pub text: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChunkView<'a> {
    id: &'a str,
    source: &'a str,
    file: &'a str,
    start_line: usize,
    end_line: usize,
    tokens: usize,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boost: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Stats {
    total_tokens: usize,
    budget: usize,
    chunks_considered: usize,
    chunks_included: usize,
    chunks_excluded: usize,
    files_included: usize,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct SelectionView<'a> {
    query: &'a str,
    is_empty: bool,
    context: String,
    chunks: Vec<ChunkView<'a>>,
    stats: Stats,
}

pub fn format(result: &SelectionResult, explain: bool) -> Formatted {
    let stats = Stats {
        total_tokens: result.total_tokens,
        budget: result.budget,
        chunks_considered: result.considered,
        chunks_included: result.chunks.len(),
        chunks_excluded: result.excluded,
        files_included: files_included(&result.chunks),
        elapsed_ms: result.elapsed_ms,
    };

    let view = SelectionView {
        query: &result.query,
        is_empty: result.is_empty,
        context: context_text(&result.chunks),
        chunks: result
            .chunks
            .iter()
            .map(|r| ChunkView {
                id: &r.chunk.id,
                source: &r.chunk.source_id,
                file: &r.chunk.file_path,
                start_line: r.chunk.start_line,
                end_line: r.chunk.end_line,
                tokens: r.chunk.tokens,
                score: r.score,
                similarity: explain.then_some(r.similarity),
                boost: explain.then_some(r.boost),
            })
            .collect(),
        stats,
    };

    let text = render_text(result, &view, explain);
    let data = serde_json::to_value(&view).unwrap_or(serde_json::Value::Null);
    Formatted { text, data }
}

fn files_included(chunks: &[RankedChunk]) -> usize {
    chunks
        .iter()
        .map(|r| (r.chunk.source_id.as_str(), r.chunk.file_path.as_str()))
        .collect::<BTreeSet<_>>()
        .len()
}

/// The selected chunks concatenated, each behind a location header.
fn context_text(chunks: &[RankedChunk]) -> String {
    let mut out = String::new();
    for r in chunks {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "// {}:{}-{}\n",
            r.chunk.file_path, r.chunk.start_line, r.chunk.end_line
        ));
        out.push_str(&r.chunk.content);
        if !r.chunk.content.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn render_text(result: &SelectionResult, view: &SelectionView<'_>, explain: bool) -> String {
    let mut out = String::new();

    if result.is_empty {
        out.push_str("No indexed content. Run `ctx index` first.\n");
        return out;
    }
    if result.chunks.is_empty() {
        out.push_str(&format!(
            "No chunks fit a budget of {} tokens ({} considered).\n",
            result.budget, result.considered
        ));
        return out;
    }

    out.push_str(&format!(
        "{} chunks from {} files, {}/{} tokens ({} considered, {} excluded, {} ms)\n",
        view.stats.chunks_included,
        view.stats.files_included,
        view.stats.total_tokens,
        view.stats.budget,
        view.stats.chunks_considered,
        view.stats.chunks_excluded,
        view.stats.elapsed_ms
    ));

    for r in &result.chunks {
        out.push('\n');
        let mut header = format!(
            "── {}:{}-{} [{}] score {:.3}",
            r.chunk.file_path, r.chunk.start_line, r.chunk.end_line, r.chunk.source_id, r.score
        );
        if explain {
            header.push_str(&format!(
                " (similarity {:.3} + boost {:.3})",
                r.similarity, r.boost
            ));
        }
        out.push_str(&header);
        out.push('\n');
        out.push_str(&r.chunk.content);
        if !r.chunk.content.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}
