//! Index status and health overview.
//!
//! Summarizes what is indexed: store location and size, the embedding model
//! the vectors were built with, chunk totals, and a per-source breakdown
//! including configured sources that were never indexed. Used by
//! `ctx status` and the `status` tool.

use serde::Serialize;
use std::path::PathBuf;

use crate::config::Project;
use crate::embedding::EmbeddingAdapter;
use crate::error::Result;
use crate::store::{EmbeddingMeta, IndexStore};

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub path: String,
    pub configured: bool,
    pub indexed: bool,
    pub file_count: i64,
    pub chunk_count: i64,
    /// RFC 3339.
    pub indexed_at: Option<String>,
    pub indexed_ago: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub initialized: bool,
    pub root: PathBuf,
    pub store_path: PathBuf,
    pub store_size_bytes: u64,
    pub configured_model: EmbeddingMeta,
    pub indexed_model: Option<EmbeddingMeta>,
    /// True when the stored vectors come from another model than the
    /// configured one; `ctx index` rebuilds them.
    pub model_mismatch: bool,
    pub total_chunks: usize,
    pub sources: Vec<SourceStatus>,
}

/// Collect a status report. `store` is `None` when the store file does not
/// exist yet.
pub async fn status(
    project: &Project,
    store: Option<&IndexStore>,
    adapter: &EmbeddingAdapter,
) -> Result<StatusReport> {
    let store_path = project.store_path();
    let store_size_bytes = std::fs::metadata(&store_path).map(|m| m.len()).unwrap_or(0);
    let configured_model = EmbeddingMeta {
        model: adapter.model_name().to_string(),
        dims: adapter.dims(),
    };

    let (indexed_model, total_chunks, records) = match store {
        Some(store) => (
            store.embedding_meta().await?,
            store.count_chunks().await?,
            store.source_records().await?,
        ),
        None => (None, 0, Vec::new()),
    };

    let mut sources: Vec<SourceStatus> = records
        .into_iter()
        .map(|r| SourceStatus {
            configured: project.config.source(&r.source_id).is_some(),
            indexed: true,
            source_id: r.source_id,
            path: r.path,
            file_count: r.file_count,
            chunk_count: r.chunk_count,
            indexed_at: r.indexed_at.map(|t| t.to_rfc3339()),
            indexed_ago: r.indexed_at.map(|t| format_ts_relative(t.timestamp())),
        })
        .collect();

    for source in &project.config.sources {
        if !sources.iter().any(|s| s.source_id == source.id) {
            sources.push(SourceStatus {
                source_id: source.id.clone(),
                path: source.path.display().to_string(),
                configured: true,
                indexed: false,
                file_count: 0,
                chunk_count: 0,
                indexed_at: None,
                indexed_ago: None,
            });
        }
    }
    sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let model_mismatch = indexed_model
        .as_ref()
        .is_some_and(|m| *m != configured_model);

    Ok(StatusReport {
        initialized: store.is_some(),
        root: project.root.clone(),
        store_path,
        store_size_bytes,
        configured_model,
        indexed_model,
        model_mismatch,
        total_chunks,
        sources,
    })
}

impl StatusReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Context Pack Index Status\n");
        out.push_str("=========================\n\n");
        out.push_str(&format!("  Root:        {}\n", self.root.display()));
        out.push_str(&format!("  Index:       {}\n", self.store_path.display()));
        if !self.initialized {
            out.push_str("  State:       not initialized (run `ctx init`)\n");
            return out;
        }
        out.push_str(&format!("  Size:        {}\n", format_bytes(self.store_size_bytes)));
        out.push_str(&format!(
            "  Model:       {} ({} dims)\n",
            self.configured_model.model, self.configured_model.dims
        ));
        if self.model_mismatch {
            if let Some(indexed) = &self.indexed_model {
                out.push_str(&format!(
                    "  Warning:     index built with {} ({} dims); run `ctx index`\n",
                    indexed.model, indexed.dims
                ));
            }
        }
        out.push_str(&format!("  Chunks:      {}\n", self.total_chunks));

        if !self.sources.is_empty() {
            out.push_str("\n  By source:\n");
            out.push_str(&format!(
                "  {:<20} {:>6} {:>8}   {}\n",
                "SOURCE", "FILES", "CHUNKS", "INDEXED"
            ));
            out.push_str(&format!("  {}\n", "-".repeat(60)));
            for s in &self.sources {
                let when = match (&s.indexed_ago, s.configured) {
                    (Some(ago), true) => ago.clone(),
                    (Some(ago), false) => format!("{} (no longer configured)", ago),
                    (None, _) => "never".to_string(),
                };
                out.push_str(&format!(
                    "  {:<20} {:>6} {:>8}   {}\n",
                    s.source_id, s.file_count, s.chunk_count, when
                ));
            }
        }
        out
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
