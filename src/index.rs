//! The indexing pipeline: discover → chunk → embed → replace.
//!
//! Sources are processed one at a time. For each, every file is chunked,
//! chunks whose id and content are unchanged since the last run reuse
//! their stored vector, the rest are embedded, and the source's chunk set
//! is swapped in with one transaction. A source that fails keeps its
//! previous rows; the run moves on to the next source and reports the
//! failure.

use serde::Serialize;
use std::time::Instant;

use crate::chunk::chunk_file;
use crate::config::{Project, SourceConfig};
use crate::discovery::discover;
use crate::embedding::EmbeddingAdapter;
use crate::error::{ContextError, Result};
use crate::models::Chunk;
use crate::store::{EmbeddingMeta, IndexStore, SourceStats};

/// Outcome of indexing one source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub files: usize,
    pub skipped: usize,
    pub chunks: usize,
    /// Chunks whose stored embedding was kept.
    pub reused: usize,
    /// Chunks sent to the embedding provider.
    pub embedded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub sources: Vec<SourceReport>,
    /// Sources dropped from the store because they left the config.
    pub pruned: Vec<String>,
    pub elapsed_ms: u64,
}

impl IndexReport {
    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn total_chunks(&self) -> usize {
        self.sources.iter().map(|s| s.chunks).sum()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<20} {:>6} {:>8} {:>7} {:>7} {:>9}\n",
            "SOURCE", "FILES", "SKIPPED", "CHUNKS", "REUSED", "EMBEDDED"
        ));
        for s in &self.sources {
            match &s.error {
                Some(e) => out.push_str(&format!("{:<20} failed: {}\n", s.source_id, e)),
                None => out.push_str(&format!(
                    "{:<20} {:>6} {:>8} {:>7} {:>7} {:>9}\n",
                    s.source_id, s.files, s.skipped, s.chunks, s.reused, s.embedded
                )),
            }
        }
        for id in &self.pruned {
            out.push_str(&format!("{:<20} removed (no longer configured)\n", id));
        }
        out.push_str(&format!(
            "\n{} chunks indexed in {} ms",
            self.total_chunks(),
            self.elapsed_ms
        ));
        if self.failed() > 0 {
            out.push_str(&format!(", {} source(s) failed", self.failed()));
        }
        out.push('\n');
        out
    }
}

/// Index the configured sources, or only `only` when given.
///
/// A run without a filter also deletes store rows of sources that are no
/// longer configured.
pub async fn run_index(
    project: &Project,
    store: &IndexStore,
    adapter: &EmbeddingAdapter,
    only: Option<&[String]>,
) -> Result<IndexReport> {
    let started = Instant::now();
    let config = &project.config;

    if !config.embedding.is_enabled() {
        return Err(ContextError::Embedding(
            "embedding provider is disabled; indexing needs one".to_string(),
        ));
    }

    let mut selected: Vec<&SourceConfig> = match only {
        Some(ids) if !ids.is_empty() => {
            let mut picked = Vec::new();
            for id in ids {
                let source = config
                    .source(id)
                    .ok_or_else(|| ContextError::UnknownSource(id.clone()))?;
                picked.push(source);
            }
            picked
        }
        _ => config.sources.iter().collect(),
    };
    let mut full_run = only.map_or(true, |ids| ids.is_empty());

    // Vectors from another model were cleared; every source needs rebuilding.
    if sync_embedding_meta(store, adapter).await? && !full_run {
        log::info!("index: embedding model changed; indexing every source");
        selected = config.sources.iter().collect();
        full_run = true;
    }

    let mut report = IndexReport::default();

    if full_run {
        for id in store.source_ids().await? {
            if config.source(&id).is_none() {
                store.delete_source(&id).await?;
                log::info!("index: removed stale source '{}'", id);
                report.pruned.push(id);
            }
        }
    }

    for source in selected {
        match index_source(project, store, adapter, source).await {
            Ok(source_report) => {
                log::info!(
                    "index {}: {} files, {} skipped, {} chunks ({} reused, {} embedded)",
                    source.id,
                    source_report.files,
                    source_report.skipped,
                    source_report.chunks,
                    source_report.reused,
                    source_report.embedded
                );
                report.sources.push(source_report);
            }
            Err(e) => {
                log::warn!("index {}: {}", source.id, e);
                report.sources.push(SourceReport {
                    source_id: source.id.clone(),
                    error: Some(e.to_string()),
                    ..Default::default()
                });
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

/// Record the configured model, clearing every stored vector first when it
/// differs from the one the index was built with. Returns whether it did.
async fn sync_embedding_meta(store: &IndexStore, adapter: &EmbeddingAdapter) -> Result<bool> {
    let configured = EmbeddingMeta {
        model: adapter.model_name().to_string(),
        dims: adapter.dims(),
    };
    match store.embedding_meta().await? {
        Some(stored) if stored == configured => Ok(false),
        Some(stored) => {
            log::info!(
                "embedding model changed from {} ({} dims) to {} ({} dims); re-embedding everything",
                stored.model,
                stored.dims,
                configured.model,
                configured.dims
            );
            store.reset_embeddings(&configured).await?;
            Ok(true)
        }
        None => {
            store.set_embedding_meta(&configured).await?;
            Ok(false)
        }
    }
}

async fn index_source(
    project: &Project,
    store: &IndexStore,
    adapter: &EmbeddingAdapter,
    source: &SourceConfig,
) -> Result<SourceReport> {
    let discovery = discover(source, &project.root)?;
    let chunking = &project.config.chunking;

    let mut report = SourceReport {
        source_id: source.id.clone(),
        skipped: discovery.skipped,
        ..Default::default()
    };

    let mut chunks: Vec<Chunk> = Vec::new();
    for file in &discovery.files {
        let file_chunks = chunk_file(file, chunking.size, chunking.overlap);
        if file_chunks.is_empty() {
            log::debug!("index {}: skipping {}: no content", source.id, file.rel_path);
            report.skipped += 1;
            continue;
        }
        report.files += 1;
        chunks.extend(file_chunks);
    }

    let existing = store.existing_chunks(&source.id).await?;
    let dims = adapter.dims();
    let mut pending = Vec::new();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        let reusable = existing
            .get(&chunk.id)
            .filter(|old| old.content == chunk.content)
            .and_then(|old| old.embedding.clone())
            .filter(|v| v.len() == dims);
        match reusable {
            Some(vector) => {
                chunk.embedding = Some(vector);
                report.reused += 1;
            }
            None => pending.push(i),
        }
    }

    if !pending.is_empty() {
        let texts: Vec<String> = pending.iter().map(|&i| chunks[i].content.clone()).collect();
        let vectors = adapter.embed_texts(&texts).await?;
        for (&i, vector) in pending.iter().zip(vectors) {
            chunks[i].embedding = Some(vector);
        }
        report.embedded = pending.len();
    }

    report.chunks = chunks.len();
    let stats = SourceStats {
        file_count: report.files,
        chunk_count: report.chunks,
    };
    store.replace_source(source, stats, &chunks).await?;

    Ok(report)
}
