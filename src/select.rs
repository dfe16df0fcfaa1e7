//! The selection pipeline: query → embed → search → rank → fit.
//!
//! Input is validated before the store is touched: a non-positive budget,
//! an empty query or an unknown source filter fail without a single read.
//! An empty index is not an error; it yields a well-formed result with
//! `is_empty` set.

use serde::Deserialize;
use std::time::Instant;

use crate::budget;
use crate::config::Project;
use crate::embedding::EmbeddingAdapter;
use crate::error::{ContextError, Result};
use crate::models::SelectionResult;
use crate::rank;
use crate::search::{self, SearchOptions};
use crate::store::{EmbeddingMeta, IndexStore};

/// Arguments of one selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectRequest {
    pub query: String,
    /// Token budget; the configured default when absent.
    #[serde(default)]
    pub budget: Option<i64>,
    /// Restrict to these source ids; all sources when absent or empty.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl SelectRequest {
    pub fn new(query: &str, budget: i64) -> Self {
        Self {
            query: query.to_string(),
            budget: Some(budget),
            sources: None,
        }
    }
}

/// Check a budget is a positive integer.
pub fn validate_budget(budget: i64) -> Result<usize> {
    if budget <= 0 {
        return Err(ContextError::InvalidBudget(budget));
    }
    Ok(budget as usize)
}

/// Validate everything that can be checked without the store. Returns the
/// effective budget and source filter.
pub fn validate_request(
    project: &Project,
    request: &SelectRequest,
) -> Result<(usize, Option<Vec<String>>)> {
    let budget =
        validate_budget(request.budget.unwrap_or(project.config.retrieval.default_budget))?;

    if request.query.trim().is_empty() {
        return Err(ContextError::EmptyQuery);
    }

    let sources = match &request.sources {
        Some(ids) if !ids.is_empty() => {
            if let Some(unknown) = ids.iter().find(|id| project.config.source(id).is_none()) {
                return Err(ContextError::UnknownSource(unknown.clone()));
            }
            Some(ids.clone())
        }
        _ => None,
    };

    Ok((budget, sources))
}

pub async fn select(
    project: &Project,
    store: &IndexStore,
    adapter: &EmbeddingAdapter,
    request: &SelectRequest,
) -> Result<SelectionResult> {
    let started = Instant::now();
    let (budget, sources) = validate_request(project, request)?;

    let mut result = SelectionResult {
        query: request.query.clone(),
        budget,
        chunks: Vec::new(),
        total_tokens: 0,
        considered: 0,
        excluded: 0,
        elapsed_ms: 0,
        is_empty: false,
    };

    if store.count_chunks().await? == 0 {
        log::warn!("index is empty; run `ctx index` first");
        result.is_empty = true;
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        return Ok(result);
    }

    check_embedding_model(store, adapter).await?;

    let query_vec = adapter.embed_query(&request.query).await?;
    let options = SearchOptions {
        limit: project.config.retrieval.limit,
        source_ids: sources.as_deref(),
    };
    let hits = search::search(store, &query_vec, &options).await?;
    result.considered = hits.len();

    let ranked = rank::rank(hits, &request.query, project.config.retrieval.lexical_boost);
    let fitted = budget::fit(ranked, budget);

    result.chunks = fitted.chunks;
    result.total_tokens = fitted.total_tokens;
    result.excluded = fitted.excluded;
    result.elapsed_ms = started.elapsed().as_millis() as u64;

    log::info!(
        "select: {} considered, {} selected, {} excluded, {}/{} tokens in {} ms",
        result.considered,
        result.chunks.len(),
        result.excluded,
        result.total_tokens,
        budget,
        result.elapsed_ms
    );
    Ok(result)
}

/// Fail when the index was built with another embedding model than the one
/// configured now; its vectors would not be comparable.
async fn check_embedding_model(store: &IndexStore, adapter: &EmbeddingAdapter) -> Result<()> {
    let configured = EmbeddingMeta {
        model: adapter.model_name().to_string(),
        dims: adapter.dims(),
    };
    match store.embedding_meta().await? {
        Some(stored) if stored != configured => Err(ContextError::EmbeddingMismatch {
            stored: stored.model,
            stored_dims: stored.dims,
            configured: configured.model,
            configured_dims: configured.dims,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SourceConfig};
    use std::path::Path;

    fn project() -> Project {
        let mut config = Config::default();
        config.sources.push(SourceConfig::new("src", "src"));
        Project::new(Path::new("/proj"), config)
    }

    #[test]
    fn test_validate_budget() {
        assert!(matches!(validate_budget(0), Err(ContextError::InvalidBudget(0))));
        assert!(matches!(validate_budget(-5), Err(ContextError::InvalidBudget(-5))));
        assert_eq!(validate_budget(1).unwrap(), 1);
    }

    #[test]
    fn test_default_budget_applies() {
        let request = SelectRequest {
            query: "x".to_string(),
            ..Default::default()
        };
        let (budget, sources) = validate_request(&project(), &request).unwrap();
        assert_eq!(budget, 8000);
        assert!(sources.is_none());
    }

    #[test]
    fn test_rejects_empty_query_and_unknown_source() {
        let empty = SelectRequest::new("   ", 100);
        assert!(matches!(
            validate_request(&project(), &empty),
            Err(ContextError::EmptyQuery)
        ));

        let mut unknown = SelectRequest::new("x", 100);
        unknown.sources = Some(vec!["src".to_string(), "docs".to_string()]);
        assert!(matches!(
            validate_request(&project(), &unknown),
            Err(ContextError::UnknownSource(id)) if id == "docs"
        ));
    }

    #[test]
    fn test_request_from_json() {
        let request: SelectRequest =
            serde_json::from_value(serde_json::json!({ "query": "q", "budget": 50 })).unwrap();
        assert_eq!(request.budget, Some(50));
        assert!(request.sources.is_none());
    }
}
