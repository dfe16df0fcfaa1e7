//! Project settings (`.ctx/config.toml`).
//!
//! A project root holds a `.ctx/` directory with the human-edited settings
//! file and the index store beside it. [`Project`] resolves those paths;
//! [`load_config`] parses and validates the TOML, [`save_config`] writes it
//! back after source management edits.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ContextError;

/// Name of the per-project directory holding settings and the store.
pub const PROJECT_DIR: &str = ".ctx";
/// Settings file name inside [`PROJECT_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Store file, relative to `.ctx/` unless absolute.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index.db")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_lexical_boost")]
    pub lexical_boost: f32,
    #[serde(default = "default_budget")]
    pub default_budget: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            lexical_boost: default_lexical_boost(),
            default_budget: default_budget(),
        }
    }
}

fn default_limit() -> usize {
    crate::search::DEFAULT_LIMIT
}
fn default_lexical_boost() -> f32 {
    0.05
}
fn default_budget() -> i64 {
    8000
}

/// Upper bound for `retrieval.lexical_boost`, as a fraction of the similarity scale.
pub const MAX_LEXICAL_BOOST: f32 = 0.2;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_query_cache")]
    pub query_cache: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            query_cache: default_query_cache(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_query_cache() -> usize {
    128
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// A configured source root and its file patterns.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub id: String,
    pub path: PathBuf,
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

impl SourceConfig {
    pub fn new(id: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            path: path.into(),
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    validate(config)?;
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!(
            "chunking.overlap ({}) must be less than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    // Validate retrieval
    if config.retrieval.limit < 1 {
        bail!("retrieval.limit must be >= 1");
    }
    if !(0.0..=MAX_LEXICAL_BOOST).contains(&config.retrieval.lexical_boost) {
        bail!("retrieval.lexical_boost must be in [0.0, {}]", MAX_LEXICAL_BOOST);
    }
    if config.retrieval.default_budget <= 0 {
        bail!("retrieval.default_budget must be > 0");
    }

    // Validate embedding
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if emb.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    emb.provider
                );
            }
            if emb.dims.is_none() || emb.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is '{}'", emb.provider);
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, local, or disabled.",
            other
        ),
    }
    if emb.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if emb.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if emb.concurrency == 0 {
        bail!("embedding.concurrency must be > 0");
    }

    // Validate sources
    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.id.trim().is_empty() {
            bail!("source id must not be empty");
        }
        if source.id.contains(',') {
            bail!("source id '{}' must not contain ','", source.id);
        }
        if !seen.insert(source.id.as_str()) {
            bail!("duplicate source id: '{}'", source.id);
        }
        if source.include.is_empty() {
            bail!("source '{}' needs at least one include pattern", source.id);
        }
        for pattern in source.include.iter().chain(source.exclude.iter()) {
            Glob::new(pattern)
                .with_context(|| format!("source '{}': invalid pattern '{}'", source.id, pattern))?;
        }
    }

    Ok(())
}

/// A project root with its resolved settings and store location.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    /// Load the project rooted at `root`.
    ///
    /// Fails with [`ContextError::NotInitialized`] when `.ctx/config.toml`
    /// does not exist.
    pub fn load(root: &Path) -> Result<Self, ContextError> {
        let config_path = config_path(root);
        if !config_path.is_file() {
            return Err(ContextError::NotInitialized(root.to_path_buf()));
        }
        let config =
            load_config(&config_path).map_err(|e| ContextError::Config(format!("{:#}", e)))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn new(root: &Path, config: Config) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    pub fn ctx_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        config_path(&self.root)
    }

    pub fn store_path(&self) -> PathBuf {
        if self.config.index.path.is_absolute() {
            self.config.index.path.clone()
        } else {
            self.ctx_dir().join(&self.config.index.path)
        }
    }

    pub fn save(&self) -> Result<(), ContextError> {
        save_config(&self.config_path(), &self.config)
            .map_err(|e| ContextError::Config(format!("{:#}", e)))
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_DIR).join(CONFIG_FILE)
}
