//! Glob-based file discovery under a configured source root.
//!
//! Walks the source directory (symlinks are not followed), keeps regular
//! files matching the source's `include` globs and none of its `exclude`
//! globs, and reads each one fully. Files that are too large, binary,
//! not UTF-8, or unreadable are counted in [`Discovery::skipped`] instead
//! of failing the walk. Results are sorted by relative path so downstream
//! chunk ids are reproducible.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::error::{ContextError, Result};
use crate::models::DiscoveredFile;

/// Files above this size are skipped.
pub const MAX_FILE_SIZE: u64 = 100 * 1024;

/// Excludes applied to every source on top of its own.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/.ctx/**",
];

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub skipped: usize,
}

/// Discover the files of `source`, resolving its path against `base_dir`.
pub fn discover(source: &SourceConfig, base_dir: &Path) -> Result<Discovery> {
    let root = resolve_root(source, base_dir)?;

    let include_set = build_globset(source, &source.include)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(source.exclude.iter().cloned());
    let exclude_set = build_globset(source, &excludes)?;
    let prune_set = build_globset(source, &prune_patterns())?;

    let mut discovery = Discovery::default();

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            // Only the built-in excluded directories are skipped wholesale.
            !prune_set.is_match(relative_str(entry.path(), &root))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("discover {}: skipping unreadable entry: {}", source.id, e);
                discovery.skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_str = relative_str(entry.path(), &root);

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_text_file(entry.path()) {
            Ok((content, size)) => discovery.files.push(DiscoveredFile {
                abs_path: entry.path().to_path_buf(),
                rel_path: rel_str,
                source_id: source.id.clone(),
                content,
                size,
            }),
            Err(reason) => {
                log::debug!("discover {}: skipping {}: {}", source.id, rel_str, reason);
                discovery.skipped += 1;
            }
        }
    }

    // Sort for deterministic ordering
    discovery.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Ok(discovery)
}

/// Resolve and check a source root: it must exist, be a directory, and sit
/// under `base_dir`.
pub fn resolve_root(source: &SourceConfig, base_dir: &Path) -> Result<std::path::PathBuf> {
    let invalid = |reason: String| ContextError::InvalidSource {
        id: source.id.clone(),
        reason,
    };

    let joined = base_dir.join(&source.path);
    let root = joined
        .canonicalize()
        .map_err(|e| invalid(format!("{}: {}", joined.display(), e)))?;
    if !root.is_dir() {
        return Err(invalid(format!("{} is not a directory", root.display())));
    }

    let base = base_dir.canonicalize()?;
    if !root.starts_with(&base) {
        return Err(invalid(format!(
            "{} is outside the project root {}",
            root.display(),
            base.display()
        )));
    }

    Ok(root)
}

/// Why a candidate file was not included.
#[derive(Debug, PartialEq)]
enum SkipReason {
    TooLarge(u64),
    Binary,
    NotUtf8,
    Unreadable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooLarge(size) => write!(f, "{} bytes exceeds {} byte limit", size, MAX_FILE_SIZE),
            SkipReason::Binary => write!(f, "contains a null byte"),
            SkipReason::NotUtf8 => write!(f, "not valid UTF-8"),
            SkipReason::Unreadable(e) => write!(f, "unreadable: {}", e),
        }
    }
}

fn read_text_file(path: &Path) -> std::result::Result<(String, u64), SkipReason> {
    let metadata = std::fs::metadata(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let size = metadata.len();
    if size > MAX_FILE_SIZE {
        return Err(SkipReason::TooLarge(size));
    }

    let bytes = std::fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    // The file may have grown between stat and read.
    if bytes.len() as u64 > MAX_FILE_SIZE {
        return Err(SkipReason::TooLarge(bytes.len() as u64));
    }
    if bytes.contains(&0) {
        return Err(SkipReason::Binary);
    }
    let size = bytes.len() as u64;
    let content = String::from_utf8(bytes).map_err(|_| SkipReason::NotUtf8)?;
    Ok((content, size))
}

/// Directory patterns for [`DEFAULT_EXCLUDES`]: `**/.git/**` becomes `**/.git`.
fn prune_patterns() -> Vec<String> {
    DEFAULT_EXCLUDES
        .iter()
        .map(|p| p.strip_suffix("/**").unwrap_or(p).to_string())
        .collect()
}

fn relative_str(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(source: &SourceConfig, patterns: &[String]) -> Result<GlobSet> {
    let invalid = |reason: String| ContextError::InvalidSource {
        id: source.id.clone(),
        reason,
    };
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| invalid(format!("pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| invalid(e.to_string()))
}
