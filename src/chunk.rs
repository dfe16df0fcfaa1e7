//! Line-window text chunker.
//!
//! Splits a file into windows of whole lines holding roughly `size` tokens,
//! with about `overlap` tokens of repeated lines between consecutive
//! windows. Every chunk records the 1-based inclusive line range it covers.
//!
//! Chunk ids are a SHA-256 of `(source, file, start_line, end_line)`, so
//! re-chunking an unchanged region yields the same id and the store can
//! upsert instead of duplicating.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, DiscoveredFile};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`: `ceil(chars / 4)`, at least 1 when
/// the text is non-empty.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Deterministic chunk id for a line range of a file.
pub fn chunk_id(source_id: &str, file_path: &str, start_line: usize, end_line: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(file_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(start_line.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(end_line.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split a discovered file into overlapping, token-bounded chunks.
///
/// `overlap` must be less than `size` (checked when the config is loaded).
/// A file shorter than `size` tokens yields exactly one chunk; an empty or
/// whitespace-only file yields none.
pub fn chunk_file(file: &DiscoveredFile, size: usize, overlap: usize) -> Vec<Chunk> {
    chunk_text(&file.source_id, &file.rel_path, &file.content, size, overlap)
}

pub fn chunk_text(
    source_id: &str,
    file_path: &str,
    content: &str,
    size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    // Each line pays for its trailing newline.
    let costs: Vec<usize> = lines
        .iter()
        .map(|l| (l.chars().count() + 1).div_ceil(CHARS_PER_TOKEN))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = start;
        let mut window = 0;
        while end < lines.len() && (end == start || window + costs[end] <= size) {
            window += costs[end];
            end += 1;
        }

        // Fold a small tail into this window rather than emit a sliver.
        if end < lines.len() {
            let rest: usize = costs[end..].iter().sum();
            if rest < size / 2 {
                end = lines.len();
            }
        }

        let text = lines[start..end].join("\n");
        if !text.trim().is_empty() {
            chunks.push(make_chunk(source_id, file_path, text, start + 1, end));
        }

        if end >= lines.len() {
            break;
        }

        // Back off trailing lines for overlap, always advancing at least one line.
        let mut next = end;
        let mut repeated = 0;
        while next > start + 1 && repeated + costs[next - 1] <= overlap {
            repeated += costs[next - 1];
            next -= 1;
        }
        start = next;
    }

    chunks
}

fn make_chunk(
    source_id: &str,
    file_path: &str,
    content: String,
    start_line: usize,
    end_line: usize,
) -> Chunk {
    Chunk {
        id: chunk_id(source_id, file_path, start_line, end_line),
        source_id: source_id.to_string(),
        file_path: file_path.to_string(),
        tokens: estimate_tokens(&content).max(1),
        content,
        start_line,
        end_line,
        embedding: None,
    }
}
