//! Error taxonomy shared by the CLI and the tool server.
//!
//! Every failure a caller can observe is a [`ContextError`]. Each variant
//! maps to a stable machine code, a coarse [`ErrorKind`], an optional
//! remedial hint, and a CLI exit code, so both front ends report the same
//! condition the same way:
//!
//! ```json
//! { "error": { "code": "not_initialized", "kind": "state", "message": "...", "hint": "run `ctx init`" } }
//! ```

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Current on-disk schema version written to the `meta` table.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("budget must be a positive integer, got {0}")]
    InvalidBudget(i64),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("unknown source: '{0}'")]
    UnknownSource(String),

    #[error("invalid source '{id}': {reason}")]
    InvalidSource { id: String, reason: String },

    #[error("project not initialized at {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("index schema is missing or incompatible (found {found:?}, expected {expected})")]
    SchemaMismatch { found: Option<i64>, expected: i64 },

    #[error(
        "index was built with embedding model '{stored}' ({stored_dims} dims) but '{configured}' ({configured_dims} dims) is configured"
    )]
    EmbeddingMismatch {
        stored: String,
        stored_dims: usize,
        configured: String,
        configured_dims: usize,
    },

    #[error("tool server is shutting down")]
    ServerStopped,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Coarse classification of a [`ContextError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    State,
    Embedding,
    Config,
    Store,
    Io,
    Internal,
}

pub type Result<T, E = ContextError> = std::result::Result<T, E>;

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBudget(_)
            | Self::EmptyQuery
            | Self::UnknownSource(_)
            | Self::InvalidSource { .. } => ErrorKind::Input,
            Self::NotInitialized(_)
            | Self::SchemaMismatch { .. }
            | Self::EmbeddingMismatch { .. }
            | Self::ServerStopped => ErrorKind::State,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::Config(_) => ErrorKind::Config,
            Self::Store(_) => ErrorKind::Store,
            Self::Io(_) => ErrorKind::Io,
            Self::Encode(_) => ErrorKind::Internal,
        }
    }

    /// Stable identifier used in JSON payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBudget(_) => "invalid_budget",
            Self::EmptyQuery => "empty_query",
            Self::UnknownSource(_) => "unknown_source",
            Self::InvalidSource { .. } => "invalid_source",
            Self::NotInitialized(_) => "not_initialized",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::EmbeddingMismatch { .. } => "embedding_mismatch",
            Self::ServerStopped => "server_stopped",
            Self::Embedding(_) => "embedding_failed",
            Self::Config(_) => "config_error",
            Self::Store(_) => "store_error",
            Self::Io(_) => "io_error",
            Self::Encode(_) => "encode_error",
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized(_) => Some("run `ctx init`"),
            Self::SchemaMismatch { .. } => Some("delete .ctx/index.db and run `ctx init` then `ctx index`"),
            Self::EmbeddingMismatch { .. } => Some("run `ctx index` to rebuild embeddings"),
            Self::UnknownSource(_) => Some("run `ctx source list` to see configured sources"),
            _ => None,
        }
    }

    /// Input errors are usage errors (exit 2); everything else exits 1.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Input => 2,
            _ => 1,
        }
    }

    /// Structured error object returned by the tool server.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "kind": self.kind(),
                "message": self.to_string(),
                "hint": self.hint(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_usage_errors() {
        assert_eq!(ContextError::InvalidBudget(0).exit_code(), 2);
        assert_eq!(ContextError::UnknownSource("x".into()).exit_code(), 2);
        assert_eq!(ContextError::Embedding("down".into()).exit_code(), 1);
        assert_eq!(ContextError::NotInitialized(PathBuf::from(".")).exit_code(), 1);
    }

    #[test]
    fn test_payload_shape() {
        let err = ContextError::NotInitialized(PathBuf::from("/tmp/p"));
        let payload = err.payload();
        assert_eq!(payload["error"]["code"], "not_initialized");
        assert_eq!(payload["error"]["kind"], "state");
        assert_eq!(payload["error"]["hint"], "run `ctx init`");
        assert!(payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("/tmp/p"));
    }

    #[test]
    fn test_encode_error_is_internal() {
        let err: ContextError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "encode_error");
        assert_eq!(err.payload()["error"]["kind"], "internal");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ContextError::InvalidBudget(-3).to_string(),
            "budget must be a positive integer, got -3"
        );
        let err = ContextError::SchemaMismatch {
            found: Some(7),
            expected: SCHEMA_VERSION,
        };
        assert!(err.to_string().contains("expected 1"));
    }
}
