//! Error taxonomy shared by the index, memory, advisory, and policy layers.
//!
//! Validation and not-found conditions go back to the caller with enough detail to
//! fix the request. Persistence and timeout conditions are absorbed by the layer that
//! hits them and only show up in logs. Application wiring (config, CLI, server) uses
//! `anyhow` on top of this.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VigilError>;

#[derive(Debug, Error)]
pub enum VigilError {
    /// Malformed or oversized input, rejected before any side effect.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("persistence failed for {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding failed: {0}")]
    Codec(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("ingestion queue is full")]
    QueueFull,

    #[error("index writer has shut down")]
    WriterClosed,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VigilError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<bincode::Error> for VigilError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_error() {
        let err = VigilError::Validation(vec!["bad tool".into(), "bad component".into()]);
        assert_eq!(
            err.to_string(),
            "validation failed: bad tool; bad component"
        );
    }

    #[test]
    fn not_found_is_detectable() {
        let err = VigilError::not_found("incident", "inc_missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "incident not found: inc_missing");
    }
}
