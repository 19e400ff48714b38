//! Error types for Ghost

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::RecordId;

/// Stage of the save/commit sequence at which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    ReadSnapshot,
    WriteRecord,
    WriteSnapshot,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitStage::ReadSnapshot => "read snapshot",
            CommitStage::WriteRecord => "write run record",
            CommitStage::WriteSnapshot => "write snapshot",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while tracking, committing or querying
#[derive(Debug, Error)]
pub enum GhostError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No authenticated session")]
    Unauthenticated,

    #[error("Commit of run {record_id} failed at {stage}: {source}")]
    Commit {
        stage: CommitStage,
        record_id: RecordId,
        #[source]
        source: Box<GhostError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GhostError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GhostError::TransientIo(_) | GhostError::Timeout { .. } | GhostError::Io(_) => true,
            GhostError::Commit { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GhostError::TransientIo("reset".into()).is_retryable());
        assert!(GhostError::Timeout {
            operation: "read snapshot",
            after: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!GhostError::InvalidState("tracking".into()).is_retryable());
        assert!(!GhostError::NotFound("users/x".into()).is_retryable());
    }

    #[test]
    fn test_commit_error_inherits_source_retryability() {
        let err = GhostError::Commit {
            stage: CommitStage::WriteSnapshot,
            record_id: RecordId::new(),
            source: Box::new(GhostError::TransientIo("socket closed".into())),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("write snapshot"));

        let err = GhostError::Commit {
            stage: CommitStage::ReadSnapshot,
            record_id: RecordId::new(),
            source: Box::new(GhostError::NotFound("users/ghost".into())),
        };
        assert!(!err.is_retryable());
    }
}
