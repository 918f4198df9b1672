//! Custom error types for the casetrace analysis engine.
//!
//! The taxonomy mirrors the run lifecycle: extraction and persistence
//! failures are fatal to a source run, normalization and enrichment
//! failures are absorbed per record.

use std::path::PathBuf;

/// The main error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Artifact unreadable or schema mismatch for the declared source type.
    /// Fatal: the source transitions to `Failed`.
    #[error("extraction failed for {path:?}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// One raw record could not be mapped into the canonical shape.
    /// Recovered by skipping the record.
    #[error("record {external_id:?} could not be normalized: {reason}")]
    Normalization {
        external_id: Option<String>,
        reason: String,
    },

    /// Enrichment failure for one item's content. Recovered by
    /// substituting neutral defaults.
    #[error("enrichment failed: {0}")]
    Enrichment(String),

    /// Durable-write failure. Fatal: the source transitions to `Failed`
    /// with the underlying message preserved.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// I/O error (file read, permissions, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lookup of an unknown source id
    #[error("source {0} not found")]
    SourceNotFound(String),

    /// Report requested before the source reached `Completed`
    #[error("report unavailable: source {id} has status {status}")]
    ReportUnavailable { id: String, status: String },

    /// Run requested from a status that cannot enter `Processing`
    #[error("source {id} cannot start a run from status {status}")]
    InvalidState { id: String, status: String },
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create an extraction error with artifact context
    pub fn extraction(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a normalization error for one record
    pub fn normalization(external_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::Normalization {
            external_id,
            reason: reason.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that abort the whole source run. Per-record
    /// errors are absorbed by the orchestrator instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Normalization { .. } | Self::Enrichment(_))
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for EngineError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_display() {
        let err = EngineError::extraction("/evidence/backup.db", "not a SQLite database");
        assert!(err.to_string().contains("backup.db"));
        assert!(err.to_string().contains("not a SQLite database"));
    }

    #[test]
    fn test_fatality_split() {
        assert!(EngineError::extraction("/x", "bad").is_fatal());
        assert!(!EngineError::normalization(Some("msg-1".into()), "no timestamp").is_fatal());
        assert!(!EngineError::Enrichment("model unavailable".into()).is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io_err.into();
        assert!(err.is_fatal());
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
