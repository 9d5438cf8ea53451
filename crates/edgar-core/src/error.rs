//! Error types for ingestion operations.
//!
//! This module defines [`IngestError`], the error taxonomy shared by the fetch
//! client, the normalizers, the store and the pipeline. Every variant except
//! [`IngestError::FatalConfig`] is scoped to a single identifier or record and
//! is absorbed by the pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting EDGAR data.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A source file, row, or payload is missing required data.
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// Network failure, timeout, or a retryable status that outlived the retry budget.
    #[error("Transient fetch failure for {url}: {reason}")]
    TransientFetch {
        /// The URL that was being fetched.
        url: String,
        /// What went wrong on the last attempt.
        reason: String,
    },

    /// The entity has no data at the source or in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write was rejected (constraint violation, bad foreign key, ...).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run cannot continue (missing schema, bad configuration).
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),
}

impl IngestError {
    /// Returns true if this error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig(_))
    }

    /// Short, stable label used in logs and run summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedSource(_) => "malformed_source",
            Self::TransientFetch { .. } => "transient_fetch",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::FatalConfig(_) => "fatal_config",
        }
    }
}

/// Result type alias using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(IngestError::FatalConfig("no schema".into()).is_fatal());
        assert!(!IngestError::Persistence("fk".into()).is_fatal());
        assert!(!IngestError::NotFound("CIK0000000001".into()).is_fatal());
        assert!(
            !IngestError::TransientFetch {
                url: "https://data.sec.gov".into(),
                reason: "timeout".into(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = IngestError::TransientFetch {
            url: "https://data.sec.gov/submissions/CIK0000320193.json".into(),
            reason: "HTTP 503".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CIK0000320193"));
        assert!(msg.contains("503"));
        assert_eq!(err.kind(), "transient_fetch");
    }
}
