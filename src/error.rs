//! Error types for the context assembly domain.
//!
//! Build-path errors are captured into the per-key build record and
//! never escape `get_context`; configuration errors surface
//! synchronously to the caller.

use thiserror::Error;

use crate::models::ContextKey;

/// Failure modes of a background context build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No eligible documents exist for the key. Terminal: retrying
    /// cannot help until a new document arrives.
    #[error("no active documents for {key}")]
    NoDocuments { key: ContextKey },

    /// Text extraction failed for a single document. Recorded in
    /// `failed_documents`; only fatal when no document succeeds.
    #[error("extraction failed for document {document_id}: {reason}")]
    Extraction { document_id: String, reason: String },

    /// Anything else that went wrong mid-build. Retried with backoff.
    #[error("build failed: {0}")]
    Transient(#[from] anyhow::Error),
}

impl BuildError {
    /// Whether the scheduler should retry after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BuildError::Transient(_))
    }
}

/// Configuration problems, raised synchronously and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown model category: '{0}' (expected one of: small, medium, large)")]
    UnknownModelCategory(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
