//! Error types for the knowledge store and retrieval pipeline.
//!
//! Every error here is recoverable with a documented degraded behavior
//! except [`KnowledgeError::StoreCorruption`], which indicates the on-disk
//! store no longer upholds its invariants and should stop the process.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Errors produced by ingestion, storage, retrieval, and feedback.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// A file could not be read or decoded as text. The file is skipped;
    /// the surrounding ingestion batch continues.
    #[error("failed to extract text from {path}: {source}")]
    Extraction {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file extension is not one the extractor handles.
    #[error("unsupported file format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// The categorization call failed after retries. Callers keep the
    /// chunk at raw trust instead of dropping it.
    #[error("metadata enrichment failed: {source}")]
    Enrichment { source: anyhow::Error },

    /// The embedding service failed after retries. Retrieval degrades to
    /// metadata-only matching; ingestion stores chunks without vectors.
    #[error("embedding service unavailable: {source}")]
    EmbeddingUnavailable { source: anyhow::Error },

    /// The completion service failed after retries. The conversation
    /// layer answers with a canned degraded response.
    #[error("language model call failed: {source}")]
    LanguageModel { source: anyhow::Error },

    /// The store contents violate an invariant (embedding dimension
    /// mismatch, unknown trust level, malformed blob). Fatal.
    #[error("knowledge store corrupted: {detail}")]
    StoreCorruption { detail: String },

    /// Feedback referenced a turn that does not exist.
    #[error("turn {turn_id} not found")]
    TurnNotFound { turn_id: i64 },

    /// Feedback was malformed, e.g. `improve` without correction text.
    #[error("invalid feedback: {reason}")]
    InvalidFeedback { reason: String },

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KnowledgeError {
    pub fn extraction(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Extraction {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFormat { path: path.into() }
    }

    pub fn enrichment(source: impl Into<anyhow::Error>) -> Self {
        Self::Enrichment {
            source: source.into(),
        }
    }

    pub fn embedding_unavailable(source: impl Into<anyhow::Error>) -> Self {
        Self::EmbeddingUnavailable {
            source: source.into(),
        }
    }

    pub fn language_model(source: impl Into<anyhow::Error>) -> Self {
        Self::LanguageModel {
            source: source.into(),
        }
    }

    pub fn store_corruption(detail: impl Into<String>) -> Self {
        Self::StoreCorruption {
            detail: detail.into(),
        }
    }

    pub fn invalid_feedback(reason: impl Into<String>) -> Self {
        Self::InvalidFeedback {
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error should halt the process rather than degrade.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreCorruption { .. })
    }
}
