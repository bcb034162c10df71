//! Error types for model providers

use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur during embedding or completion operations
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Unknown embedding model name
    #[error("Unknown embedding model: {name}")]
    UnknownModel { name: String },

    /// Model initialization failed
    #[error("Failed to initialize model: {source}")]
    ModelInitialization { source: anyhow::Error },

    /// Embedding generation failed
    #[error("Failed to generate embeddings: {source}")]
    EmbeddingGeneration { source: anyhow::Error },

    /// Completion request was rejected or returned an unusable payload
    #[error("Completion request failed: {message}")]
    Completion { message: String },

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task error
    #[error("Async task error: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Create a model initialization error
    pub fn model_init(source: impl Into<anyhow::Error>) -> Self {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error
    pub fn embedding_gen(source: impl Into<anyhow::Error>) -> Self {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a completion error
    pub fn completion(message: impl Into<String>) -> Self {
        Self::Completion {
            message: message.into(),
        }
    }
}
