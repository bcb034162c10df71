//! Configuration for embedding and completion models

use crate::error::{ModelError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default embedding model, small enough to run on CPU without hurting chat latency
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm-l6-v2";

/// Default base URL for an Ollama-compatible completion endpoint
pub const DEFAULT_COMPLETION_URL: &str = "http://localhost:11434";

/// Default completion model name
pub const DEFAULT_COMPLETION_MODEL: &str = "llama3.2";

/// Configuration for embedding models
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    #[serde(alias = "model")]
    pub model_name: String,
    /// Directory for downloaded model files (fastembed picks its own default if unset)
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to normalize embeddings to unit length
    pub normalize: bool,
    /// Whether to show a progress bar while model files download
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a new embedding configuration for a named model
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the cache directory for downloaded model files (builder style)
    pub fn with_cache_dir<P: Into<PathBuf>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set whether to show download progress (builder style)
    pub fn with_download_progress(self, show_download_progress: bool) -> Self {
        Self {
            show_download_progress,
            ..self
        }
    }

    /// Get the configured model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolve the configured name to a fastembed built-in model
    pub fn embedding_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.as_str() {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            other => Err(ModelError::UnknownModel {
                name: other.to_string(),
            }),
        }
    }

    /// Expected embedding dimension for the configured model.
    ///
    /// Used before initialization; the real dimension is probed when the model loads.
    pub fn known_dimension(&self) -> usize {
        match self.model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            _ => 384,
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache_dir: None,
            batch_size: 16,
            normalize: true,
            show_download_progress: false,
        }
    }
}

/// Configuration for a local completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of the Ollama-compatible API
    pub base_url: String,
    /// Model to request completions from
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl CompletionConfig {
    /// Create a new completion configuration
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout in seconds (builder style)
    pub fn with_timeout_secs(self, timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            ..self
        }
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COMPLETION_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}
