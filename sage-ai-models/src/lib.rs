//! # sage-ai-models
//!
//! Model boundaries for the sage-ai knowledge assistant: local text embeddings
//! via FastEmbed ONNX models, and prompt completions via an Ollama-compatible
//! HTTP endpoint. Designed for async operation with trait seams so the rest of
//! the system can swap in stubs for testing.
//!
//! ## Features
//!
//! - **Local ONNX Embeddings**: Run embedding models locally without external API calls
//! - **Async-First Design**: Full async/await support with tokio integration
//! - **Model Caching**: Process-wide caching to avoid reloading models
//! - **Half-Precision**: Memory-efficient f16 embeddings
//! - **Local Completions**: Talks to Ollama (or anything speaking its API) for
//!   categorization and answer generation
//!
//! ## Quick Start
//!
//! ```no_run
//! use sage_ai_models::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let batch = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", batch.len(), batch.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Configuration for embedding models and the completion endpoint
//! - [`provider`]: [`EmbeddingProvider`] trait and the FastEmbed implementation
//! - [`completion`]: [`LanguageModel`] trait and the Ollama client
//! - [`error`]: Error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`ModelError`] type.
//! Callers decide retry and degradation policy; this crate only reports what
//! failed and why.

pub mod completion;
pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use completion::{LanguageModel, OllamaClient};
pub use config::{CompletionConfig, EmbedConfig};
pub use error::{ModelError, Result};
pub use provider::{EmbeddingBatch, EmbeddingProvider, FastEmbedProvider};
