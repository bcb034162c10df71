//! sage-ai-retriever: personal knowledge store with learned retrieval
//!
//! This crate ingests personal documents and notes, enriches them with
//! model-generated metadata, and answers natural-language queries by
//! routing them through metadata and semantic search over a local
//! SQLite store. User feedback flows back into the store so retrieval
//! quality improves with use.
//!
//! ## Key Modules
//!
//! - **[`ingest`]**: Extraction, chunking, enrichment, and embedding pipeline
//! - **[`store`]**: SQLite-backed chunk, conversation, and feedback storage
//! - **[`router`]**: Query routing, ranking, and context budget assembly
//! - **[`feedback`]**: Turns user corrections into higher-trust chunks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use sage_ai_retriever::config::KnowledgeConfig;
//! use sage_ai_retriever::enrich::Enricher;
//! use sage_ai_retriever::extract::PlainTextExtractor;
//! use sage_ai_retriever::ingest::{IngestionConfig, IngestionEngine};
//! use sage_ai_retriever::store::KnowledgeStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let base = Path::new(".");
//! let config = KnowledgeConfig::discover(base)?;
//! let store = KnowledgeStore::open(base).await?;
//!
//! let model = sage_ai_models::OllamaClient::new(config.language_model.completion_config())?;
//! let enricher = Arc::new(Enricher::new(Arc::new(model), config.enrichment.clone()));
//! let engine = IngestionEngine::new(
//!     store,
//!     Arc::new(PlainTextExtractor::new()),
//!     enricher,
//!     None, // embeddings optional; ingestion degrades gracefully
//!     IngestionConfig::new().with_chunking(config.chunking),
//! );
//! engine.ingest_file(Path::new("cv.md")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files/Notes → Extractor → Chunker → Enricher → Embedder → SQLite Store
//!                                                               ↓
//!      Feedback Loop ← Conversation turns ← Retrieval Router ← Search
//! ```

pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod ingest;
pub mod router;
pub mod store;
