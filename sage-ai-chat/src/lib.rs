//! # sage-ai-chat
//!
//! Conversational front end for the sage-ai personal knowledge store.
//! Questions are routed through [`sage_ai_retriever`]'s metadata and
//! semantic retrieval, answered by a local language model, and recorded
//! as conversation turns the user can react to with feedback.
//!
//! ## Features
//!
//! - **Grounded answers**: every reply cites chunks from the knowledge store
//! - **Serialized sessions**: turns within a session never interleave
//! - **Graceful degradation**: missing models produce flagged fallback
//!   replies, never crashes
//! - **Feedback loop**: `correct` / `improve` / `incorrect` reactions feed
//!   retrieval ranking
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use sage_ai_chat::ChatService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = ChatService::create(Path::new(".")).await?;
//! let outcome = service.ask("cli", "Where did I work in 2022?").await?;
//! println!("[turn {}] {}", outcome.turn_id, outcome.response);
//! # Ok(())
//! # }
//! ```

pub mod conversation;
pub mod prompt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sage_ai_models::{
    EmbeddingBatch, EmbeddingProvider, FastEmbedProvider, LanguageModel, ModelError, OllamaClient,
};
use sage_ai_retriever::config::KnowledgeConfig;
use sage_ai_retriever::enrich::Enricher;
use sage_ai_retriever::error::{KnowledgeError, Result};
use sage_ai_retriever::feedback::FeedbackLoop;
use sage_ai_retriever::router::RetrievalRouter;
use sage_ai_retriever::store::{FeedbackKind, FeedbackRecord, KnowledgeStore};
use tracing::{info, warn};

pub use conversation::{ConversationManager, TurnOutcome};

/// Stands in when the embedding model cannot be loaded; the router then
/// serves metadata-only results flagged as degraded.
struct UnavailableEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed_texts(&self, _texts: &[String]) -> sage_ai_models::Result<EmbeddingBatch> {
        Err(ModelError::embedding_gen(anyhow::anyhow!(
            "embedding model unavailable"
        )))
    }

    fn dimension(&self) -> usize {
        0
    }

    fn provider_name(&self) -> &str {
        "unavailable"
    }
}

/// Everything the chat CLI needs, wired from one base directory.
pub struct ChatService {
    base_dir: PathBuf,
    config: KnowledgeConfig,
    store: KnowledgeStore,
    manager: ConversationManager,
    feedback: FeedbackLoop,
}

impl ChatService {
    /// Open the store under `base_dir` and wire the conversation pipeline
    /// from its `sage.toml`. A missing embedding model degrades retrieval
    /// to metadata-only; a missing completion endpoint is an error only
    /// once a message is actually sent.
    pub async fn create(base_dir: &Path) -> Result<Self> {
        let config = KnowledgeConfig::discover(base_dir)?;
        let store = KnowledgeStore::open(base_dir).await?;

        let client = OllamaClient::new(config.language_model.completion_config())
            .map_err(KnowledgeError::language_model)?;
        let model: Arc<dyn LanguageModel> = Arc::new(client);

        let embeddings: Arc<dyn EmbeddingProvider> =
            match FastEmbedProvider::create(config.embedding.clone()).await {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    warn!("embedding model unavailable, retrieval degrades to metadata-only: {e}");
                    Arc::new(UnavailableEmbedder)
                }
            };

        let router = RetrievalRouter::new(
            store.clone(),
            embeddings.clone(),
            config.retrieval.clone(),
        );
        let manager = ConversationManager::new(
            store.clone(),
            router,
            model.clone(),
            config.chat.clone(),
            config.language_model.clone(),
        );
        let enricher = Arc::new(Enricher::new(model, config.enrichment.clone()));
        let feedback = FeedbackLoop::new(
            store.clone(),
            enricher,
            Some(embeddings),
            config.chunking,
        );

        info!(base_dir = %base_dir.display(), "chat service ready");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            config,
            store,
            manager,
            feedback,
        })
    }

    /// Assemble a service from prebuilt components. Used by tests and by
    /// embedders of the library that wire their own models.
    pub fn with_components(
        base_dir: &Path,
        config: KnowledgeConfig,
        store: KnowledgeStore,
        manager: ConversationManager,
        feedback: FeedbackLoop,
    ) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            config,
            store,
            manager,
            feedback,
        }
    }

    /// One question/answer turn in `session_id`.
    pub async fn ask(&self, session_id: &str, message: &str) -> Result<TurnOutcome> {
        self.manager.send_message(session_id, message).await
    }

    /// React to a prior turn; see [`FeedbackLoop::submit`].
    pub async fn feedback(
        &self,
        turn_id: i64,
        kind: FeedbackKind,
        correction_text: Option<String>,
    ) -> Result<FeedbackRecord> {
        self.feedback.submit(turn_id, kind, correction_text).await
    }

    pub async fn summary(&self, session_id: &str) -> Result<String> {
        self.manager.session_summary(session_id).await
    }

    pub async fn export(&self, session_id: &str) -> Result<String> {
        self.manager.export_session(session_id).await
    }

    pub async fn clear(&self, session_id: &str) -> Result<usize> {
        self.manager.clear_session(session_id).await
    }

    /// Human-readable status report: store health, contents, and the
    /// configured models.
    pub async fn status(&self) -> Result<String> {
        let db_path = KnowledgeStore::database_path(&self.base_dir);
        let db_exists = db_path.exists();

        let mut status = format!(
            "Sage AI Chat Status\n\
             ===================\n\
             Version: {}\n\
             Base Directory: {}\n\n",
            env!("CARGO_PKG_VERSION"),
            self.base_dir.display()
        );

        status.push_str("Knowledge Store\n---------------\n");
        status.push_str(&format!(
            "Database: {}\nLocation: {}\n",
            if db_exists { "✓ Found" } else { "✗ Missing" },
            db_path.display()
        ));
        let stats = self.store.get_statistics().await?;
        status.push_str(&format!(
            "Chunks: {} total, {} embedded\n",
            stats.total_chunks, stats.embedded_chunks
        ));
        if let Some(dimension) = stats.embedding_dimension {
            status.push_str(&format!("Embedding dimension: {dimension}\n"));
        }
        status.push_str(&format!(
            "Sessions: {}, Turns: {}, Feedback entries: {}\n",
            stats.total_sessions, stats.total_turns, stats.feedback_entries
        ));
        for (level, count) in &stats.trust_breakdown {
            status.push_str(&format!("Trust {level}: {count}\n"));
        }
        status.push('\n');

        status.push_str("Models\n------\n");
        status.push_str(&format!(
            "Completion endpoint: {} (model {})\n",
            self.config.language_model.base_url, self.config.language_model.model
        ));
        status.push_str(&format!(
            "Embedding model: {}\n\n",
            self.config.embedding.model_name
        ));

        status.push_str("Conversation\n------------\n");
        status.push_str(&format!(
            "Max history turns: {}\n",
            self.config.chat.max_history_turns
        ));
        status.push_str(&format!(
            "System prompt: {}\n",
            if self.config.chat.system_prompt.is_some() {
                "custom"
            } else {
                "default"
            }
        ));

        Ok(status)
    }
}
