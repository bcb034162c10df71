//! Conversation manager: one serialized dialogue per session.
//!
//! Sessions run concurrently, but turns within a session are strictly
//! ordered by a per-session async mutex so history reads and turn
//! appends never interleave. A turn always produces a stored Turn row,
//! even when retrieval or the language model degrade; the only errors
//! that escape are store failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sage_ai_models::LanguageModel;
use sage_ai_retriever::config::{ChatConfig, LanguageModelConfig};
use sage_ai_retriever::error::{KnowledgeError, Result};
use sage_ai_retriever::router::{RetrievalRouter, RoutedContext};
use sage_ai_retriever::store::{KnowledgeStore, Turn};
use tracing::{info, warn};

use crate::prompt;

/// What a completed turn hands back to the caller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: i64,
    pub session_id: String,
    pub response: String,
    /// The retrieval context the response was grounded on.
    pub context: RoutedContext,
    /// True when retrieval ran metadata-only or the model was replaced
    /// by the canned fallback.
    pub degraded: bool,
}

pub struct ConversationManager {
    store: KnowledgeStore,
    router: RetrievalRouter,
    model: Arc<dyn LanguageModel>,
    chat: ChatConfig,
    language_model: LanguageModelConfig,
    /// One ticket per session; turns queue behind it.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(
        store: KnowledgeStore,
        router: RetrievalRouter,
        model: Arc<dyn LanguageModel>,
        chat: ChatConfig,
        language_model: LanguageModelConfig,
    ) -> Self {
        Self {
            store,
            router,
            model,
            chat,
            language_model,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one full turn: retrieve context, assemble the prompt, complete
    /// with bounded retries, and append the Turn before releasing the
    /// session lock. Model failure degrades to a canned fallback reply
    /// rather than an error.
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<TurnOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let context = self.router.resolve(message).await?;
        let history = self
            .store
            .recent_turns(session_id, self.chat.max_history_turns)
            .await?;
        let prompt = prompt::build_prompt(
            self.chat.system_prompt.as_deref(),
            &context,
            &history,
            message,
        );

        let (response, model_failed) = match self.complete_with_retries(&prompt).await {
            Ok(response) => (response, false),
            Err(e) => {
                warn!(session_id, "language model unavailable, sending fallback reply: {e}");
                (prompt::degraded_response(&context), true)
            }
        };
        let degraded = context.degraded || model_failed;

        let turn_id = self
            .store
            .append_turn(session_id, message, &response, &context.chunk_ids(), degraded)
            .await?;
        info!(
            session_id,
            turn_id,
            degraded,
            chunks = context.chunks.len(),
            "recorded turn"
        );

        Ok(TurnOutcome {
            turn_id,
            session_id: session_id.to_string(),
            response,
            context,
            degraded,
        })
    }

    /// One-paragraph model summary of a whole session. Falls back to a
    /// plain turn count when the model is unreachable.
    pub async fn session_summary(&self, session_id: &str) -> Result<String> {
        let turns = self.store.session_turns(session_id).await?;
        if turns.is_empty() {
            return Ok(format!("No turns recorded for session '{session_id}'."));
        }
        let prompt = prompt::build_summary_prompt(&turns);
        match self.complete_with_retries(&prompt).await {
            Ok(summary) => Ok(summary.trim().to_string()),
            Err(e) => {
                warn!(session_id, "summary generation failed: {e}");
                Ok(format!(
                    "{} turns recorded between {} and {}. The language model could not \
                     be reached to write a summary.",
                    turns.len(),
                    turns[0].created_at.format("%Y-%m-%d %H:%M"),
                    turns[turns.len() - 1].created_at.format("%Y-%m-%d %H:%M"),
                ))
            }
        }
    }

    /// All turns of a session as pretty-printed JSON.
    pub async fn export_session(&self, session_id: &str) -> Result<String> {
        let turns = self.store.session_turns(session_id).await?;
        Ok(serde_json::to_string_pretty(&turns)?)
    }

    /// Delete a session's turns (and their feedback rows via cascade)
    /// and retire its lock entry. Chunks created from feedback stay in
    /// the knowledge store.
    pub async fn clear_session(&self, session_id: &str) -> Result<usize> {
        let removed = self.store.clear_session(session_id).await?;
        {
            // A turn still in flight holds a clone of the ticket; only
            // idle entries are dropped.
            let mut locks = self.locks.lock().unwrap();
            let idle = locks
                .get(session_id)
                .is_some_and(|ticket| Arc::strong_count(ticket) == 1);
            if idle {
                locks.remove(session_id);
            }
        }
        info!(session_id, removed, "cleared session history");
        Ok(removed)
    }

    /// Turns of a session in chronological order.
    pub async fn session_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.store.session_turns(session_id).await
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn complete_with_retries(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.model.complete(prompt).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.language_model.max_retries => {
                    let delay = self.language_model.backoff_ms * (1 << attempt);
                    warn!(
                        "completion attempt {} failed, retrying in {delay}ms: {e}",
                        attempt + 1
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(KnowledgeError::language_model(e)),
            }
        }
    }
}
