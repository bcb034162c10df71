//! Feedback/learning loop.
//!
//! Users react to a prior turn with one of three verdicts. `correct`
//! endorses the chunks that produced the answer, `incorrect` demerits
//! them, and `improve` turns the correction text into new knowledge at
//! user-corrected trust. Existing chunks are never rewritten in place:
//! a correction is a new chunk that supersedes the old one and outranks
//! it on future queries. Every submission also lands in an immutable
//! audit log that retrieval never consults.

use std::sync::Arc;

use sage_ai_context::TextChunker;
use sage_ai_models::EmbeddingProvider;
use tracing::{info, warn};

use crate::config::ChunkingConfig;
use crate::enrich::Enricher;
use crate::error::{KnowledgeError, Result};
use crate::store::{
    Chunk, ChunkId, FeedbackKind, FeedbackRecord, KnowledgeStore, TrustLevel, Turn,
};

/// Applies user corrections to the knowledge store.
pub struct FeedbackLoop {
    store: KnowledgeStore,
    enricher: Arc<Enricher>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    chunking: ChunkingConfig,
}

impl FeedbackLoop {
    pub fn new(
        store: KnowledgeStore,
        enricher: Arc<Enricher>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            enricher,
            embeddings,
            chunking,
        }
    }

    /// Record feedback against a prior turn and apply its effect.
    ///
    /// `correction_text` is required for `improve` and ignored otherwise.
    /// Returns the immutable audit record.
    pub async fn submit(
        &self,
        turn_id: i64,
        kind: FeedbackKind,
        correction_text: Option<String>,
    ) -> Result<FeedbackRecord> {
        let turn = self
            .store
            .get_turn(turn_id)
            .await?
            .ok_or(KnowledgeError::TurnNotFound { turn_id })?;

        let produced = match kind {
            FeedbackKind::Correct => {
                self.store.add_endorsements(&turn.chunk_ids).await?;
                info!(
                    turn_id,
                    chunks = turn.chunk_ids.len(),
                    "endorsed chunks used by turn"
                );
                Vec::new()
            }
            FeedbackKind::Incorrect => {
                self.store.add_demerits(&turn.chunk_ids).await?;
                info!(
                    turn_id,
                    chunks = turn.chunk_ids.len(),
                    "demerited chunks used by turn"
                );
                Vec::new()
            }
            FeedbackKind::Improve => {
                let text = correction_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        KnowledgeError::invalid_feedback("improve feedback requires correction text")
                    })?;
                self.store_correction(&turn, text).await?
            }
        };

        self.store
            .insert_feedback(turn_id, kind, correction_text.as_deref(), &produced)
            .await
    }

    /// Recent audit entries, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        self.store.feedback_history(limit).await
    }

    /// Run the correction through the regular ingestion steps (chunk,
    /// enrich best-effort, embed best-effort) and store it at
    /// user-corrected trust, superseding the turn's top chunk.
    async fn store_correction(&self, turn: &Turn, text: &str) -> Result<Vec<ChunkId>> {
        let source = format!("feedback:turn:{}", turn.id);
        let chunker = TextChunker::new(
            source.as_str(),
            self.chunking.max_tokens,
            self.chunking.overlap_tokens,
        );
        let pieces = chunker.chunk(text);
        if pieces.is_empty() {
            return Err(KnowledgeError::invalid_feedback(
                "correction text produced no chunks",
            ));
        }

        let superseded = turn.chunk_ids.first().cloned();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let mut chunk = Chunk::new(source.as_str(), piece.sequence, piece.text);
            chunk.supersedes = superseded.clone();
            chunk = self.enricher.enrich_or_raw(chunk).await;
            // Corrections always land at the top of the trust ladder,
            // whatever the enrichment pass did.
            chunk.trust_level = TrustLevel::UserCorrected;
            chunks.push(chunk);
        }

        if let Some(embeddings) = &self.embeddings {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            match embeddings.embed_texts(&texts).await {
                Ok(batch) => {
                    for (chunk, vector) in chunks.iter_mut().zip(batch.vectors) {
                        chunk.embedding = Some(vector);
                    }
                }
                Err(e) => warn!("storing correction without embeddings: {e}"),
            }
        }

        self.store.upsert_chunks(&chunks).await?;
        info!(
            turn_id = turn.id,
            chunks = chunks.len(),
            "stored correction at user-corrected trust"
        );
        Ok(chunks.iter().map(|c| c.id.clone()).collect())
    }
}
