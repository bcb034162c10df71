//! LLM-backed metadata enrichment.
//!
//! A single completion call per chunk asks the language model for a
//! category, tags, and a confidence score as strict JSON. Enrichment is
//! best-effort by design: when the model is unreachable or replies with
//! garbage, the chunk is stored at raw trust instead of being dropped.

use std::sync::Arc;
use std::time::Duration;

use sage_ai_models::LanguageModel;
use serde::Deserialize;
use tracing::warn;

use crate::config::EnrichmentConfig;
use crate::error::{KnowledgeError, Result};
use crate::store::{Chunk, TrustLevel};

/// Categories the prompt steers the model toward. The list is guidance
/// rather than a schema; replies outside it are kept as-is.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "experience",
    "education",
    "skills",
    "projects",
    "contact",
    "notes",
];

#[derive(Debug, Deserialize)]
struct EnrichmentReply {
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    confidence: Option<f32>,
}

/// Adds category/tag metadata to chunks via the language model.
pub struct Enricher {
    model: Arc<dyn LanguageModel>,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(model: Arc<dyn LanguageModel>, config: EnrichmentConfig) -> Self {
        Self { model, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Categorize one chunk, promoting it to enriched trust.
    ///
    /// The chunk text is never altered; only `category`, `tags`, and
    /// `confidence` are merged in. The completion call is retried a
    /// bounded number of times with doubling backoff before this gives
    /// up with an enrichment error.
    pub async fn enrich(&self, mut chunk: Chunk) -> Result<Chunk> {
        let prompt = build_prompt(&chunk.text);
        let mut attempt = 0;
        let raw = loop {
            match self.model.complete(&prompt).await {
                Ok(raw) => break raw,
                Err(e) if attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(self.config.backoff_ms * (1 << attempt));
                    warn!(
                        "categorization attempt {} failed, retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(KnowledgeError::enrichment(e)),
            }
        };

        let reply = parse_reply(&raw)?;
        if let Some(category) = reply.category {
            let category = category.trim().to_lowercase();
            if !category.is_empty() {
                chunk.category = Some(category);
            }
        }
        for tag in reply.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() {
                chunk.tags.insert(tag);
            }
        }
        if let Some(confidence) = reply.confidence {
            chunk.confidence = Some(confidence.clamp(0.0, 1.0));
        }
        chunk.trust_level = chunk.trust_level.max(TrustLevel::Enriched);
        Ok(chunk)
    }

    /// Best-effort enrichment: on failure, or when enrichment is
    /// disabled, the chunk comes back unchanged at its current trust.
    pub async fn enrich_or_raw(&self, chunk: Chunk) -> Chunk {
        if !self.config.enabled {
            return chunk;
        }
        match self.enrich(chunk.clone()).await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(
                    "keeping chunk {} at {} trust: {}",
                    chunk.id, chunk.trust_level, e
                );
                chunk
            }
        }
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Categorize this personal knowledge snippet.\n\
         Respond with a single JSON object, no prose, shaped exactly like:\n\
         {{\"category\": \"...\", \"tags\": [\"...\"], \"confidence\": 0.0}}\n\n\
         Prefer one of these categories: {}.\n\
         Use at most five short lowercase tags. Confidence is your own\n\
         certainty in the category, between 0 and 1.\n\n\
         Snippet:\n{text}",
        KNOWN_CATEGORIES.join(", ")
    )
}

/// Accepts bare JSON or JSON wrapped in markdown code fences or prose by
/// slicing from the first `{` to the last `}`.
fn parse_reply(raw: &str) -> Result<EnrichmentReply> {
    let json = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(KnowledgeError::enrichment(anyhow::anyhow!(
                "no JSON object in categorization reply: {raw:?}"
            )));
        }
    };
    serde_json::from_str(json).map_err(|e| {
        KnowledgeError::enrichment(anyhow::anyhow!("malformed categorization reply: {e}"))
    })
}
