//! End-to-end retrieval scenarios: ingest personal documents, route a
//! question, record a conversation turn, apply feedback, and watch the
//! correction win the re-query.
//!
//! The language model is canned and embeddings are a deterministic
//! bag-of-words stub, so every run behaves the same with no network.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use half::f16;
use sage_ai_models::{EmbeddingBatch, EmbeddingProvider, LanguageModel, ModelError};
use sage_ai_retriever::config::{ChunkingConfig, EnrichmentConfig, RetrievalConfig};
use sage_ai_retriever::enrich::Enricher;
use sage_ai_retriever::feedback::FeedbackLoop;
use sage_ai_retriever::router::{RetrievalRouter, RouteHint};
use sage_ai_retriever::store::{FeedbackKind, KnowledgeStore, TrustLevel};
use tempfile::tempdir;

/// Replays queued completions in order; panics if the queue runs dry,
/// which would mean the scenario made an unplanned model call.
struct CannedModel {
    replies: Mutex<VecDeque<String>>,
}

impl CannedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, _prompt: &str) -> sage_ai_models::Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::completion("canned replies exhausted"))
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

struct BagEmbedder;

fn bag_vector(text: &str) -> Vec<f16> {
    let mut buckets = [0f32; 16];
    for word in text.to_lowercase().split_whitespace() {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        buckets[(hasher.finish() % 16) as usize] += 1.0;
    }
    buckets.iter().map(|&b| f16::from_f32(b)).collect()
}

#[async_trait::async_trait]
impl EmbeddingProvider for BagEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> sage_ai_models::Result<EmbeddingBatch> {
        Ok(EmbeddingBatch::new(
            texts.iter().map(|t| bag_vector(t)).collect(),
        ))
    }

    fn dimension(&self) -> usize {
        16
    }

    fn provider_name(&self) -> &str {
        "bag-of-words"
    }
}

/// Always fails, simulating a missing local embedding model.
struct DownEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed_texts(&self, _: &[String]) -> sage_ai_models::Result<EmbeddingBatch> {
        Err(ModelError::embedding_gen(anyhow::anyhow!(
            "model not downloaded"
        )))
    }

    fn dimension(&self) -> usize {
        16
    }

    fn provider_name(&self) -> &str {
        "down"
    }
}

const CV_TEXT: &str = "I worked at Acme Corp as a senior engineer on the payment gateway.";
const RECIPE_TEXT: &str = "Grandma's lasagna recipe needs ricotta, basil and patience.";
const CORRECTION_TEXT: &str =
    "I left Acme in 2023 and now work at Beta Inc as a staff engineer on payments.";

async fn seed_store(store: &KnowledgeStore, embed: bool) -> Result<()> {
    let model = CannedModel::new(&[
        r#"{"category": "experience", "tags": ["acme", "payments"], "confidence": 0.9}"#,
        r#"{"category": "notes", "tags": ["cooking"], "confidence": 0.8}"#,
    ]);
    let enricher = Enricher::new(model, EnrichmentConfig::default());

    let mut chunks = Vec::new();
    for (source, text) in [("cv.md", CV_TEXT), ("recipes.md", RECIPE_TEXT)] {
        let chunk = sage_ai_retriever::store::Chunk::new(source, 0, text);
        let mut chunk = enricher.enrich(chunk).await?;
        if embed {
            chunk.embedding = Some(bag_vector(&chunk.text));
        }
        chunks.push(chunk);
    }
    store.upsert_chunks(&chunks).await?;
    Ok(())
}

/// A question about work routes to the experience category and returns
/// the CV chunk first.
#[tokio::test]
async fn test_question_routes_to_experience_chunk() -> Result<()> {
    let store = KnowledgeStore::open_memory().await?;
    seed_store(&store, true).await?;

    let router = RetrievalRouter::new(
        store.clone(),
        Arc::new(BagEmbedder),
        RetrievalConfig::default(),
    );
    let context = router.resolve("Tell me about my last job at Acme").await?;

    assert!(matches!(context.hint, RouteHint::Category(_)));
    assert!(!context.degraded);
    assert!(!context.is_empty());
    let top = &context.chunks[0];
    assert_eq!(top.chunk.category.as_deref(), Some("experience"));
    assert!(top.chunk.text.contains("Acme"));
    assert!(top.similarity.is_some(), "semantic stage should have run");
    Ok(())
}

/// The full learning loop: answer a question, file an improvement, and
/// see the user-corrected chunk outrank the original afterwards.
#[tokio::test]
async fn test_improvement_feedback_wins_the_requery() -> Result<()> {
    let store = KnowledgeStore::open_memory().await?;
    seed_store(&store, true).await?;

    let router = RetrievalRouter::new(
        store.clone(),
        Arc::new(BagEmbedder),
        RetrievalConfig::default(),
    );
    let first = router.resolve("What was my job at Acme?").await?;
    let original_id = first.chunks[0].chunk.id.clone();

    // Record the turn the user is about to react to.
    let turn_id = store
        .append_turn(
            "cli",
            "What was my job at Acme?",
            "You worked at Acme Corp as a senior engineer.",
            &first.chunk_ids(),
            false,
        )
        .await?;

    // The correction is enriched like any other chunk, then pinned to
    // user-corrected trust.
    let correction_enricher = Arc::new(Enricher::new(
        CannedModel::new(&[
            r#"{"category": "experience", "tags": ["beta", "payments"], "confidence": 0.95}"#,
        ]),
        EnrichmentConfig::default(),
    ));
    let feedback = FeedbackLoop::new(
        store.clone(),
        correction_enricher,
        Some(Arc::new(BagEmbedder)),
        ChunkingConfig::default(),
    );
    let record = feedback
        .submit(
            turn_id,
            FeedbackKind::Improve,
            Some(CORRECTION_TEXT.to_string()),
        )
        .await?;
    assert_eq!(record.produced_chunk_ids.len(), 1);

    let second = router.resolve("Where do I work now?").await?;
    let top = &second.chunks[0];
    assert_eq!(top.chunk.trust_level, TrustLevel::UserCorrected);
    assert!(top.chunk.text.contains("Beta Inc"));
    assert_eq!(top.chunk.supersedes.as_deref(), Some(original_id.as_str()));

    // The superseded original is still stored, just outranked.
    let ids: Vec<_> = second.chunks.iter().map(|c| c.chunk.id.clone()).collect();
    assert!(ids.contains(&original_id));
    Ok(())
}

/// Correct and incorrect feedback adjust the counters that feed ranking.
#[tokio::test]
async fn test_feedback_counters_accumulate() -> Result<()> {
    let store = KnowledgeStore::open_memory().await?;
    seed_store(&store, true).await?;

    let router = RetrievalRouter::new(
        store.clone(),
        Arc::new(BagEmbedder),
        RetrievalConfig::default(),
    );
    let context = router.resolve("Tell me about my work at Acme").await?;
    let chunk_id = context.chunks[0].chunk.id.clone();

    let turn_id = store
        .append_turn("cli", "q", "a", &[chunk_id.clone()], false)
        .await?;

    let feedback = FeedbackLoop::new(
        store.clone(),
        Arc::new(Enricher::new(
            CannedModel::new(&[]),
            EnrichmentConfig {
                enabled: false,
                max_retries: 0,
                backoff_ms: 1,
            },
        )),
        None,
        ChunkingConfig::default(),
    );
    feedback.submit(turn_id, FeedbackKind::Correct, None).await?;
    feedback
        .submit(turn_id, FeedbackKind::Incorrect, None)
        .await?;
    feedback
        .submit(turn_id, FeedbackKind::Incorrect, None)
        .await?;

    let chunk = store.get_chunk(&chunk_id).await?.expect("chunk exists");
    assert_eq!(chunk.endorsements, 1);
    assert_eq!(chunk.demerits, 2);

    let history = feedback.history(10).await?;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].kind, FeedbackKind::Incorrect);
    Ok(())
}

/// A dead embedding model degrades retrieval to metadata-only results
/// instead of failing the query.
#[tokio::test]
async fn test_embedding_outage_degrades_to_metadata_only() -> Result<()> {
    let store = KnowledgeStore::open_memory().await?;
    seed_store(&store, true).await?;

    let router = RetrievalRouter::new(
        store.clone(),
        Arc::new(DownEmbedder),
        RetrievalConfig::default(),
    );

    let context = router.resolve("Tell me about my job history").await?;
    assert!(context.degraded);
    assert!(!context.is_empty(), "metadata route should still answer");
    for scored in &context.chunks {
        assert_eq!(scored.chunk.category.as_deref(), Some("experience"));
        assert!(scored.similarity.is_none());
    }

    // No hint and no embeddings: an empty result, not an error.
    let nothing = router.resolve("zyxw qvut").await?;
    assert!(nothing.degraded);
    assert!(nothing.is_empty());
    Ok(())
}

/// The same pipeline works against an on-disk store across reopen.
#[tokio::test]
async fn test_feedback_survives_reopen() -> Result<()> {
    let temp_dir = tempdir()?;

    let original_id = {
        let store = KnowledgeStore::open(temp_dir.path()).await?;
        seed_store(&store, true).await?;
        let router = RetrievalRouter::new(
            store.clone(),
            Arc::new(BagEmbedder),
            RetrievalConfig::default(),
        );
        let context = router.resolve("What was my job at Acme?").await?;
        let turn_id = store
            .append_turn("cli", "q", "a", &context.chunk_ids(), false)
            .await?;

        let feedback = FeedbackLoop::new(
            store.clone(),
            Arc::new(Enricher::new(
                CannedModel::new(&[
                    r#"{"category": "experience", "tags": ["beta"], "confidence": 0.9}"#,
                ]),
                EnrichmentConfig::default(),
            )),
            Some(Arc::new(BagEmbedder)),
            ChunkingConfig::default(),
        );
        feedback
            .submit(
                turn_id,
                FeedbackKind::Improve,
                Some(CORRECTION_TEXT.to_string()),
            )
            .await?;
        context.chunks[0].chunk.id.clone()
    };

    let store = KnowledgeStore::open(temp_dir.path()).await?;
    let router = RetrievalRouter::new(
        store.clone(),
        Arc::new(BagEmbedder),
        RetrievalConfig::default(),
    );
    let context = router.resolve("Where do I work now?").await?;
    let top = &context.chunks[0];
    assert_eq!(top.chunk.trust_level, TrustLevel::UserCorrected);
    assert_eq!(top.chunk.supersedes.as_deref(), Some(original_id.as_str()));

    let stats = store.get_statistics().await?;
    assert_eq!(stats.feedback_entries, 1);
    assert_eq!(stats.total_turns, 1);
    Ok(())
}
