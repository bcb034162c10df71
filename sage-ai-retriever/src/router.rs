//! Multi-stage retrieval routing.
//!
//! `resolve` turns a query into a budgeted, ranked context window in four
//! fixed stages:
//!
//! 1. metadata scan, when the query names a known category or tag
//! 2. semantic similarity search, always attempted, narrowed by stage 1
//!    only when stage 1 actually matched something
//! 3. merge and re-rank by a composite of similarity, trust, recency,
//!    and accumulated feedback
//! 4. greedy truncation to the configured token budget
//!
//! The router is a read-only consumer of the store: it never writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use half::f16;
use sage_ai_models::EmbeddingProvider;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::{KnowledgeError, Result};
use crate::store::{Chunk, ChunkId, KnowledgeStore, MetadataFilter};

/// Query-embedding retries before falling back to metadata-only results.
const EMBED_RETRIES: usize = 2;
const EMBED_BACKOFF_MS: u64 = 250;

/// Synonyms that map query words onto the built-in categories.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "experience",
        &["experience", "job", "work", "worked", "career", "employer", "company", "role"],
    ),
    (
        "education",
        &["education", "school", "degree", "university", "college", "studied", "course"],
    ),
    (
        "skills",
        &["skill", "skills", "technology", "technologies", "framework", "stack", "tools"],
    ),
    (
        "projects",
        &["project", "projects", "built", "portfolio", "repository", "prototype"],
    ),
    (
        "contact",
        &["contact", "email", "phone", "address", "reach", "linkedin"],
    ),
    ("notes", &["note", "notes", "journal", "reminder", "idea"]),
];

/// Topic terms extracted from a query, computed once per resolve and
/// threaded through both retrieval stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteHint {
    /// The query named no known category or tag.
    None,
    /// The query named these categories/tags.
    Category(BTreeSet<String>),
}

impl RouteHint {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Filter restricting a store scan to the hinted topic terms.
    fn to_filter(&self) -> Option<MetadataFilter> {
        match self {
            Self::None => None,
            Self::Category(terms) => Some(MetadataFilter {
                categories: terms.clone(),
                tags: terms.clone(),
                ..MetadataFilter::default()
            }),
        }
    }
}

/// One ranked retrieval result.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Composite ranking score; see [`RetrievalRouter::composite_score`].
    pub score: f32,
    /// Cosine similarity from the semantic stage, absent for chunks only
    /// the metadata stage found.
    pub similarity: Option<f32>,
}

/// The context window `resolve` hands to the conversation layer.
#[derive(Debug, Clone)]
pub struct RoutedContext {
    /// Budgeted results, best first.
    pub chunks: Vec<ScoredChunk>,
    pub hint: RouteHint,
    /// True when the semantic stage was skipped because the embedding
    /// service was unavailable.
    pub degraded: bool,
    /// Distinct chunks matched across both stages before the budget cut.
    pub total_matched: usize,
}

impl RoutedContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|s| s.chunk.id.clone()).collect()
    }

    /// Total estimated tokens across the returned chunk texts.
    pub fn token_total(&self) -> usize {
        self.chunks.iter().map(|s| s.chunk.token_estimate()).sum()
    }
}

/// Decides which retrieval strategies to run for a query and merges
/// their results into one ranked, budgeted context.
pub struct RetrievalRouter {
    store: KnowledgeStore,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RetrievalRouter {
    pub fn new(
        store: KnowledgeStore,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Extract topic terms by matching query words against the built-in
    /// category synonyms plus whatever categories and tags the store
    /// currently holds.
    pub async fn hint_for(&self, query: &str) -> Result<RouteHint> {
        let query_lower = query.to_lowercase();
        let words: BTreeSet<String> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let mut terms = BTreeSet::new();
        for (category, keywords) in CATEGORY_KEYWORDS {
            if keywords.iter().any(|k| words.contains(*k)) {
                terms.insert((*category).to_string());
            }
        }
        for category in self.store.distinct_categories().await? {
            if term_in_query(&query_lower, &words, &category) {
                terms.insert(category);
            }
        }
        for tag in self.store.distinct_tags().await? {
            if term_in_query(&query_lower, &words, &tag) {
                terms.insert(tag);
            }
        }

        if terms.is_empty() {
            Ok(RouteHint::None)
        } else {
            Ok(RouteHint::Category(terms))
        }
    }

    /// Run the full pipeline for one query.
    pub async fn resolve(&self, query: &str) -> Result<RoutedContext> {
        let hint = self.hint_for(query).await?;
        debug!(?hint, "routing query");

        let metadata_hits = match hint.to_filter() {
            Some(filter) => self.store.query_by_metadata(&filter).await?,
            None => Vec::new(),
        };

        let mut degraded = false;
        let semantic_hits = match self.embed_query(query).await {
            Ok(embedding) => {
                // Narrowing, not replacing: only restrict the semantic
                // stage when the metadata stage found something.
                let filter = if metadata_hits.is_empty() {
                    None
                } else {
                    hint.to_filter()
                };
                self.store
                    .similarity_search(&embedding, self.config.semantic_k, filter.as_ref())
                    .await?
            }
            Err(e) => {
                warn!("query embedding unavailable, metadata-only retrieval: {e}");
                degraded = true;
                Vec::new()
            }
        };

        let mut merged: BTreeMap<ChunkId, ScoredChunk> = BTreeMap::new();
        for chunk in metadata_hits {
            merged.insert(
                chunk.id.clone(),
                ScoredChunk {
                    score: 0.0,
                    similarity: None,
                    chunk,
                },
            );
        }
        for (chunk, similarity) in semantic_hits {
            merged
                .entry(chunk.id.clone())
                .and_modify(|scored| scored.similarity = Some(similarity))
                .or_insert(ScoredChunk {
                    score: 0.0,
                    similarity: Some(similarity),
                    chunk,
                });
        }
        let total_matched = merged.len();

        let now = Utc::now();
        let mut ranked: Vec<ScoredChunk> = merged.into_values().collect();
        for scored in &mut ranked {
            scored.score = self.composite_score(&scored.chunk, scored.similarity, now);
        }
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        let mut chunks = Vec::new();
        let mut spent = 0usize;
        for scored in ranked {
            let cost = scored.chunk.token_estimate();
            if spent + cost > self.config.token_budget {
                break;
            }
            spent += cost;
            chunks.push(scored);
        }

        debug!(
            returned = chunks.len(),
            total_matched, degraded, tokens = spent,
            "query resolved"
        );
        Ok(RoutedContext {
            chunks,
            hint,
            degraded,
            total_matched,
        })
    }

    /// Weighted blend of similarity, trust, recency, and feedback counters.
    /// Chunks only the metadata stage found contribute 0 similarity.
    fn composite_score(&self, chunk: &Chunk, similarity: Option<f32>, now: DateTime<Utc>) -> f32 {
        let weights = &self.config.weights;
        let age_days = (now - chunk.created_at).num_seconds().max(0) as f32 / 86_400.0;
        let half_life = weights.recency_half_life_days.max(f32::EPSILON);
        let recency = 0.5f32.powf(age_days / half_life);

        weights.similarity * similarity.unwrap_or(0.0)
            + weights.trust * chunk.trust_level.score()
            + weights.recency * recency
            + weights.endorsement * chunk.endorsements as f32
            - weights.demerit * chunk.demerits as f32
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f16>> {
        let mut attempt = 0;
        loop {
            match self.embeddings.embed_text(query).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt < EMBED_RETRIES => {
                    let delay = Duration::from_millis(EMBED_BACKOFF_MS * (1 << attempt));
                    debug!(
                        "query embedding attempt {} failed, retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(KnowledgeError::embedding_unavailable(e)),
            }
        }
    }
}

/// Multi-token terms (e.g. `payment-gateway`) are substring-matched on
/// the whole query; single tokens must appear as a whole word.
fn term_in_query(query_lower: &str, words: &BTreeSet<String>, term: &str) -> bool {
    let term_lower = term.to_lowercase();
    if term_lower.chars().any(|c| !c.is_alphanumeric()) {
        query_lower.contains(&term_lower)
    } else {
        words.contains(&term_lower)
    }
}
