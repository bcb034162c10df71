//! SQLite-backed knowledge store.
//!
//! One database file (`.sage-ai.db` in the store's base directory) holds
//! every durable artifact of the pipeline: chunks with their embeddings
//! and metadata, conversation sessions and turns, and the append-only
//! feedback log. Embeddings are stored as little-endian f16 blobs and
//! compared by brute-force cosine similarity, which is plenty for a
//! personal corpus of a few thousand chunks.
//!
//! Invariants enforced here:
//! - a chunk's `trust_level` only moves forward, never backward
//! - the embedding dimension is constant across the store (recorded in
//!   `store_meta` on the first embedded write)
//! - turns and feedback records are append-only

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use half::f16;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};

use crate::error::{KnowledgeError, Result};

/// Database file name inside the store's base directory.
pub const DB_FILE_NAME: &str = ".sage-ai.db";

/// Stable content-addressed chunk identifier (hex blake3).
pub type ChunkId = String;

/// Provenance tier of a chunk, governing its priority at retrieval time.
///
/// The ladder only moves forward: once a chunk is `UserCorrected` no
/// later write can demote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Stored as chunked, no metadata pass.
    Raw = 0,
    /// Category/tags added by the language-model pass.
    Enriched = 1,
    /// Written or confirmed by the user through feedback.
    UserCorrected = 2,
}

impl TrustLevel {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Raw),
            1 => Some(Self::Enriched),
            2 => Some(Self::UserCorrected),
            _ => None,
        }
    }

    /// Stable lowercase name, used in statistics and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Enriched => "enriched",
            Self::UserCorrected => "user_corrected",
        }
    }

    /// Position on the trust ladder scaled to `[0, 1]` for ranking.
    pub fn score(&self) -> f32 {
        (*self as i64 as f32) / 2.0
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Unit of stored knowledge: a bounded segment of source text plus its
/// metadata and optional embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    /// Origin of the text, e.g. a file path, a timestamped
    /// `note:2026-08-26T09:14:03.181204`, or `feedback:turn:17`.
    pub source: String,
    /// Position of this chunk within its source (0-indexed).
    pub sequence: usize,
    pub text: String,
    /// Embedding of `text`, absent when the embedding service was
    /// unavailable at write time.
    pub embedding: Option<Vec<f16>>,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    /// Enricher's confidence in its categorization, in `[0, 1]`.
    pub confidence: Option<f32>,
    pub trust_level: TrustLevel,
    /// Times feedback confirmed an answer that used this chunk.
    pub endorsements: i64,
    /// Times feedback rejected an answer that used this chunk.
    pub demerits: i64,
    /// Chunk this one corrects, when produced by `improve` feedback.
    pub supersedes: Option<ChunkId>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a raw chunk with a content-addressed id.
    pub fn new(source: impl Into<String>, sequence: usize, text: impl Into<String>) -> Self {
        let source = source.into();
        let text = text.into();
        let id = Self::compute_id(&source, sequence, &text);
        Self {
            id,
            source,
            sequence,
            text,
            embedding: None,
            category: None,
            tags: BTreeSet::new(),
            confidence: None,
            trust_level: TrustLevel::Raw,
            endorsements: 0,
            demerits: 0,
            supersedes: None,
            created_at: Utc::now(),
        }
    }

    /// Content-addressed id, stable across re-ingestion of identical text.
    pub fn compute_id(source: &str, sequence: usize, text: &str) -> ChunkId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(sequence as u64).to_le_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Estimated token length of the chunk text.
    pub fn token_estimate(&self) -> usize {
        sage_ai_context::estimate_tokens(&self.text)
    }

    pub fn with_embedding(self, embedding: Vec<f16>) -> Self {
        Self {
            embedding: Some(embedding),
            ..self
        }
    }

    pub fn with_category(self, category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..self
        }
    }

    pub fn with_trust_level(self, trust_level: TrustLevel) -> Self {
        Self {
            trust_level,
            ..self
        }
    }
}

/// Filter over chunk metadata for scans and similarity pre-restriction.
///
/// `source` and `min_trust` are conjunctive. `categories` and `tags`
/// together form the topic terms: when either set is non-empty, a chunk
/// passes if its category is named or any of its tags is named. Terms
/// are compared case-sensitively; the enricher lowercases what it stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub source: Option<String>,
    pub categories: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub min_trust: Option<TrustLevel>,
    pub limit: Option<usize>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_min_trust(mut self, min_trust: TrustLevel) -> Self {
        self.min_trust = Some(min_trust);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the filter constrains anything at all.
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.categories.is_empty()
            && self.tags.is_empty()
            && self.min_trust.is_none()
            && self.limit.is_none()
    }

    /// Topic-term check: any-of across the category and tag sets.
    pub fn matches_topic(&self, chunk: &Chunk) -> bool {
        if self.categories.is_empty() && self.tags.is_empty() {
            return true;
        }
        if let Some(category) = &chunk.category {
            if self.categories.contains(category) {
                return true;
            }
        }
        !self.tags.is_disjoint(&chunk.tags)
    }
}

/// One user/assistant exchange within a session.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    pub user_message: String,
    pub assistant_response: String,
    /// Ids of the chunks the router supplied for this turn.
    pub chunk_ids: Vec<ChunkId>,
    /// Whether the answer was produced without full retrieval or without
    /// the language model.
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// What a piece of feedback says about a prior turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// The answer was right; endorse the chunks it used.
    Correct,
    /// The answer needs refinement; the correction text becomes new
    /// user-corrected knowledge.
    Improve,
    /// The answer was wrong; demerit the chunks it used.
    Incorrect,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Improve => "improve",
            Self::Incorrect => "incorrect",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "correct" => Ok(Self::Correct),
            "improve" => Ok(Self::Improve),
            "incorrect" => Ok(Self::Incorrect),
            other => Err(KnowledgeError::invalid_feedback(format!(
                "unknown feedback kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable correction linked to a prior turn.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub turn_id: i64,
    pub kind: FeedbackKind,
    pub correction_text: Option<String>,
    /// Chunks this feedback wrote, empty unless `kind` is `improve`.
    pub produced_chunk_ids: Vec<ChunkId>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatistics {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub embedding_dimension: Option<usize>,
    pub total_sessions: usize,
    pub total_turns: usize,
    pub feedback_entries: usize,
    pub sources: Vec<String>,
    pub categories: Vec<String>,
    /// Chunk count per trust level label.
    pub trust_breakdown: BTreeMap<String, usize>,
}

/// Handle to the on-disk knowledge store. Cheap to clone; all clones
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    base: PathBuf,
    pool: SqlitePool,
}

impl KnowledgeStore {
    /// Open (creating if missing) the store under `base` directory.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = Self::database_path(base);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true)
            .auto_vacuum(SqliteAutoVacuum::Full)
            .page_size(1 << 16)
            .optimize_on_close(true, 1 << 10);
        let pool = SqlitePool::connect_with(options).await?;
        Self::new_with_pool(base, pool).await
    }

    /// Open an in-memory store, used by tests and throwaway sessions.
    ///
    /// The pool is pinned to one long-lived connection: SQLite hands every
    /// new `:memory:` connection a fresh empty database.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        Self::new_with_pool(Path::new(""), pool).await
    }

    async fn new_with_pool(base: &Path, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self {
            base: base.to_path_buf(),
            pool,
        })
    }

    /// Path of the database file for a given base directory.
    pub fn database_path(base: &Path) -> PathBuf {
        base.join(DB_FILE_NAME)
    }

    /// Base directory this store was opened under.
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB,
                category TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                confidence REAL,
                trust_level INTEGER NOT NULL DEFAULT 0,
                endorsements INTEGER NOT NULL DEFAULT 0,
                demerits INTEGER NOT NULL DEFAULT 0,
                supersedes TEXT,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks(category)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_message TEXT NOT NULL,
                assistant_response TEXT NOT NULL,
                chunk_ids TEXT NOT NULL DEFAULT '[]',
                degraded INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session_id ON turns(session_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                turn_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                correction_text TEXT,
                produced_chunk_ids TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (turn_id) REFERENCES turns(id) ON DELETE CASCADE
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_turn_id ON feedback(turn_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ---- chunks ----------------------------------------------------------

    /// Insert or replace a single chunk. See [`Self::upsert_chunks`].
    pub async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.upsert_chunks(std::slice::from_ref(chunk)).await
    }

    /// Insert or replace chunks by id in one transaction.
    ///
    /// Replacing an existing id updates embedding and metadata but never
    /// lowers `trust_level` and never resets the endorsement/demerit
    /// counters or the original creation time.
    pub async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.check_embedding_dimension(chunks).await?;

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let embedding_bytes = chunk
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<f16, u8>(e));
            let tags_json = serde_json::to_string(&chunk.tags)?;

            sqlx::query(
                "INSERT INTO chunks (
                    id, source, sequence, text, embedding, category, tags,
                    confidence, trust_level, endorsements, demerits,
                    supersedes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    category = excluded.category,
                    tags = excluded.tags,
                    confidence = excluded.confidence,
                    trust_level = MAX(chunks.trust_level, excluded.trust_level),
                    supersedes = COALESCE(excluded.supersedes, chunks.supersedes)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.sequence as i64)
            .bind(&chunk.text)
            .bind(embedding_bytes)
            .bind(&chunk.category)
            .bind(&tags_json)
            .bind(chunk.confidence)
            .bind(chunk.trust_level as i64)
            .bind(chunk.endorsements)
            .bind(chunk.demerits)
            .bind(&chunk.supersedes)
            .bind(chunk.created_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Verify the batch against the store's recorded embedding dimension,
    /// recording it on the first embedded write.
    async fn check_embedding_dimension(&self, chunks: &[Chunk]) -> Result<()> {
        let mut batch_dimension: Option<usize> = None;
        for chunk in chunks {
            if let Some(embedding) = &chunk.embedding {
                match batch_dimension {
                    None => batch_dimension = Some(embedding.len()),
                    Some(d) if d != embedding.len() => {
                        return Err(KnowledgeError::store_corruption(format!(
                            "chunk {} has embedding dimension {} but the batch started with {d}",
                            chunk.id,
                            embedding.len()
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        let Some(dimension) = batch_dimension else {
            return Ok(());
        };

        match self.embedding_dimension().await? {
            Some(expected) if expected != dimension => Err(KnowledgeError::store_corruption(
                format!("embedding dimension {dimension} does not match store dimension {expected}"),
            )),
            Some(_) => Ok(()),
            None => {
                sqlx::query(
                    "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('embedding_dimension', ?1)",
                )
                .bind(dimension.to_string())
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        }
    }

    /// Embedding dimension recorded on the first embedded write, if any.
    pub async fn embedding_dimension(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'embedding_dimension'")
                .fetch_optional(&self.pool)
                .await?;
        match value {
            None => Ok(None),
            Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
                KnowledgeError::store_corruption(format!(
                    "store_meta embedding_dimension is not a number: {raw}"
                ))
            }),
        }
    }

    pub async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, source, sequence, text, embedding, category, tags, confidence,
                    trust_level, endorsements, demerits, supersedes, created_at
             FROM chunks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::chunk_from_row).transpose()
    }

    /// Remove every chunk belonging to `source`, returning how many went.
    pub async fn delete_chunks_by_source(&self, source: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?1")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    /// Scan chunks by metadata, newest first (ties broken by id).
    pub async fn query_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<Chunk>> {
        let mut chunks = self.fetch_filtered(filter, false).await?;
        if let Some(limit) = filter.limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    /// Brute-force cosine similarity over every embedded chunk, optionally
    /// pre-restricted by a metadata filter.
    ///
    /// Returns up to `k` results ordered by descending similarity; ties
    /// prefer newer chunks, then lower ids. An empty result is not an
    /// error. A query whose dimension disagrees with the store's recorded
    /// dimension is corruption: the store and the embedding model no
    /// longer match.
    pub async fn similarity_search(
        &self,
        query_embedding: &[f16],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Chunk, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.embedding_dimension().await? {
            if expected != query_embedding.len() {
                return Err(KnowledgeError::store_corruption(format!(
                    "query embedding has dimension {} but the store holds {expected}",
                    query_embedding.len()
                )));
            }
        }

        let default_filter = MetadataFilter::default();
        let filter = filter.unwrap_or(&default_filter);
        let candidates = self.fetch_filtered(filter, true).await?;

        let mut similarities: Vec<(f32, Chunk)> = candidates
            .into_iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let score = calculate_cosine_similarity(query_embedding, embedding);
                Some((score, chunk))
            })
            .collect();

        similarities.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        similarities.truncate(k);

        Ok(similarities
            .into_iter()
            .map(|(score, chunk)| (chunk, score))
            .collect())
    }

    /// Shared scan for metadata queries and similarity candidates. The
    /// filter's `limit` is NOT applied here so similarity ranking always
    /// sees the full candidate set.
    async fn fetch_filtered(&self, filter: &MetadataFilter, embedded_only: bool) -> Result<Vec<Chunk>> {
        let mut sql = String::from(
            "SELECT id, source, sequence, text, embedding, category, tags, confidence,
                    trust_level, endorsements, demerits, supersedes, created_at
             FROM chunks",
        );
        let mut conditions: Vec<String> = Vec::new();
        let mut param = 0;
        if embedded_only {
            conditions.push("embedding IS NOT NULL".to_string());
        }
        if filter.source.is_some() {
            param += 1;
            conditions.push(format!("source = ?{param}"));
        }
        if filter.min_trust.is_some() {
            param += 1;
            conditions.push(format!("trust_level >= ?{param}"));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(source) = &filter.source {
            query = query.bind(source);
        }
        if let Some(min_trust) = filter.min_trust {
            query = query.bind(min_trust as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;

        // Tags live in a JSON column, so topic terms are matched here
        // rather than in SQL.
        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = Self::chunk_from_row(row)?;
            if filter.matches_topic(&chunk) {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// Distinct categories currently present, sorted.
    pub async fn distinct_categories(&self) -> Result<Vec<String>> {
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM chunks WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Union of all tag sets currently present, sorted.
    pub async fn distinct_tags(&self) -> Result<BTreeSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT tags FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        let mut tags = BTreeSet::new();
        for raw in rows {
            let parsed: BTreeSet<String> = serde_json::from_str(&raw)?;
            tags.extend(parsed);
        }
        Ok(tags)
    }

    /// Add one endorsement to each of the given chunks.
    pub async fn add_endorsements(&self, ids: &[ChunkId]) -> Result<()> {
        self.bump_counter("endorsements", ids).await
    }

    /// Add one demerit to each of the given chunks.
    pub async fn add_demerits(&self, ids: &[ChunkId]) -> Result<()> {
        self.bump_counter("demerits", ids).await
    }

    async fn bump_counter(&self, column: &str, ids: &[ChunkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders: String = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        // `column` is one of two internal constants, never user input.
        let sql = format!("UPDATE chunks SET {column} = {column} + 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    // ---- sessions and turns ----------------------------------------------

    /// Create the session row if it does not exist yet.
    pub async fn ensure_session(&self, session_id: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a turn to a session, returning the new turn id.
    pub async fn append_turn(
        &self,
        session_id: &str,
        user_message: &str,
        assistant_response: &str,
        chunk_ids: &[ChunkId],
        degraded: bool,
    ) -> Result<i64> {
        self.ensure_session(session_id).await?;
        let now = Utc::now().timestamp();
        let chunk_ids_json = serde_json::to_string(chunk_ids)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO turns (session_id, user_message, assistant_response, chunk_ids, degraded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(session_id)
        .bind(user_message)
        .bind(assistant_response)
        .bind(&chunk_ids_json)
        .bind(degraded)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_turn(&self, turn_id: i64) -> Result<Option<Turn>> {
        let row = sqlx::query(
            "SELECT id, session_id, user_message, assistant_response, chunk_ids, degraded, created_at
             FROM turns WHERE id = ?1",
        )
        .bind(turn_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::turn_from_row).transpose()
    }

    /// The last `n` turns of a session in chronological order.
    pub async fn recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_message, assistant_response, chunk_ids, degraded, created_at
             FROM turns WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut turns = rows
            .iter()
            .map(Self::turn_from_row)
            .collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Every turn of a session in chronological order.
    pub async fn session_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_message, assistant_response, chunk_ids, degraded, created_at
             FROM turns WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::turn_from_row).collect()
    }

    /// Delete a session's turns (feedback rows cascade), returning how
    /// many turns went. The session row itself stays.
    pub async fn clear_session(&self, session_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM turns WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    // ---- feedback --------------------------------------------------------

    /// Append an immutable feedback record.
    pub async fn insert_feedback(
        &self,
        turn_id: i64,
        kind: FeedbackKind,
        correction_text: Option<&str>,
        produced_chunk_ids: &[ChunkId],
    ) -> Result<FeedbackRecord> {
        let now = Utc::now().timestamp();
        let produced_json = serde_json::to_string(produced_chunk_ids)?;
        let result = sqlx::query(
            "INSERT INTO feedback (turn_id, kind, correction_text, produced_chunk_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(turn_id)
        .bind(kind.as_str())
        .bind(correction_text)
        .bind(&produced_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(FeedbackRecord {
            id: result.last_insert_rowid(),
            turn_id,
            kind,
            correction_text: correction_text.map(String::from),
            produced_chunk_ids: produced_chunk_ids.to_vec(),
            created_at: timestamp_to_datetime(now)?,
        })
    }

    /// Most recent feedback records, newest first.
    pub async fn feedback_history(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query(
            "SELECT id, turn_id, kind, correction_text, produced_chunk_ids, created_at
             FROM feedback ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::feedback_from_row).collect()
    }

    // ---- statistics ------------------------------------------------------

    pub async fn get_statistics(&self) -> Result<StoreStatistics> {
        let total_chunks = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded_chunks =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        let total_sessions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        let total_turns = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM turns")
            .fetch_one(&self.pool)
            .await?;
        let feedback_entries = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        let sources: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source FROM chunks ORDER BY source")
                .fetch_all(&self.pool)
                .await?;
        let categories = self.distinct_categories().await?;

        let mut trust_breakdown = BTreeMap::new();
        let rows = sqlx::query("SELECT trust_level, COUNT(*) AS n FROM chunks GROUP BY trust_level")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let level: i64 = row.get("trust_level");
            let count: i64 = row.get("n");
            let label = TrustLevel::from_i64(level)
                .ok_or_else(|| {
                    KnowledgeError::store_corruption(format!("unknown trust level {level}"))
                })?
                .label();
            trust_breakdown.insert(label.to_string(), count as usize);
        }

        Ok(StoreStatistics {
            total_chunks: total_chunks as usize,
            embedded_chunks: embedded_chunks as usize,
            embedding_dimension: self.embedding_dimension().await?,
            total_sessions: total_sessions as usize,
            total_turns: total_turns as usize,
            feedback_entries: feedback_entries as usize,
            sources,
            categories,
            trust_breakdown,
        })
    }

    // ---- row decoding ----------------------------------------------------

    fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
        let id: String = row.get("id");
        let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
        let embedding = match embedding_bytes {
            Some(bytes) => {
                if bytes.len() % 2 != 0 {
                    return Err(KnowledgeError::store_corruption(format!(
                        "chunk {id} has a malformed embedding blob of {} bytes",
                        bytes.len()
                    )));
                }
                Some(bytemuck::cast_slice::<u8, f16>(&bytes).to_vec())
            }
            None => None,
        };

        let trust_raw: i64 = row.get("trust_level");
        let trust_level = TrustLevel::from_i64(trust_raw).ok_or_else(|| {
            KnowledgeError::store_corruption(format!(
                "chunk {id} has unknown trust level {trust_raw}"
            ))
        })?;

        let tags_json: String = row.get("tags");
        let tags: BTreeSet<String> = serde_json::from_str(&tags_json)?;

        let sequence: i64 = row.get("sequence");
        let created_raw: i64 = row.get("created_at");

        Ok(Chunk {
            id,
            source: row.get("source"),
            sequence: sequence as usize,
            text: row.get("text"),
            embedding,
            category: row.get("category"),
            tags,
            confidence: row.get("confidence"),
            trust_level,
            endorsements: row.get("endorsements"),
            demerits: row.get("demerits"),
            supersedes: row.get("supersedes"),
            created_at: timestamp_to_datetime(created_raw)?,
        })
    }

    fn turn_from_row(row: &SqliteRow) -> Result<Turn> {
        let chunk_ids_json: String = row.get("chunk_ids");
        let chunk_ids: Vec<ChunkId> = serde_json::from_str(&chunk_ids_json)?;
        let created_raw: i64 = row.get("created_at");
        Ok(Turn {
            id: row.get("id"),
            session_id: row.get("session_id"),
            user_message: row.get("user_message"),
            assistant_response: row.get("assistant_response"),
            chunk_ids,
            degraded: row.get("degraded"),
            created_at: timestamp_to_datetime(created_raw)?,
        })
    }

    fn feedback_from_row(row: &SqliteRow) -> Result<FeedbackRecord> {
        let kind_raw: String = row.get("kind");
        let kind = kind_raw.parse::<FeedbackKind>().map_err(|_| {
            KnowledgeError::store_corruption(format!("unknown feedback kind: {kind_raw}"))
        })?;
        let produced_json: String = row.get("produced_chunk_ids");
        let produced_chunk_ids: Vec<ChunkId> = serde_json::from_str(&produced_json)?;
        let created_raw: i64 = row.get("created_at");
        Ok(FeedbackRecord {
            id: row.get("id"),
            turn_id: row.get("turn_id"),
            kind,
            correction_text: row.get("correction_text"),
            produced_chunk_ids,
            created_at: timestamp_to_datetime(created_raw)?,
        })
    }
}

fn timestamp_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
        KnowledgeError::store_corruption(format!("timestamp {secs} is out of range"))
    })
}

/// Cosine similarity of two f16 vectors, computed in f32.
///
/// Mismatched lengths and zero-norm vectors score 0.0 rather than erroring
/// so one bad row cannot sink a whole search.
pub fn calculate_cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f16_vec(values: &[f32]) -> Vec<f16> {
        values.iter().map(|v| f16::from_f32(*v)).collect()
    }

    fn sample_chunk(text: &str) -> Chunk {
        Chunk::new("notes/sample.md", 0, text)
    }

    #[tokio::test]
    async fn test_chunk_round_trip() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let mut chunk = sample_chunk("Worked on payment gateway in 2022")
            .with_embedding(f16_vec(&[0.1, 0.2, 0.3, 0.4]))
            .with_category("experience");
        chunk.tags.insert("payments".to_string());
        chunk.confidence = Some(0.9);
        store.upsert_chunk(&chunk).await?;

        let loaded = store.get_chunk(&chunk.id).await?.unwrap();
        assert_eq!(loaded.id, chunk.id);
        assert_eq!(loaded.text, chunk.text);
        assert_eq!(loaded.source, chunk.source);
        assert_eq!(loaded.embedding, chunk.embedding);
        assert_eq!(loaded.category.as_deref(), Some("experience"));
        assert!(loaded.tags.contains("payments"));
        assert_eq!(loaded.confidence, Some(0.9));
        assert_eq!(loaded.trust_level, TrustLevel::Raw);
        assert_eq!(loaded.created_at.timestamp(), chunk.created_at.timestamp());
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_ids_are_deterministic() {
        let a = Chunk::new("cv.md", 3, "some text");
        let b = Chunk::new("cv.md", 3, "some text");
        let c = Chunk::new("cv.md", 4, "some text");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_trust_level_never_moves_backward() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let chunk = sample_chunk("corrected fact").with_trust_level(TrustLevel::UserCorrected);
        store.upsert_chunk(&chunk).await?;

        // Re-ingesting the same content arrives at raw trust; the store
        // must keep the higher level.
        let reingested = sample_chunk("corrected fact");
        assert_eq!(reingested.id, chunk.id);
        store.upsert_chunk(&reingested).await?;

        let loaded = store.get_chunk(&chunk.id).await?.unwrap();
        assert_eq!(loaded.trust_level, TrustLevel::UserCorrected);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_preserves_feedback_counters() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let chunk = sample_chunk("endorsed fact");
        store.upsert_chunk(&chunk).await?;
        store.add_endorsements(&[chunk.id.clone()]).await?;
        store.add_demerits(&[chunk.id.clone()]).await?;
        store.add_demerits(&[chunk.id.clone()]).await?;

        // A replacing write must not reset the counters.
        store.upsert_chunk(&chunk.clone().with_category("notes")).await?;

        let loaded = store.get_chunk(&chunk.id).await?.unwrap();
        assert_eq!(loaded.endorsements, 1);
        assert_eq!(loaded.demerits, 2);
        assert_eq!(loaded.category.as_deref(), Some("notes"));
        Ok(())
    }

    #[tokio::test]
    async fn test_embedding_dimension_guard() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        assert_eq!(store.embedding_dimension().await?, None);

        let chunk = sample_chunk("first").with_embedding(f16_vec(&[1.0, 0.0, 0.0]));
        store.upsert_chunk(&chunk).await?;
        assert_eq!(store.embedding_dimension().await?, Some(3));

        let bad = Chunk::new("notes/other.md", 0, "second").with_embedding(f16_vec(&[1.0, 0.0]));
        let err = store.upsert_chunk(&bad).await.unwrap_err();
        assert!(err.is_fatal(), "dimension mismatch must be corruption");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_of_distinct_ids_all_land() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = KnowledgeStore::open(dir.path()).await?;

        let mut writers = Vec::new();
        for worker in 0..4 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                let source = format!("worker-{worker}.md");
                let chunks: Vec<Chunk> = (0..8)
                    .map(|sequence| {
                        Chunk::new(source.as_str(), sequence, format!("fact {worker}-{sequence}"))
                            .with_embedding(f16_vec(&[1.0, 0.0]))
                    })
                    .collect();
                store.upsert_chunks(&chunks).await
            }));
        }
        for writer in writers {
            writer.await??;
        }

        let stats = store.get_statistics().await?;
        assert_eq!(stats.total_chunks, 32);
        assert_eq!(stats.embedded_chunks, 32);
        assert_eq!(stats.embedding_dimension, Some(2));
        for worker in 0..4 {
            let source = format!("worker-{worker}.md");
            let stored = store
                .query_by_metadata(&MetadataFilter::new().with_source(source.clone()))
                .await?;
            assert_eq!(stored.len(), 8, "all chunks of {source} must survive the race");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_query_by_metadata_filters_and_orders() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let mut experience = Chunk::new("cv.md", 0, "payment gateway work")
            .with_category("experience")
            .with_trust_level(TrustLevel::Enriched);
        experience.tags.insert("payments".to_string());
        let education = Chunk::new("cv.md", 1, "computer science degree").with_category("education");
        let mut tagged = Chunk::new("notes.md", 0, "stripe integration notes");
        tagged.tags.insert("payments".to_string());
        store
            .upsert_chunks(&[experience.clone(), education.clone(), tagged.clone()])
            .await?;

        // Topic terms are any-of across categories and tags.
        let filter = MetadataFilter::new()
            .with_category("experience")
            .with_tag("payments");
        let hits = store.query_by_metadata(&filter).await?;
        let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&experience.id.as_str()));
        assert!(ids.contains(&tagged.id.as_str()));
        assert!(!ids.contains(&education.id.as_str()));

        let trusted = store
            .query_by_metadata(&MetadataFilter::new().with_min_trust(TrustLevel::Enriched))
            .await?;
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].id, experience.id);

        let limited = store
            .query_by_metadata(&MetadataFilter::new().with_source("cv.md").with_limit(1))
            .await?;
        assert_eq!(limited.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_after_write_similarity() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let target = sample_chunk("target text").with_embedding(f16_vec(&[1.0, 0.0, 0.0, 0.0]));
        let other = Chunk::new("other.md", 0, "unrelated text")
            .with_embedding(f16_vec(&[0.0, 1.0, 0.0, 0.0]));
        store.upsert_chunks(&[target.clone(), other]).await?;

        let embedding = target.embedding.clone().unwrap();
        let results = store.similarity_search(&embedding, 2, None).await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, target.id);
        assert!(results[0].1 > 0.99);
        Ok(())
    }

    #[tokio::test]
    async fn test_similarity_filter_eliminating_everything_is_empty() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        let chunk = sample_chunk("text").with_embedding(f16_vec(&[1.0, 0.0]));
        store.upsert_chunk(&chunk).await?;

        let filter = MetadataFilter::new().with_category("no-such-category");
        let results = store
            .similarity_search(&f16_vec(&[1.0, 0.0]), 5, Some(&filter))
            .await?;
        assert!(results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unembedded_chunks_are_invisible_to_similarity() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        let embedded = sample_chunk("embedded").with_embedding(f16_vec(&[1.0, 0.0]));
        let bare = Chunk::new("bare.md", 0, "no vector");
        store.upsert_chunks(&[embedded.clone(), bare]).await?;

        let results = store.similarity_search(&f16_vec(&[1.0, 0.0]), 10, None).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, embedded.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_chunks_by_source() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        store
            .upsert_chunks(&[
                Chunk::new("a.md", 0, "one"),
                Chunk::new("a.md", 1, "two"),
                Chunk::new("b.md", 0, "three"),
            ])
            .await?;

        assert_eq!(store.delete_chunks_by_source("a.md").await?, 2);
        let stats = store.get_statistics().await?;
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.sources, vec!["b.md".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_turns_are_appended_in_order() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;

        let first = store
            .append_turn("session-1", "hello", "hi there", &[], false)
            .await?;
        let second = store
            .append_turn("session-1", "what next", "more", &["abc".to_string()], true)
            .await?;
        assert!(second > first);

        let turns = store.recent_turns("session-1", 10).await?;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].id, first);
        assert_eq!(turns[1].id, second);
        assert!(turns[1].degraded);
        assert_eq!(turns[1].chunk_ids, vec!["abc".to_string()]);

        let last_one = store.recent_turns("session-1", 1).await?;
        assert_eq!(last_one.len(), 1);
        assert_eq!(last_one[0].id, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_session_removes_turns() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        store.append_turn("s", "a", "b", &[], false).await?;
        store.append_turn("s", "c", "d", &[], false).await?;

        assert_eq!(store.clear_session("s").await?, 2);
        assert!(store.session_turns("s").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_feedback_history_is_newest_first() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        let turn_id = store.append_turn("s", "q", "a", &[], false).await?;

        store
            .insert_feedback(turn_id, FeedbackKind::Correct, None, &[])
            .await?;
        let improved = store
            .insert_feedback(
                turn_id,
                FeedbackKind::Improve,
                Some("actually it was 2023"),
                &["new-chunk".to_string()],
            )
            .await?;

        let history = store.feedback_history(10).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, improved.id);
        assert_eq!(history[0].kind, FeedbackKind::Improve);
        assert_eq!(history[0].produced_chunk_ids, vec!["new-chunk".to_string()]);
        assert_eq!(history[1].kind, FeedbackKind::Correct);
        Ok(())
    }

    #[tokio::test]
    async fn test_statistics_counts() -> anyhow::Result<()> {
        let store = KnowledgeStore::open_memory().await?;
        store
            .upsert_chunks(&[
                Chunk::new("a.md", 0, "one").with_embedding(f16_vec(&[1.0, 0.0])),
                Chunk::new("a.md", 1, "two").with_category("notes"),
                Chunk::new("b.md", 0, "three").with_trust_level(TrustLevel::UserCorrected),
            ])
            .await?;
        let turn_id = store.append_turn("s", "q", "a", &[], false).await?;
        store
            .insert_feedback(turn_id, FeedbackKind::Correct, None, &[])
            .await?;

        let stats = store.get_statistics().await?;
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.embedded_chunks, 1);
        assert_eq!(stats.embedding_dimension, Some(2));
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_turns, 1);
        assert_eq!(stats.feedback_entries, 1);
        assert_eq!(stats.sources.len(), 2);
        assert_eq!(stats.categories, vec!["notes".to_string()]);
        assert_eq!(stats.trust_breakdown.get("raw"), Some(&2));
        assert_eq!(stats.trust_breakdown.get("user_corrected"), Some(&1));
        Ok(())
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        let a = f16_vec(&[1.0, 0.0]);
        let b = f16_vec(&[1.0, 0.0]);
        let c = f16_vec(&[0.0, 1.0]);
        let zero = f16_vec(&[0.0, 0.0]);
        let short = f16_vec(&[1.0]);

        assert!((calculate_cosine_similarity(&a, &b) - 1.0).abs() < 1e-3);
        assert!(calculate_cosine_similarity(&a, &c).abs() < 1e-3);
        assert_eq!(calculate_cosine_similarity(&a, &zero), 0.0);
        assert_eq!(calculate_cosine_similarity(&a, &short), 0.0);
    }

    #[test]
    fn test_feedback_kind_parses_case_insensitively() {
        assert_eq!("Correct".parse::<FeedbackKind>().unwrap(), FeedbackKind::Correct);
        assert_eq!("IMPROVE".parse::<FeedbackKind>().unwrap(), FeedbackKind::Improve);
        assert!("praise".parse::<FeedbackKind>().is_err());
    }
}
