//! Document ingestion: extract, chunk, enrich, embed, store.
//!
//! Single files and free-form notes go straight through the pipeline.
//! Directory walks queue file paths first and then drain the queue in
//! bounded batches, so a bulk ingest can be cancelled between files and
//! leaves everything already written fully intact. Per-file failures
//! are counted and logged, never fatal to the batch; the one exception
//! is store corruption, which stops everything.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use sage_ai_context::TextChunker;
use sage_ai_models::EmbeddingProvider;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::enrich::Enricher;
use crate::error::{KnowledgeError, Result};
use crate::extract::TextExtractor;
use crate::store::{Chunk, KnowledgeStore, TrustLevel};

/// Tunables for one ingestion engine.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub chunking: ChunkingConfig,
    /// Queued files processed per `process_pending` drain.
    pub max_batch_files: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            max_batch_files: 100,
        }
    }
}

impl IngestionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_max_batch_files(mut self, max_batch_files: usize) -> Self {
        self.max_batch_files = max_batch_files;
        self
    }
}

/// Running totals across an engine's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStats {
    pub files_ingested: usize,
    pub files_skipped: usize,
    pub chunks_stored: usize,
    pub chunks_enriched: usize,
    pub embeddings_generated: usize,
    pub errors: usize,
}

/// Outcome of ingesting one source.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: String,
    pub chunks_stored: usize,
    pub chunks_enriched: usize,
    pub embeddings_generated: usize,
    pub elapsed: Duration,
}

/// Wires extractor, chunker, enricher, embedder, and store together.
pub struct IngestionEngine {
    store: KnowledgeStore,
    extractor: Arc<dyn TextExtractor>,
    enricher: Arc<Enricher>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    config: IngestionConfig,
    queue_tx: flume::Sender<PathBuf>,
    queue_rx: flume::Receiver<PathBuf>,
    cancelled: Arc<AtomicBool>,
    stats: Arc<RwLock<IngestionStats>>,
}

impl IngestionEngine {
    pub fn new(
        store: KnowledgeStore,
        extractor: Arc<dyn TextExtractor>,
        enricher: Arc<Enricher>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        config: IngestionConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = flume::unbounded();
        Self {
            store,
            extractor,
            enricher,
            embeddings,
            config,
            queue_tx,
            queue_rx,
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(IngestionStats::default())),
        }
    }

    /// Ingest one file now, replacing any chunks previously stored for
    /// the same path.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        if !self.extractor.supports(path) {
            return Err(KnowledgeError::unsupported_format(path));
        }
        let text = self.extractor.extract(path).await?;
        let source = path.to_string_lossy().to_string();

        // Re-ingesting a file replaces whatever it stored before. This
        // is the only pipeline path that deletes.
        let removed = self.store.delete_chunks_by_source(&source).await?;
        if removed > 0 {
            debug!(source = %source, removed, "replacing previously stored chunks");
        }

        self.process_text(&source, &text).await
    }

    /// Ingest a free-form note. Every note gets its own timestamped
    /// source id, so notes written on the same day accumulate instead of
    /// replacing one another.
    pub async fn ingest_note(&self, text: &str) -> Result<IngestReport> {
        let source = format!("note:{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"));
        self.process_text(&source, text).await
    }

    /// Walk `root` and queue every supported file, honoring ignore rules
    /// and skipping hidden entries. Returns how many files were queued.
    pub fn schedule_directory(&self, root: &Path) -> Result<usize> {
        let mut queued = 0;
        for entry in ignore::WalkBuilder::new(root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.extractor.supports(path) {
                self.queue_tx.send(path.to_path_buf()).map_err(|_| {
                    KnowledgeError::Io {
                        source: std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "ingestion queue closed",
                        ),
                    }
                })?;
                queued += 1;
            }
        }
        info!(queued, root = %root.display(), "scheduled directory for ingestion");
        Ok(queued)
    }

    /// Drain up to `max_batch_files` queued files, stopping early on
    /// cancellation. Per-file failures degrade to counters; only store
    /// corruption propagates.
    pub async fn process_pending(&self) -> Result<usize> {
        let mut processed = 0;
        while processed < self.config.max_batch_files {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("ingestion cancelled, leaving the remaining queue untouched");
                break;
            }
            let Ok(path) = self.queue_rx.try_recv() else {
                break;
            };
            match self.ingest_file(&path).await {
                Ok(report) => {
                    debug!(source = %report.source, chunks = report.chunks_stored, "ingested file");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(
                    e @ (KnowledgeError::UnsupportedFormat { .. }
                    | KnowledgeError::Extraction { .. }),
                ) => {
                    debug!("skipping {}: {e}", path.display());
                    self.stats.write().await.files_skipped += 1;
                }
                Err(e) => {
                    warn!("failed to ingest {}: {e}", path.display());
                    self.stats.write().await.errors += 1;
                }
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Walk, queue, and process a whole directory tree.
    pub async fn ingest_directory(&self, root: &Path) -> Result<IngestionStats> {
        self.schedule_directory(root)?;
        while self.queue_size() > 0 && !self.is_cancelled() {
            self.process_pending().await?;
        }
        Ok(self.stats().await)
    }

    /// Files still waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.queue_rx.len()
    }

    /// Request cancellation. The file currently being processed finishes
    /// and stays stored; queued files are left for a later run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> IngestionStats {
        self.stats.read().await.clone()
    }

    async fn process_text(&self, source: &str, text: &str) -> Result<IngestReport> {
        let started = Instant::now();
        let chunker = TextChunker::new(
            source,
            self.config.chunking.max_tokens,
            self.config.chunking.overlap_tokens,
        );
        let pieces = chunker.chunk(text);

        let mut chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| Chunk::new(source, piece.sequence, piece.text))
            .collect();

        let mut chunks_enriched = 0;
        if self.enricher.is_enabled() {
            let mut enriched = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let chunk = self.enricher.enrich_or_raw(chunk).await;
                if chunk.trust_level >= TrustLevel::Enriched {
                    chunks_enriched += 1;
                }
                enriched.push(chunk);
            }
            chunks = enriched;
        }

        let mut embeddings_generated = 0;
        if let Some(embeddings) = &self.embeddings {
            if !chunks.is_empty() {
                let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
                match embeddings.embed_texts(&texts).await {
                    Ok(batch) => {
                        embeddings_generated = batch.len();
                        for (chunk, vector) in chunks.iter_mut().zip(batch.vectors) {
                            chunk.embedding = Some(vector);
                        }
                    }
                    Err(e) => warn!(source, "storing chunks without embeddings: {e}"),
                }
            }
        }

        self.store.upsert_chunks(&chunks).await?;

        let report = IngestReport {
            source: source.to_string(),
            chunks_stored: chunks.len(),
            chunks_enriched,
            embeddings_generated,
            elapsed: started.elapsed(),
        };
        {
            let mut stats = self.stats.write().await;
            stats.files_ingested += 1;
            stats.chunks_stored += report.chunks_stored;
            stats.chunks_enriched += report.chunks_enriched;
            stats.embeddings_generated += report.embeddings_generated;
        }
        info!(
            source,
            chunks = report.chunks_stored,
            embedded = report.embeddings_generated,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingested source"
        );
        Ok(report)
    }
}
