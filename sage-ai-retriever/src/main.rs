use clap::{Parser, Subcommand};
use itertools::Itertools;
use sage_ai_models::{
    EmbeddingBatch, EmbeddingProvider, FastEmbedProvider, ModelError, OllamaClient,
};
use sage_ai_retriever::{
    config::{CONFIG_FILE_NAME, KnowledgeConfig},
    enrich::Enricher,
    extract::PlainTextExtractor,
    ingest::{IngestionConfig, IngestionEngine},
    router::RetrievalRouter,
    store::KnowledgeStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// A CLI tool to ingest and query a personal knowledge store.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory containing the .sage-ai.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the knowledge store and write a default sage.toml
    Init,
    /// Ingest a file, or every supported file under a directory
    Ingest {
        /// File or directory to ingest
        path: PathBuf,
    },
    /// Store a free-form note under a timestamped source
    Note {
        /// Note text
        text: String,
    },
    /// Answer a natural-language query with ranked chunks
    Search {
        /// The question to route
        query: String,
        /// Maximum number of chunks to display
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show knowledge store statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchHit {
    id: String,
    source: String,
    category: Option<String>,
    tags: Vec<String>,
    trust: String,
    score: f32,
    similarity: Option<f32>,
    tokens: usize,
    text: String,
}

#[derive(Serialize)]
struct SearchOutput {
    degraded: bool,
    total_matched: usize,
    hits: Vec<SearchHit>,
}

/// Stands in when the local embedding model cannot be loaded. Every call
/// fails, so the router falls back to metadata-only retrieval.
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

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sage_ai=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    match args.command {
        Commands::Init => {
            tokio::fs::create_dir_all(&args.base_dir).await?;
            let _store = KnowledgeStore::open(&args.base_dir).await?;
            let config_path = args.base_dir.join(CONFIG_FILE_NAME);
            if !config_path.exists() {
                let config = KnowledgeConfig::discover(&args.base_dir)?;
                tokio::fs::write(&config_path, config.to_toml_string()).await?;
                println!("Wrote default config to {}", config_path.display());
            }
            println!("Initialized knowledge store at {}", args.base_dir.display());
            println!(
                "Database location: {}",
                KnowledgeStore::database_path(&args.base_dir).display()
            );
            Ok(())
        }
        Commands::Ingest { path } => {
            let config = KnowledgeConfig::discover(&args.base_dir)?;
            let store = KnowledgeStore::open(&args.base_dir).await?;
            let engine = build_engine(&config, store).await?;

            if tokio::fs::metadata(&path).await?.is_dir() {
                let stats = engine.ingest_directory(&path).await?;
                println!("Ingested {} files from {}", stats.files_ingested, path.display());
                println!("  Chunks stored: {}", stats.chunks_stored);
                println!("  Chunks enriched: {}", stats.chunks_enriched);
                println!("  Embeddings generated: {}", stats.embeddings_generated);
                if stats.files_skipped > 0 {
                    println!("  Files skipped: {}", stats.files_skipped);
                }
                if stats.errors > 0 {
                    println!("  Errors: {}", stats.errors);
                }
            } else {
                let report = engine.ingest_file(&path).await?;
                println!(
                    "Ingested {} ({} chunks, {} embedded) in {}ms",
                    report.source,
                    report.chunks_stored,
                    report.embeddings_generated,
                    report.elapsed.as_millis()
                );
            }
            Ok(())
        }
        Commands::Note { text } => {
            let config = KnowledgeConfig::discover(&args.base_dir)?;
            let store = KnowledgeStore::open(&args.base_dir).await?;
            let engine = build_engine(&config, store).await?;

            let report = engine.ingest_note(&text).await?;
            println!(
                "Stored note as {} ({} chunks)",
                report.source, report.chunks_stored
            );
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            format,
        } => {
            let config = KnowledgeConfig::discover(&args.base_dir)?;
            let store = KnowledgeStore::open(&args.base_dir).await?;
            let embeddings = load_embeddings(&config)
                .await
                .unwrap_or_else(|| Arc::new(UnavailableEmbedder));
            let router = RetrievalRouter::new(store, embeddings, config.retrieval.clone());

            let context = router.resolve(&query).await?;
            let degraded = context.degraded;
            let total_matched = context.total_matched;
            let hits: Vec<SearchHit> = context
                .chunks
                .into_iter()
                .take(limit)
                .map(|scored| SearchHit {
                    id: scored.chunk.id.clone(),
                    source: scored.chunk.source.clone(),
                    category: scored.chunk.category.clone(),
                    tags: scored.chunk.tags.iter().cloned().collect(),
                    trust: scored.chunk.trust_level.label().to_string(),
                    score: scored.score,
                    similarity: scored.similarity,
                    tokens: scored.chunk.token_estimate(),
                    text: scored.chunk.text,
                })
                .collect();

            match format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        degraded,
                        total_matched,
                        hits,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    if degraded {
                        println!("(embedding unavailable, metadata-only results)");
                    }
                    println!(
                        "Returning {} of {} matched chunks:",
                        hits.len(),
                        total_matched
                    );
                    for hit in hits {
                        println!(
                            "  Score: {:.3} | Category: {} | Trust: {} | Source: {}",
                            hit.score,
                            hit.category.as_deref().unwrap_or("-"),
                            hit.trust,
                            hit.source
                        );
                        println!(
                            "    {}",
                            hit.text.chars().take(100).collect::<String>()
                        );
                    }
                }
                OutputFormat::Full => {
                    if degraded {
                        println!("(embedding unavailable, metadata-only results)");
                    }
                    for hit in hits {
                        println!("Chunk ID: {}", hit.id);
                        println!("Source: {}", hit.source);
                        println!("Category: {}", hit.category.as_deref().unwrap_or("-"));
                        if !hit.tags.is_empty() {
                            println!("Tags: {}", hit.tags.iter().join(", "));
                        }
                        println!("Trust: {}", hit.trust);
                        println!("Score: {:.3}", hit.score);
                        if let Some(similarity) = hit.similarity {
                            println!("Similarity: {similarity:.3}");
                        }
                        println!("Tokens: {}", hit.tokens);
                        println!("Content:\n{}", hit.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let store = KnowledgeStore::open(&args.base_dir).await?;
            let stats = store.get_statistics().await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Knowledge Store Statistics:");
                    println!("  Total chunks: {}", stats.total_chunks);
                    println!("  Embedded chunks: {}", stats.embedded_chunks);
                    if let Some(dimension) = stats.embedding_dimension {
                        println!("  Embedding dimension: {dimension}");
                    }
                    println!("  Sessions: {}", stats.total_sessions);
                    println!("  Turns: {}", stats.total_turns);
                    println!("  Feedback entries: {}", stats.feedback_entries);
                    for (level, count) in &stats.trust_breakdown {
                        println!("  Trust {level}: {count}");
                    }
                    if !stats.categories.is_empty() {
                        println!("  Categories: {}", stats.categories.iter().join(", "));
                    }
                    if !stats.sources.is_empty() {
                        println!("  Sources:");
                        for source in stats.sources.iter().take(10) {
                            println!("    {source}");
                        }
                        if stats.sources.len() > 10 {
                            println!("    ... and {} more", stats.sources.len() - 10);
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

/// Build the full ingestion pipeline from config. A missing embedding
/// model degrades to storing unembedded chunks rather than failing.
async fn build_engine(
    config: &KnowledgeConfig,
    store: KnowledgeStore,
) -> anyhow::Result<IngestionEngine> {
    let model = OllamaClient::new(config.language_model.completion_config())?;
    let enricher = Arc::new(Enricher::new(Arc::new(model), config.enrichment.clone()));
    let embeddings = load_embeddings(config).await;
    Ok(IngestionEngine::new(
        store,
        Arc::new(PlainTextExtractor::new()),
        enricher,
        embeddings,
        IngestionConfig::new().with_chunking(config.chunking),
    ))
}

async fn load_embeddings(config: &KnowledgeConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    match FastEmbedProvider::create(config.embedding.clone()).await {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!("embedding model unavailable, continuing without embeddings: {e}");
            None
        }
    }
}
