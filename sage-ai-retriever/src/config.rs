//! Configuration for the knowledge store pipeline.
//!
//! Settings load from an optional `sage.toml` in the store's base directory.
//! Every field has a default, so a missing file yields a fully default
//! setup. CLI flags override file values.

use std::path::{Path, PathBuf};

use sage_ai_models::{CompletionConfig, EmbedConfig};
use serde::{Deserialize, Serialize};

use crate::error::{KnowledgeError, Result};

/// File name looked up in the store's base directory.
pub const CONFIG_FILE_NAME: &str = "sage.toml";

/// Top-level configuration, one section per pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub enrichment: EnrichmentConfig,
    pub embedding: EmbedConfig,
    pub language_model: LanguageModelConfig,
    pub chat: ChatConfig,
}

impl KnowledgeConfig {
    /// Load configuration from `path`. A missing file yields defaults; a
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&raw).map_err(|e| KnowledgeError::config(format!("{}: {e}", path.display())))
    }

    /// Load `sage.toml` from `base_dir`, falling back to defaults when the
    /// file does not exist. The store section always points at `base_dir`.
    pub fn discover(base_dir: &Path) -> Result<Self> {
        let mut config = Self::load(&base_dir.join(CONFIG_FILE_NAME))?;
        config.store.base_dir = base_dir.to_path_buf();
        Ok(config)
    }

    /// Render as TOML, e.g. to seed a new store directory.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("Config should always serialize")
    }
}

/// Where the knowledge store lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the `.sage-ai.db` database and `sage.toml`.
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
        }
    }
}

/// Token bounds for splitting documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum estimated tokens per chunk.
    pub max_tokens: usize,
    /// Estimated tokens shared between consecutive chunks.
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            overlap_tokens: 200,
        }
    }
}

/// Knobs for the retrieval router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How many nearest neighbours the semantic stage asks for.
    pub semantic_k: usize,
    /// Maximum estimated tokens of chunk text returned per query.
    pub token_budget: usize,
    pub weights: RankWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_k: 8,
            token_budget: 2000,
            weights: RankWeights::default(),
        }
    }
}

/// Coefficients of the composite ranking score. The right blend of
/// similarity against trust and recency depends on the corpus, so every
/// term is tunable rather than hard-coded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    pub similarity: f32,
    pub trust: f32,
    pub recency: f32,
    /// Age in days at which the recency bonus halves.
    pub recency_half_life_days: f32,
    /// Bonus per recorded endorsement on a chunk.
    pub endorsement: f32,
    /// Penalty per recorded demerit on a chunk.
    pub demerit: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 1.0,
            trust: 0.15,
            recency: 0.1,
            recency_half_life_days: 180.0,
            endorsement: 0.05,
            demerit: 0.2,
        }
    }
}

/// Policy for the LLM categorization pass at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Disable to ingest at raw trust without calling the language model.
    pub enabled: bool,
    /// Retries after the first failed categorization call.
    pub max_retries: usize,
    /// Base delay between retries; doubles per attempt.
    pub backoff_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            backoff_ms: 250,
        }
    }
}

/// Connection settings for the completion endpoint, plus retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelConfig {
    pub base_url: String,
    pub model: String,
    /// Retries after the first failed completion call.
    pub max_retries: usize,
    /// Base delay between retries; doubles per attempt.
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            base_url: completion.base_url,
            model: completion.model,
            max_retries: 2,
            backoff_ms: 500,
            timeout_secs: completion.timeout_secs,
        }
    }
}

impl LanguageModelConfig {
    /// The connection half of this section, for constructing a client.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig::new(&self.base_url, &self.model).with_timeout_secs(self.timeout_secs)
    }
}

/// Conversation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Prior turns included in each prompt.
    pub max_history_turns: usize,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 6,
            system_prompt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.chunking.max_tokens, 1000);
        assert_eq!(config.chunking.overlap_tokens, 200);
        assert_eq!(config.retrieval.semantic_k, 8);
        assert_eq!(config.retrieval.token_budget, 2000);
        assert_eq!(config.retrieval.weights.similarity, 1.0);
        assert!(config.enrichment.enabled);
        assert_eq!(config.language_model.model, "llama3.2");
        assert_eq!(config.chat.max_history_turns, 6);
        assert!(config.chat.system_prompt.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults_elsewhere() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[chunking]
max_tokens = 400

[retrieval.weights]
demerit = 0.5

[embedding]
model = "bge-small-en-v1.5"
"#,
        )?;

        let config = KnowledgeConfig::load(&path)?;
        assert_eq!(config.chunking.max_tokens, 400);
        assert_eq!(config.chunking.overlap_tokens, 200);
        assert_eq!(config.retrieval.weights.demerit, 0.5);
        assert_eq!(config.retrieval.weights.similarity, 1.0);
        assert_eq!(config.embedding.model_name, "bge-small-en-v1.5");
        Ok(())
    }

    #[test]
    fn test_discover_missing_file_is_default() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = KnowledgeConfig::discover(dir.path())?;
        assert_eq!(config.store.base_dir, dir.path());
        assert_eq!(config.retrieval.semantic_k, 8);
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "chunking = \"not a table\"")?;

        let err = KnowledgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, KnowledgeError::Config { .. }));
        Ok(())
    }

    #[test]
    fn test_round_trips_through_toml() -> anyhow::Result<()> {
        let config = KnowledgeConfig::default();
        let rendered = config.to_toml_string();
        let parsed: KnowledgeConfig = toml::from_str(&rendered)?;
        assert_eq!(parsed.retrieval.token_budget, config.retrieval.token_budget);
        assert_eq!(parsed.embedding.model_name, config.embedding.model_name);
        Ok(())
    }
}
