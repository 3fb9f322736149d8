//! Configuration management

use crate::chunking::{ChunkingConfig, OptimizationConfig};
use crate::error::{RagPipeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub optimization: OptimizationConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub embedding: EmbeddingServiceConfig,
}

/// Embedding service configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingServiceConfig {
    /// Base URL of the embeddings service
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Stored vector dimension; provider output is padded or truncated to it
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("RAGPIPE_EMBEDDING_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            api_key: std::env::var("RAGPIPE_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_embedding_model() -> String {
    std::env::var("RAGPIPE_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_dimensions() -> usize {
    std::env::var("RAGPIPE_EMBEDDING_DIMS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(384)
}

fn default_timeout() -> u64 {
    30
}

/// Rerank and score-adjustment constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankWeights {
    pub keyword_density: f64,
    pub exact_phrase: f64,
    pub exact_word: f64,
    pub exact_word_cap: f64,
    pub position_max: f64,
    /// Position score multiplier for reference-like chunks
    pub reference_position_factor: f64,
    pub important_section: f64,
    pub intent_type_match: f64,
    pub intent_token: f64,
    pub intent_token_cap: f64,
    pub metadata_overlap: f64,
    pub metadata_overlap_cap: f64,
    pub function_mention: f64,
    pub hybrid_multiplier: f64,
    pub toc_penalty: f64,
    pub narrative_boost: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            keyword_density: 0.3,
            exact_phrase: 0.2,
            exact_word: 0.02,
            exact_word_cap: 0.1,
            position_max: 0.05,
            reference_position_factor: 0.5,
            important_section: 0.05,
            intent_type_match: 0.1,
            intent_token: 0.03,
            intent_token_cap: 0.09,
            metadata_overlap: 0.05,
            metadata_overlap_cap: 0.15,
            function_mention: 0.15,
            hybrid_multiplier: 1.1,
            toc_penalty: 0.3,
            narrative_boost: 0.05,
        }
    }
}

/// Retrieval engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub similarity_threshold: f64,
    pub vector_weight: f64,
    pub lexical_weight: f64,
    pub reranking: bool,
    pub multi_hop: bool,
    pub query_expansion: bool,
    pub search_timeout_ms: u64,
    /// Neighbour chunks fetched around top results (0 disables)
    pub context_window: usize,
    pub min_results_before_retry: usize,
    pub retry_threshold_step: f64,
    pub retry_threshold_floor: f64,
    pub retry_max_results: usize,
    pub diversification_ratio: f64,
    pub near_duplicate_jaccard: f64,
    pub rerank: RerankWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            similarity_threshold: 0.25,
            vector_weight: 0.6,
            lexical_weight: 0.4,
            reranking: true,
            multi_hop: true,
            query_expansion: true,
            search_timeout_ms: 10_000,
            context_window: 0,
            min_results_before_retry: 5,
            retry_threshold_step: 0.05,
            retry_threshold_floor: 0.15,
            retry_max_results: 40,
            diversification_ratio: 0.75,
            near_duplicate_jaccard: 0.92,
            rerank: RerankWeights::default(),
        }
    }
}

impl RetrievalConfig {
    /// Per-source result cap
    pub fn per_source_cap(&self) -> usize {
        ((self.max_results as f64 * self.diversification_ratio).ceil() as usize).max(1)
    }
}

/// Ingestion-time embedding and persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub embed_batch_size: usize,
    pub batch_delay_ms: u64,
    pub item_timeout_ms: u64,
    pub max_retries: u32,
    pub rate_limit_backoff_ms: u64,
    pub retry_delay_ms: u64,
    pub max_embed_chars: usize,
    pub store_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            embed_batch_size: 3,
            batch_delay_ms: 1500,
            item_timeout_ms: 10_000,
            max_retries: 3,
            rate_limit_backoff_ms: 2000,
            retry_delay_ms: 1000,
            max_embed_chars: 20_000,
            store_batch_size: 100,
        }
    }
}

impl Config {
    /// Load config from `RAGPIPE_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("RAGPIPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path);
        Self::load_from(&path)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Default SQLite path, overridden by `RAGPIPE_DB`
    pub fn database_path() -> PathBuf {
        if let Some(p) = std::env::var_os("RAGPIPE_DB") {
            return PathBuf::from(p);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("index.sqlite")
    }

    /// Eager validation of every section
    pub fn validate(&self) -> Result<()> {
        let mut violations = crate::chunking::validate_config(&self.chunking);

        let o = &self.optimization;
        if o.max_lines_per_chunk == 0 || o.min_lines_per_chunk > o.max_lines_per_chunk {
            violations.push(
                "optimization.min_lines_per_chunk must not exceed max_lines_per_chunk".to_string(),
            );
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            violations.push("retrieval.similarity_threshold must be within [0, 1]".to_string());
        }
        if r.max_results == 0 {
            violations.push("retrieval.max_results must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&r.diversification_ratio) || r.diversification_ratio == 0.0 {
            violations.push("retrieval.diversification_ratio must be within (0, 1]".to_string());
        }

        if self.ingest.embed_batch_size == 0 || self.ingest.store_batch_size == 0 {
            violations.push("ingest batch sizes must be positive".to_string());
        }
        if self.embedding.dimensions == 0 {
            violations.push("embedding.dimensions must be positive".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RagPipeError::InvalidConfig(violations))
        }
    }
}
