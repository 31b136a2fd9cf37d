//! Configuration management for cryptorag
//!
//! Loads the TOML configuration, applies `CRYPTORAG_SECTION__KEY` environment
//! overrides and validates the result. Every section carries defaults so a
//! partial file only needs the keys it changes.

use crate::embedding::CollectionKind;
use crate::error::{RagError, Result};
use crate::market::Interval;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.cryptorag"),
        }
    }
}

/// Keyword lists and defaults used by the intent resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Ticker used when the query names no known symbol
    pub default_ticker: String,
    /// Quote currency appended to detected symbols
    pub quote_currency: String,
    /// Short symbols recognised in free text
    pub known_symbols: Vec<String>,
    pub price_keywords: Vec<String>,
    pub trend_keywords: Vec<String>,
    pub news_keywords: Vec<String>,
    /// Length of the range a trend query gets when it names no time
    pub trend_default_days: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_ticker: "BTCUSDT".to_string(),
            quote_currency: "USDT".to_string(),
            known_symbols: strings(&["BTC", "ETH", "BNB", "SOL", "ADA", "DOT", "MATIC", "LINK"]),
            price_keywords: strings(&["giá", "price", "bao nhiêu", "how much"]),
            trend_keywords: strings(&["xu hướng", "trend", "phân tích", "analyze", "biến động"]),
            news_keywords: strings(&["tin tức", "news", "sentiment", "tâm lý"]),
            trend_default_days: 7,
        }
    }
}

/// Structured lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Candle granularity used for every structured lookup
    pub lookup_interval: Interval,
    /// Number of candles in the "market overview" window (288 x 5m = 24h)
    pub overview_window: usize,
    /// Cache single-day results for days that are already closed
    pub cache_closed_days: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            lookup_interval: Interval::FiveMinutes,
            overview_window: 288,
            cache_closed_days: true,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "multilingual-e5-base".to_string(),
            batch_size: 32,
        }
    }
}

/// HNSW index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    pub max_elements: usize,
    /// Collections opened at start-up
    pub enabled_collections: Vec<CollectionKind>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            vector_dim: 768,
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 64,
            max_elements: 100_000,
            enabled_collections: CollectionKind::ALL.to_vec(),
        }
    }
}

/// Hybrid retrieval and reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Collections searched when the caller names none
    pub default_collections: Vec<CollectionKind>,
    pub top_k: usize,
    /// Candidate pool kept for reranking, as a multiple of `top_k`
    pub candidate_multiplier: usize,
    /// Per-collection query timeout
    pub collection_timeout_ms: u64,
    /// Weight of the query/document token overlap in the keyword boost
    pub keyword_weight: f32,
    pub news_boost: f32,
    pub price_boost: f32,
    pub news_boost_keywords: Vec<String>,
    pub price_boost_keywords: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_collections: vec![CollectionKind::News, CollectionKind::Analysis],
            top_k: 5,
            candidate_multiplier: 2,
            collection_timeout_ms: 5_000,
            keyword_weight: 0.3,
            news_boost: 1.2,
            price_boost: 1.25,
            news_boost_keywords: strings(&["news", "tin tức"]),
            price_boost_keywords: strings(&["giá", "price"]),
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    /// Base URL of an OpenAI-compatible `chat/completions` endpoint
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Number of stored turns replayed to the generator
    pub history_window: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "cerebras".to_string(),
            base_url: "https://api.cerebras.ai/v1".to_string(),
            api_key_env: "CEREBRAS_API".to_string(),
            model: "gpt-oss-120b".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 60,
            history_window: 10,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CRYPTORAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CRYPTORAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENABLED" => self.llm.enabled = parse_env(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_env(path, value)?,
            "LLM__MAX_TOKENS" => self.llm.max_tokens = parse_env(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "RESOLVER__DEFAULT_TICKER" => self.resolver.default_ticker = value.to_uppercase(),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("cryptorag").join("config.toml"))
    }

    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RagError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
