// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that typos in
//! `keepsake.toml` are rejected at startup instead of silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Keepsake configuration.
///
/// Every section is optional and defaults to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeepsakeConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// LLM endpoint used for memory extraction.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding endpoint used for semantic search.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Extraction, consolidation and retrieval settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Decay, pruning and expiry settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("keepsake").join("keepsake.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("keepsake.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// OpenAI-compatible chat completion endpoint used for extraction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Bearer token. `None` sends no Authorization header (local servers).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for memory extraction.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum tokens the extraction call may generate.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// HTTP timeout for a single completion, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on 429/5xx at the HTTP client level. The memory layer itself never retries.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_llm_max_tokens() -> u32 {
    2048
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL up to and including the API version.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Bearer token. `None` sends no Authorization header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// HTTP timeout for a single embedding call, in seconds.
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Memory system configuration.
///
/// Controls when extraction runs, how duplicates are detected and how
/// memories are retrieved.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory system. When false, turns are accepted and dropped.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Seconds of conversation silence before buffered turns are extracted.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Upper bound on the extraction LLM call, in seconds.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Cosine similarity at or above which a candidate is compared against
    /// its nearest neighbor as a possible duplicate or contradiction.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,

    /// Vector collection shared with the knowledge subsystem.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Default number of memories injected into a prompt.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    /// Default minimum semantic score for retrieval (0.0-1.0).
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Lifetime of temporal memories whose expiry the LLM did not supply.
    #[serde(default = "default_temporal_ttl_days")]
    pub temporal_ttl_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            idle_timeout_secs: default_idle_timeout_secs(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            duplicate_threshold: default_duplicate_threshold(),
            collection: default_collection(),
            retrieval_limit: default_retrieval_limit(),
            min_score: default_min_score(),
            temporal_ttl_days: default_temporal_ttl_days(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    600 // 10 minutes
}

fn default_extraction_timeout_secs() -> u64 {
    60
}

fn default_duplicate_threshold() -> f32 {
    0.9
}

fn default_collection() -> String {
    "knowledge".to_string()
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.3
}

fn default_temporal_ttl_days() -> i64 {
    7
}

/// Maintenance job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Run the maintenance loop in the daemon.
    #[serde(default = "default_maintenance_enabled")]
    pub enabled: bool,

    /// Hours between maintenance runs.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Multiplier applied to the importance of memories untouched for a week.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Importance below which stale memories are pruned.
    #[serde(default = "default_min_importance")]
    pub min_importance: f64,

    /// Days without access after which a low-importance memory is pruned.
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,

    /// Days to keep superseded memories after their replacement was created.
    /// `None` keeps history forever.
    #[serde(default)]
    pub history_retention_days: Option<i64>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: default_maintenance_enabled(),
            interval_hours: default_interval_hours(),
            decay_factor: default_decay_factor(),
            min_importance: default_min_importance(),
            stale_days: default_stale_days(),
            history_retention_days: None,
        }
    }
}

fn default_maintenance_enabled() -> bool {
    true
}

fn default_interval_hours() -> u64 {
    24
}

fn default_decay_factor() -> f64 {
    0.95
}

fn default_min_importance() -> f64 {
    0.1
}

fn default_stale_days() -> i64 {
    90
}
