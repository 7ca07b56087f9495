// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Recollect memory pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use recollect_core::{ConfidenceLevel, TruncationStrategy};
use serde::{Deserialize, Serialize};

/// Top-level Recollect configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecollectConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Conversation end detection.
    #[serde(default)]
    pub boundary: BoundaryConfig,

    /// Memory extraction from sealed transcripts.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Vector retrieval and deduplication.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Relevance scoring.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Token budget for injected memories.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// LLM and embedding provider endpoint.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "recollect".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Thresholds used to decide that a conversation has ended.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BoundaryConfig {
    /// Seconds without a new turn before a conversation is considered idle.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// A conversation with this many messages is sealed.
    #[serde(default = "default_turn_limit")]
    pub turn_limit: usize,

    /// Similarity between the last message and the running topic centroid
    /// below which the topic is considered shifted. `0.0` disables the trigger.
    #[serde(default)]
    pub topic_shift_threshold: f64,

    /// Prior messages required before the topic-shift trigger is consulted.
    #[serde(default = "default_topic_shift_min_messages")]
    pub topic_shift_min_messages: usize,

    /// Messages whose trimmed content equals (case-insensitively) or ends
    /// with one of these markers close the conversation.
    #[serde(default = "default_close_markers")]
    pub close_markers: Vec<String>,

    /// How often the background sweeper looks for idle conversations.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            turn_limit: default_turn_limit(),
            topic_shift_threshold: 0.0,
            topic_shift_min_messages: default_topic_shift_min_messages(),
            close_markers: default_close_markers(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_turn_limit() -> usize {
    50
}

fn default_topic_shift_min_messages() -> usize {
    6
}

fn default_close_markers() -> Vec<String> {
    vec!["/end".to_string(), "/bye".to_string()]
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Memory extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Model used for extraction calls.
    #[serde(default = "default_extraction_model")]
    pub model: String,

    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,

    /// Memories below this confidence level are discarded.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: ConfidenceLevel,

    /// Upper bound on memories kept from one transcript.
    #[serde(default = "default_max_memories_per_transcript")]
    pub max_memories_per_transcript: usize,

    /// Background extraction workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending extraction jobs before `enqueue` applies backpressure.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: default_extraction_model(),
            max_tokens: default_extraction_max_tokens(),
            confidence_floor: default_confidence_floor(),
            max_memories_per_transcript: default_max_memories_per_transcript(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_extraction_max_tokens() -> u32 {
    1024
}

fn default_confidence_floor() -> ConfidenceLevel {
    ConfidenceLevel::Medium
}

fn default_max_memories_per_transcript() -> usize {
    20
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

/// Retrieval and deduplication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Nearest neighbours requested per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates below this cosine similarity are not returned (0.0-1.0).
    #[serde(default)]
    pub min_similarity: f64,

    /// Candidates at or above this similarity to a cluster canonical are merged into it.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Deadline for the retrieval step of context assembly, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: 0.0,
            dedup_threshold: default_dedup_threshold(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

fn default_top_k() -> usize {
    20
}

fn default_dedup_threshold() -> f64 {
    0.9
}

fn default_deadline_ms() -> u64 {
    1500
}

/// Relevance scoring weights and factor parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfig {
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    #[serde(default = "default_frequency_weight")]
    pub frequency_weight: f64,

    #[serde(default = "default_category_weight")]
    pub category_weight: f64,

    /// Hours after which the recency factor halves.
    #[serde(default = "default_recency_half_life_hours")]
    pub recency_half_life_hours: f64,

    /// Access count at which the frequency factor reaches 0.5.
    #[serde(default = "default_frequency_saturation")]
    pub frequency_saturation: f64,

    /// Per-category importance overrides, keyed by category name.
    #[serde(default)]
    pub category_table: BTreeMap<String, f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            similarity_weight: default_similarity_weight(),
            recency_weight: default_recency_weight(),
            frequency_weight: default_frequency_weight(),
            category_weight: default_category_weight(),
            recency_half_life_hours: default_recency_half_life_hours(),
            frequency_saturation: default_frequency_saturation(),
            category_table: BTreeMap::new(),
        }
    }
}

fn default_similarity_weight() -> f64 {
    0.55
}

fn default_recency_weight() -> f64 {
    0.2
}

fn default_frequency_weight() -> f64 {
    0.1
}

fn default_category_weight() -> f64 {
    0.15
}

fn default_recency_half_life_hours() -> f64 {
    168.0
}

fn default_frequency_saturation() -> f64 {
    5.0
}

/// Which token counter the budget manager uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// `cl100k_base` BPE via tiktoken.
    #[default]
    Cl100k,
    /// Roughly four characters per token.
    Heuristic,
}

/// Token budget for injected memories.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    #[serde(default = "default_budget_max_tokens")]
    pub max_tokens: usize,

    #[serde(default)]
    pub strategy: TruncationStrategy,

    #[serde(default)]
    pub tokenizer: TokenizerKind,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_budget_max_tokens(),
            strategy: TruncationStrategy::default(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

fn default_budget_max_tokens() -> usize {
    1024
}

/// OpenAI-compatible provider endpoint used for both chat and embeddings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Falls back to the `OPENAI_API_KEY` environment variable when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Timeout for a single HTTP request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Bounded exponential backoff for provider calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the turn log and the vector index.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory where sealed transcripts are written as JSON files.
    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            transcripts_dir: default_transcripts_dir(),
        }
    }
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|p| p.join("recollect"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

fn default_database_path() -> String {
    data_dir().join("recollect.db").to_string_lossy().into_owned()
}

fn default_transcripts_dir() -> String {
    data_dir().join("transcripts").to_string_lossy().into_owned()
}
