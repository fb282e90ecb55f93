//! # Soiree Config
//!
//! Unified single-file configuration management for Soiree.
//! A single `soiree.yaml` can configure the event bus, the complexity
//! router, the classifier keyword table, the dependency graph, and the
//! agent runtime retry policy.

mod loader;

pub use loader::{load_config, ConfigError, ConfigManager, ConfigWatcher};

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level configuration schema for Soiree.
#[derive(Debug, Clone, Deserialize)]
pub struct SoireeConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

fn default_version() -> u32 {
    1
}

impl Default for SoireeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            bus: BusConfig::default(),
            router: RouterSection::default(),
            classifier: ClassifierConfig::default(),
            graph: GraphConfig::default(),
            runtime: RuntimeSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "soiree".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Event bus capacities.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber buffered channel capacity.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Number of recent events retained for debugging.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_history_limit() -> usize {
    1_000
}

/// Complexity router scoring section.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSection {
    /// Score at or above this routes fast (0-100).
    #[serde(default = "default_cutoff")]
    pub cutoff: u8,
    /// Slow-path timeout in milliseconds.
    #[serde(default = "default_slow_path_timeout_ms")]
    pub slow_path_timeout_ms: u64,
    /// Inputs shorter than this count as "short".
    #[serde(default = "default_short_text_chars")]
    pub short_text_chars: usize,
    /// Inputs longer than this count as "very long".
    #[serde(default = "default_long_text_chars")]
    pub long_text_chars: usize,
    #[serde(default)]
    pub weights: WeightsSection,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            slow_path_timeout_ms: default_slow_path_timeout_ms(),
            short_text_chars: default_short_text_chars(),
            long_text_chars: default_long_text_chars(),
            weights: WeightsSection::default(),
        }
    }
}

fn default_cutoff() -> u8 {
    50
}

fn default_slow_path_timeout_ms() -> u64 {
    20_000
}

fn default_short_text_chars() -> usize {
    120
}

fn default_long_text_chars() -> usize {
    600
}

/// Signal weights for the router scoring algorithm.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightsSection {
    #[serde(default = "default_w_category")]
    pub explicit_category: i16,
    #[serde(default = "default_w_count")]
    pub explicit_count: i16,
    #[serde(default = "default_w_date_location")]
    pub explicit_date_or_location: i16,
    #[serde(default = "default_w_short")]
    pub short_text: i16,
    #[serde(default = "default_w_structured")]
    pub structured: i16,
    #[serde(default = "default_w_narrative")]
    pub narrative: i16,
    #[serde(default = "default_w_long")]
    pub long_text: i16,
    #[serde(default = "default_w_image")]
    pub image_description: i16,
}

impl Default for WeightsSection {
    fn default() -> Self {
        Self {
            explicit_category: default_w_category(),
            explicit_count: default_w_count(),
            explicit_date_or_location: default_w_date_location(),
            short_text: default_w_short(),
            structured: default_w_structured(),
            narrative: default_w_narrative(),
            long_text: default_w_long(),
            image_description: default_w_image(),
        }
    }
}

fn default_w_category() -> i16 {
    25
}

fn default_w_count() -> i16 {
    20
}

fn default_w_date_location() -> i16 {
    15
}

fn default_w_short() -> i16 {
    15
}

fn default_w_structured() -> i16 {
    10
}

fn default_w_narrative() -> i16 {
    25
}

fn default_w_long() -> i16 {
    15
}

fn default_w_image() -> i16 {
    20
}

/// Classifier keyword table: domain name to keyword list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub keywords: HashMap<String, Vec<String>>,
}

/// Static dependency graph between agent domains.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphConfig {
    /// Upstream domain to downstream domains that must rerun when it changes.
    #[serde(default)]
    pub edges: HashMap<String, Vec<String>>,
    /// Stable scheduling priority per domain; lower runs earlier.
    #[serde(default)]
    pub priority: HashMap<String, u32>,
}

/// Agent runtime execution policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Per-execution deadline in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Retry attempts for retryable failures.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base backoff delay in milliseconds (doubles per attempt).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            execution_timeout_ms: default_execution_timeout_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_execution_timeout_ms() -> u64 {
    30_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}
