//! Layered configuration: built-in defaults, optional file, environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::RetryConfig;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
    pub batch: BatchConfig,
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

/// Retrieval client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum spacing between E-utilities requests, in milliseconds.
    /// NCBI allows 3 requests/second without an API key; 340ms keeps a
    /// safety margin below that.
    pub min_request_interval_ms: u64,

    /// Total attempts per request (first try plus retries)
    pub max_attempts: u32,

    /// First backoff delay, in milliseconds
    pub backoff_base_ms: u64,

    /// Multiplier applied per additional retry
    pub backoff_factor: f64,

    /// Backoff ceiling, in milliseconds
    pub backoff_max_ms: u64,

    /// Deadline for a single request attempt, in seconds
    pub attempt_timeout_secs: u64,

    /// Contact address sent with every request, per NCBI usage policy
    pub email: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 340,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_factor: 2.0,
            backoff_max_ms: 30_000,
            attempt_timeout_secs: 10,
            email: "bioanalyzer@example.com".to_string(),
        }
    }
}

impl RetrievalConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// TTL for retrieved paper records, in seconds
    pub record_ttl_secs: u64,

    /// TTL for analysis results, in seconds
    pub analysis_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            record_ttl_secs: 86_400,
            analysis_ttl_secs: 86_400,
        }
    }
}

impl CacheConfig {
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn analysis_ttl(&self) -> Duration {
        Duration::from_secs(self.analysis_ttl_secs)
    }
}

/// Extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum model confidence for an extraction to be accepted.
    /// At-threshold values pass.
    pub confidence_threshold: f64,

    /// Deadline for one model call, in seconds
    pub field_timeout_secs: u64,

    /// Model identifier passed to the generateContent endpoint
    pub model: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            field_timeout_secs: 30,
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn field_timeout(&self) -> Duration {
        Duration::from_secs(self.field_timeout_secs)
    }
}

/// Batch processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Papers processed concurrently
    pub max_concurrent: usize,

    /// Overall batch deadline, in seconds; absent means no deadline
    pub timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_secs: None,
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Secrets, sourced from the environment only (never from config files).
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub ncbi: Option<String>,
    pub gemini: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            ncbi: std::env::var("NCBI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `BIOANALYZER_`-prefixed environment variables (e.g.
    /// `BIOANALYZER_BATCH__MAX_CONCURRENT=10`). API keys come from their own
    /// environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(
                config::File::with_name("bioanalyzer").required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BIOANALYZER").separator("__"),
        );

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.api_keys = ApiKeys::from_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.extraction.confidence_threshold) {
            return Err(config::ConfigError::Message(format!(
                "extraction.confidence_threshold must be within [0, 1], got {}",
                self.extraction.confidence_threshold
            )));
        }
        if self.retrieval.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "retrieval.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retrieval.backoff_factor < 1.0 {
            return Err(config::ConfigError::Message(format!(
                "retrieval.backoff_factor must be at least 1.0, got {}",
                self.retrieval.backoff_factor
            )));
        }
        if self.batch.max_concurrent == 0 {
            return Err(config::ConfigError::Message(
                "batch.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
