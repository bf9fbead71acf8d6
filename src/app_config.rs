use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::GenerationError;
use crate::generation::client::MAX_TERMS_PER_REQUEST;
use crate::generation::orchestrator::OrchestratorOptions;
use crate::images::fetch::FetchMode;

/// Largest accepted `provider.retry_count`
pub const MAX_RETRY_COUNT: u32 = 10;

/// Application configuration module
/// This module handles loading, validating and saving the lexicard
/// configuration file. Every field has a default so partial files load.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Text-generation provider settings
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Key for the image search APIs
    #[serde(default)]
    pub image_api_key: Option<String>,

    /// Root of exported files, images, caches and logs
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Largest record count accepted per run
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    #[serde(default = "default_true")]
    pub image_enabled: bool,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Lifetime of cached term lists
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Image URLs are cached `cache_ttl_hours * image_cache_ttl_multiplier`
    #[serde(default = "default_image_cache_ttl_multiplier")]
    pub image_cache_ttl_multiplier: u64,

    #[serde(default = "default_max_concurrent_images")]
    pub max_concurrent_images: usize,

    #[serde(default)]
    pub image_fetch_mode: FetchMode,

    /// Pause between image requests in sequential mode
    #[serde(default = "default_sequential_delay_ms")]
    pub sequential_delay_ms: u64,

    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

// @struct: Settings of the text-generation backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderSettings {
    // @field: Model name
    #[serde(default = "default_model")]
    pub model: String,

    // @field: API key
    #[serde(default)]
    pub api_key: String,

    // @field: Base URL, empty for the public endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Attempts per generation request
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    // @field: Base backoff, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // @field: Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("./flashcards")
}

fn default_max_records() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_image_cache_ttl_multiplier() -> u64 {
    7
}

fn default_max_concurrent_images() -> usize {
    5
}

fn default_sequential_delay_ms() -> u64 {
    500
}

fn default_image_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_endpoint() -> String {
    crate::providers::gemini::DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(1..=100).contains(&self.max_records) {
            return Err(GenerationError::validation(
                "max_records",
                "max_records must be between 1 and 100",
            ));
        }
        if self.cache_ttl_hours == 0 {
            return Err(GenerationError::validation(
                "cache_ttl_hours",
                "cache_ttl_hours must be positive",
            ));
        }
        if self.image_cache_ttl_multiplier == 0 {
            return Err(GenerationError::validation(
                "image_cache_ttl_multiplier",
                "image_cache_ttl_multiplier must be positive",
            ));
        }
        if !(1..=20).contains(&self.max_concurrent_images) {
            return Err(GenerationError::validation(
                "max_concurrent_images",
                "max_concurrent_images must be between 1 and 20",
            ));
        }
        if !(1..=MAX_RETRY_COUNT).contains(&self.provider.retry_count) {
            return Err(GenerationError::validation(
                "provider.retry_count",
                format!("retry_count must be between 1 and {}", MAX_RETRY_COUNT),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(GenerationError::validation(
                "provider.timeout_secs",
                "timeout_secs must be positive",
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(GenerationError::validation(
                "provider.temperature",
                "temperature must be between 0.0 and 2.0",
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(GenerationError::validation("provider.model", "model cannot be empty"));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(GenerationError::validation(
                "output_directory",
                "output_directory cannot be empty",
            ));
        }

        Ok(())
    }

    /// Load `path`, writing a default file first if it does not exist
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path).context(format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .context(format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json).context(format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    pub fn terms_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 60 * 60)
    }

    pub fn image_cache_ttl(&self) -> Duration {
        self.terms_cache_ttl() * self.image_cache_ttl_multiplier as u32
    }

    pub fn image_dir(&self) -> PathBuf {
        self.output_directory.join("images")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.output_directory.join("cache")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_directory.join("logs")
    }

    /// Knobs handed to the orchestrator
    pub fn to_orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_records: self.max_records.min(MAX_TERMS_PER_REQUEST),
            cache_enabled: self.cache_enabled,
            image_enabled: self.image_enabled,
            fetch_mode: self.image_fetch_mode,
            max_concurrent_images: self.max_concurrent_images,
            sequential_delay: Duration::from_millis(self.sequential_delay_ms),
            output_directory: self.output_directory.clone(),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            provider: ProviderSettings::default(),
            image_api_key: None,
            output_directory: default_output_directory(),
            max_records: default_max_records(),
            image_enabled: true,
            cache_enabled: true,
            cache_ttl_hours: default_cache_ttl_hours(),
            image_cache_ttl_multiplier: default_image_cache_ttl_multiplier(),
            max_concurrent_images: default_max_concurrent_images(),
            image_fetch_mode: FetchMode::default(),
            sequential_delay_ms: default_sequential_delay_ms(),
            image_timeout_secs: default_image_timeout_secs(),
            log_level: LogLevel::default(),
        }
    }
}
