//! Configuration management for siteprobe
//!
//! Settings load from environment variables with sensible defaults.
//!
//! # Environment Variables
//!
//! - `SITEPROBE_STATE_DIR`: Directory for checkpoints, the crawl queue and
//!   finding files - default: platform data dir + "siteprobe"
//! - `SITEPROBE_MAX_PAGES`: Crawl page budget - default: "50"
//! - `SITEPROBE_MAX_DEPTH`: Crawl depth limit - default: "5"
//! - `SITEPROBE_MAX_PER_PATTERN`: Visits per route pattern - default: "3"
//! - `SITEPROBE_RATE_LIMIT_MS`: Delay between page visits - default: "500"
//! - `SITEPROBE_CRAWL_TIMEOUT_SECS`: Crawl wall-clock budget - default: "300"
//! - `SITEPROBE_TOTAL_BUDGET`: Total executor cost budget - default: "100"
//! - `SITEPROBE_VERIFY_ATTEMPTS`: Reproduction attempts - default: "3"
//! - `SITEPROBE_LOG_LEVEL`: Logging level - default: "info"
//! - `SITEPROBE_LOG_JSON`: JSON log output (true|false) - default: "false"

use crate::crawl::CrawlOptions;
use crate::findings::VerifyOptions;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_PAGES: usize = 50;
const DEFAULT_MAX_DEPTH: u32 = 5;
const DEFAULT_MAX_PER_PATTERN: u32 = 3;
const DEFAULT_RATE_LIMIT_MS: u64 = 500;
const DEFAULT_CRAWL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TOTAL_BUDGET: f64 = 100.0;
const DEFAULT_VERIFY_ATTEMPTS: u32 = 3;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration value
    #[error("failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration structure for siteprobe
#[derive(Debug, Clone)]
pub struct SiteprobeConfig {
    /// Directory holding all durable audit state
    pub state_dir: PathBuf,

    pub max_pages: usize,
    pub max_depth: u32,
    pub max_per_pattern: u32,
    pub rate_limit_ms: u64,
    pub crawl_timeout_secs: u64,

    /// Total executor cost budget across all delegated phases
    pub total_budget: f64,

    pub verify_attempts: u32,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for SiteprobeConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_per_pattern: DEFAULT_MAX_PER_PATTERN,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            crawl_timeout_secs: DEFAULT_CRAWL_TIMEOUT_SECS,
            total_budget: DEFAULT_TOTAL_BUDGET,
            verify_attempts: DEFAULT_VERIFY_ATTEMPTS,
            log_level: "info".to_string(),
        }
    }
}

impl SiteprobeConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(dir) = env::var("SITEPROBE_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        config.max_pages = parse_env("SITEPROBE_MAX_PAGES", config.max_pages)?;
        config.max_depth = parse_env("SITEPROBE_MAX_DEPTH", config.max_depth)?;
        config.max_per_pattern =
            parse_env("SITEPROBE_MAX_PER_PATTERN", config.max_per_pattern)?;
        config.rate_limit_ms = parse_env("SITEPROBE_RATE_LIMIT_MS", config.rate_limit_ms)?;
        config.crawl_timeout_secs =
            parse_env("SITEPROBE_CRAWL_TIMEOUT_SECS", config.crawl_timeout_secs)?;
        config.total_budget = parse_env("SITEPROBE_TOTAL_BUDGET", config.total_budget)?;
        config.verify_attempts =
            parse_env("SITEPROBE_VERIFY_ATTEMPTS", config.verify_attempts)?;
        if let Ok(level) = env::var("SITEPROBE_LOG_LEVEL") {
            config.log_level = level;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_pages must be at least 1".to_string(),
            ));
        }
        if self.max_per_pattern == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_per_pattern must be at least 1".to_string(),
            ));
        }
        if self.total_budget < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "total_budget must not be negative".to_string(),
            ));
        }
        if self.verify_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "verify_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions::new()
            .with_max_pages(self.max_pages)
            .with_max_depth(self.max_depth)
            .with_timeout(Duration::from_secs(self.crawl_timeout_secs))
            .with_rate_limit(Duration::from_millis(self.rate_limit_ms))
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions::new().with_max_attempts(self.verify_attempts)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("siteprobe")
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            field: name.to_string(),
            error: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
