use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Public aviationweather.gov dataserver dump of all current METARs.
pub const DEFAULT_FEED_URL: &str =
    "https://aviationweather.gov/adds/dataserver_current/current/metars.cache.csv";

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 0;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 5000;
pub const DEFAULT_REFRESH_SECS: u64 = 300;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// All errors joined into one line, empty when valid
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Settings for one cache instance.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// CSV feed to poll
    pub feed_url: String,

    /// Timeout for a single retrieval attempt
    pub fetch_timeout_ms: u64,

    /// Attempts per refresh cycle before the cycle is given up
    pub max_attempts: u32,

    /// Delay before the second attempt, doubled for each further one.
    /// Zero means attempts follow each other immediately.
    pub retry_delay_ms: u64,

    /// Upper bound for the backoff delay
    pub max_retry_delay_ms: u64,

    /// Period between refresh cycles
    pub refresh_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }
}

impl CacheConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Load configuration from the user config directory, using defaults
    /// when no file exists there.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.feed_url, "feed_url", &mut result);

        if self.fetch_timeout_ms == 0 {
            result.add_error("fetch_timeout_ms", "Fetch timeout must be greater than 0");
        }

        if self.max_attempts == 0 {
            result.add_error("max_attempts", "At least one fetch attempt is required");
        } else if self.max_attempts > 20 {
            result.add_warning(
                "max_attempts",
                "More than 20 attempts per cycle can delay refreshes considerably",
            );
        }

        if self.refresh_secs == 0 {
            result.add_error("refresh_secs", "Refresh period must be greater than 0");
        } else {
            let worst_case = self.fetch_timeout_ms.saturating_mul(u64::from(self.max_attempts));
            if worst_case > self.refresh_secs.saturating_mul(1000) {
                result.add_warning(
                    "fetch_timeout_ms",
                    "A cycle exhausting all attempts outlasts the refresh period",
                );
            }
        }

        if self.retry_delay_ms > self.max_retry_delay_ms {
            result.add_warning(
                "retry_delay_ms",
                "Retry delay exceeds max_retry_delay_ms and will be capped",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("metar");

        Ok(config_dir.join("config.toml"))
    }
}
