//! Configuration types for course-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};

/// Content API connection settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the content API; endpoint paths are joined onto it
    /// (default: "http://localhost:8080/api/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer credential supplied by the host environment (None = anonymous)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request transport timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Build API settings from the environment
    ///
    /// Reads `COURSE_SYNC_API_URL`, `COURSE_SYNC_API_TOKEN` and `COURSE_SYNC_TIMEOUT_SECS`.
    /// Unset or blank variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("COURSE_SYNC_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.base_url);
        let auth_token = env::var("COURSE_SYNC_API_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let timeout = env::var("COURSE_SYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            base_url,
            auth_token,
            timeout,
            user_agent: defaults.user_agent,
        }
    }
}

/// Batch mutation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of actions dispatched concurrently per group (default: 5)
    #[serde(default = "default_batch_width")]
    pub width: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            width: default_batch_width(),
        }
    }
}

/// Retry configuration for transient read failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    ///
    /// Stored as `initial_delay_ms`, in milliseconds.
    #[serde(
        rename = "initial_delay_ms",
        default = "default_initial_delay",
        with = "duration_millis_serde"
    )]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    ///
    /// Stored as `max_delay_ms`, in milliseconds.
    #[serde(
        rename = "max_delay_ms",
        default = "default_max_delay",
        with = "duration_millis_serde"
    )]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for [`CourseSync`](crate::CourseSync)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Content API connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Batch mutation settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry policy for idempotent reads
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config {
            message: format!("invalid configuration: {e}"),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {e}", path.display()),
            key: None,
        })?;
        Self::from_json_str(&raw)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| Error::Config {
            message: format!("base_url {:?} is not a valid URL: {e}", self.api.base_url),
            key: Some("api.base_url".to_string()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base_url must use http or https, got {}", url.scheme()),
                key: Some("api.base_url".to_string()),
            });
        }
        if self.batch.width == 0 {
            return Err(Error::Config {
                message: "batch width must be at least 1".to_string(),
                key: Some("batch.width".to_string()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be a finite number of at least 1.0, got {multiplier}"
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("course-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_batch_width() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
