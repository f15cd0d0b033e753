//! Configuration types for weeb-dl

use crate::error::{Error, Result};
use crate::types::ArtifactForm;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`WeebClient`](crate::WeebClient)
///
/// Every field has a default, so `Config::default()` works out of the box and
/// partial JSON/TOML documents deserialize cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Upstream site root (default: "https://weebcentral.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP transport settings (timeouts, client identity)
    #[serde(default)]
    pub transport: TransportConfig,

    /// Retry behavior for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Download behavior (destination, concurrency budgets, artifact form)
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            transport: TransportConfig::default(),
            retry: RetryConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.page_concurrency == 0 {
            return Err(Error::Config {
                message: "page_concurrency must be at least 1".to_string(),
                key: Some("page_concurrency".to_string()),
            });
        }
        if self.download.chapter_concurrency == 0 {
            return Err(Error::Config {
                message: "chapter_concurrency must be at least 1".to_string(),
                key: Some("chapter_concurrency".to_string()),
            });
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be a finite number >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("backoff_multiplier".to_string()),
            });
        }
        let base = url::Url::parse(&self.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url '{}': {}", self.base_url, e),
            key: Some("base_url".to_string()),
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("base_url '{}' cannot be used as a base", self.base_url),
                key: Some("base_url".to_string()),
            });
        }
        Ok(())
    }
}

/// How often the randomized client identity (User-Agent) changes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRotation {
    /// Fresh identity on every request (default)
    #[default]
    PerRequest,
    /// One identity picked when the client is built
    PerSession,
}

/// HTTP transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// Client identity rotation policy
    #[serde(default)]
    pub identity: IdentityRotation,

    /// User-Agent pool to draw from (empty = built-in browser pool)
    #[serde(default)]
    pub user_agents: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            identity: IdentityRotation::default(),
            user_agents: Vec::new(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 8 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
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

/// What to do when a chapter's combined document already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingArtifact {
    /// Replace it atomically with the fresh download (default)
    #[default]
    Overwrite,
    /// Keep it and skip the chapter entirely
    Skip,
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination root (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Concurrent page fetches within one chapter (default: 4)
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Concurrent chapters in a batch download (default: 2)
    #[serde(default = "default_chapter_concurrency")]
    pub chapter_concurrency: usize,

    /// Artifact form used when the caller does not pick one
    #[serde(default)]
    pub default_form: ArtifactForm,

    /// Handling of an already-present combined document
    #[serde(default)]
    pub existing: ExistingArtifact,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            page_concurrency: default_page_concurrency(),
            chapter_concurrency: default_chapter_concurrency(),
            default_form: ArtifactForm::default(),
            existing: ExistingArtifact::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://weebcentral.com".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_page_concurrency() -> usize {
    4
}

fn default_chapter_concurrency() -> usize {
    2
}

// Duration serialization helper (milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
