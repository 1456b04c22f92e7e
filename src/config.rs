//! Configuration types for scoretrack

use crate::error::{Error, Result};
use crate::types::SubmitOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted by [`Config::from_env`] for the base URL
pub const BASE_URL_ENV: &str = "SCORETRACK_BASE_URL";

/// Tracker configuration
///
/// Every field has a sensible default; `Config::default()` talks to a local
/// backend on port 8000 and polls every five seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the processing backend (default: "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Interval between polling ticks (default: 5 s)
    #[serde(default = "default_poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,

    /// Timeout for status and result fetches (default: 30 s)
    ///
    /// A stalled poll surfaces as a network error instead of delaying the
    /// task's next transition indefinitely.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Timeout for uploads, which carry large bodies (default: 10 min)
    #[serde(default = "default_upload_timeout", with = "duration_secs")]
    pub upload_timeout: Duration,

    /// Submission options applied when an upload does not set them explicitly
    #[serde(default)]
    pub default_options: SubmitOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
            upload_timeout: default_upload_timeout(),
            default_options: SubmitOptions::default(),
        }
    }
}

impl Config {
    /// Default configuration with the base URL taken from the environment
    ///
    /// Reads [`BASE_URL_ENV`]; falls back to the built-in default when unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url {:?}: {e}", self.base_url),
            key: Some("base_url".to_string()),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base_url must be http or https, got {:?}", parsed.scheme()),
                key: Some("base_url".to_string()),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config {
                message: "poll_interval must be greater than zero".to_string(),
                key: Some("poll_interval".to_string()),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request_timeout must be greater than zero".to_string(),
                key: Some("request_timeout".to_string()),
            });
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed, for path joining
    pub(crate) fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Serialize durations as whole seconds for human-editable config files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
