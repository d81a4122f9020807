use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::ConfigError;
use crate::poller::PollConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedStreamConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub streams: StreamsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamsConfig {
    pub page_size: usize,
    pub update_interval_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://public-api.wordpress.com/rest/v1.2/".into(),
            request_timeout_seconds: 10,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            page_size: 7,
            update_interval_seconds: 60,
        }
    }
}

impl ApiConfig {
    /// Base url with a trailing slash so endpoint paths join beneath it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_owned();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl StreamsConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.update_interval_seconds.max(1)),
        }
    }
}

impl FeedStreamConfig {
    /// `<config dir>/feed-stream/config.json`
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("feed-stream").join("config.json"))
    }

    /// Loads the user config, falling back to defaults when it is missing or broken.
    pub fn load() -> Self {
        let path = match Self::config_file_path() {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "using default configuration");
                return Self::default();
            }
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // atomic write
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_file_path()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "feed_stream_config_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir.join("config.json")
    }

    #[test]
    fn save_then_load_keeps_values() {
        let path = temp_path("roundtrip");
        let mut config = FeedStreamConfig::default();
        config.streams.page_size = 20;
        config.api.retry_attempts = 0;

        config.save_to(&path).unwrap();
        let loaded = FeedStreamConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "streams": { "page_size": 3 } }"#).unwrap();

        let loaded = FeedStreamConfig::load_from(&path).unwrap();
        assert_eq!(loaded.streams.page_size, 3);
        assert_eq!(loaded.streams.update_interval_seconds, 60);
        assert_eq!(loaded.api, ApiConfig::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            FeedStreamConfig::load_from(&path),
            Err(ConfigError::Json(_))
        ));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let api = ApiConfig {
            base_url: "http://localhost:8080/rest".into(),
            ..ApiConfig::default()
        };
        let url = api.base_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/rest/");
        assert_eq!(
            url.join("read/following").unwrap().path(),
            "/rest/read/following"
        );
    }
}
