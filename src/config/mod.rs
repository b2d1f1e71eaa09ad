//! Configuration for scrapewatch

mod dashboard;
mod logging;
mod queue;
mod remote;

pub use dashboard::{DashboardConfig, HttpConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use queue::QueueConfig;
pub use remote::{RemoteConfig, PLACEHOLDER_API_KEY};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote scraping service
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Queue store
    #[serde(default)]
    pub queue: QueueConfig,
    /// Dashboard behavior
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// HTTP API server
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.remote.api_url.is_empty() {
            errors.push("remote api_url must not be empty".to_string());
        } else if url::Url::parse(&self.remote.api_url).is_err() {
            errors.push(format!("remote api_url '{}' is not a valid URL", self.remote.api_url));
        }
        if self.remote.formats.is_empty() {
            errors.push("remote formats must not be empty".to_string());
        }
        if self.remote.crawl_limit == 0 {
            errors.push("remote crawl_limit must be positive".to_string());
        }
        if self.remote.probe_timeout_secs == 0
            || self.remote.scrape_timeout_secs == 0
            || self.remote.crawl_timeout_secs == 0
        {
            errors.push("remote timeouts must be positive".to_string());
        }

        if self.queue.url.is_empty() {
            errors.push("queue url must not be empty".to_string());
        }
        if self.queue.bull_prefix.is_empty() || self.queue.crawl_prefix.is_empty() {
            errors.push("queue key prefixes must not be empty".to_string());
        }

        if self.dashboard.display_limit == 0 {
            errors.push("dashboard display_limit must be positive".to_string());
        }
        if self.dashboard.remote_lookup_limit == 0 {
            errors.push("dashboard remote_lookup_limit must be positive".to_string());
        }

        if self.http.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "http listen_addr '{}' is not a valid socket address",
                self.http.listen_addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Configuration errors:\n  - {}", errors.join("\n  - ")))
        }
    }

    /// Serialize the default configuration as a TOML document.
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.remote.api_url, "http://localhost:3002");
        assert_eq!(config.dashboard.display_limit, 50);
        assert_eq!(config.dashboard.remote_lookup_limit, 20);
        assert!(!config.remote.has_api_key());
    }

    #[test]
    fn validation_collects_all_errors() {
        let mut config = Config::default();
        config.remote.api_url = String::new();
        config.dashboard.display_limit = 0;
        config.http.listen_addr = "nonsense".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("api_url"));
        assert!(err.contains("display_limit"));
        assert!(err.contains("listen_addr"));
    }

    #[test]
    fn placeholder_key_disables_auth() {
        let mut config = Config::default();
        assert!(!config.remote.has_api_key());
        config.remote.api_key = "fc-test-123".to_string();
        assert!(config.remote.has_api_key());
    }

    #[test]
    fn default_toml_round_trips() {
        let text = Config::default_toml().unwrap();
        let config: Config = toml::from_str(&text).unwrap();
        config.validate().unwrap();
    }
}
