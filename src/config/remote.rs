//! Remote scraping service configuration

use serde::{Deserialize, Serialize};

/// Placeholder key meaning "no authentication configured"
pub const PLACEHOLDER_API_KEY: &str = "dummy";

/// Configuration for the remote scraping/crawling service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the service (e.g. "http://localhost:3002")
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token; the placeholder value "dummy" disables auth
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Content formats requested on scrape/crawl
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    /// Default page limit passed to crawl requests
    #[serde(default = "default_crawl_limit")]
    pub crawl_limit: u32,
    /// Timeout for status lookups and the root liveness probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Timeout for the synthetic scrape in the full health check
    #[serde(default = "default_health_scrape_timeout")]
    pub health_scrape_timeout_secs: u64,
    /// Timeout for a single scrape unit
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
    /// Timeout for a single crawl unit
    #[serde(default = "default_crawl_timeout")]
    pub crawl_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:3002".to_string()
}

fn default_api_key() -> String {
    PLACEHOLDER_API_KEY.to_string()
}

fn default_formats() -> Vec<String> {
    vec!["markdown".to_string(), "html".to_string()]
}

fn default_crawl_limit() -> u32 {
    10
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_health_scrape_timeout() -> u64 {
    30
}

fn default_scrape_timeout() -> u64 {
    60
}

fn default_crawl_timeout() -> u64 {
    300
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: default_api_key(),
            formats: default_formats(),
            crawl_limit: default_crawl_limit(),
            probe_timeout_secs: default_probe_timeout(),
            health_scrape_timeout_secs: default_health_scrape_timeout(),
            scrape_timeout_secs: default_scrape_timeout(),
            crawl_timeout_secs: default_crawl_timeout(),
        }
    }
}

impl RemoteConfig {
    /// True when a real bearer token is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != PLACEHOLDER_API_KEY
    }
}
