//! Queue store configuration

use serde::{Deserialize, Serialize};

/// Configuration for the Bull-style Redis queue store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Redis connection URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Key prefix for queue buckets (`{prefix}:{queue}:{bucket}`)
    #[serde(default = "default_bull_prefix")]
    pub bull_prefix: String,
    /// Key prefix for crawl job entities (`{prefix}:{uuid}`)
    #[serde(default = "default_crawl_prefix")]
    pub crawl_prefix: String,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_bull_prefix() -> String {
    "bull".to_string()
}

fn default_crawl_prefix() -> String {
    "crawl".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bull_prefix: default_bull_prefix(),
            crawl_prefix: default_crawl_prefix(),
        }
    }
}
