//! Dashboard and HTTP adapter configuration

use serde::{Deserialize, Serialize};

/// Core dashboard behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Maximum records returned per job-list partition
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Maximum queue-discovered ids enriched via the remote API per poll
    #[serde(default = "default_remote_lookup_limit")]
    pub remote_lookup_limit: usize,
    /// Delay between units of one job, bounding load on the remote service
    #[serde(default = "default_unit_delay_ms")]
    pub unit_delay_ms: u64,
}

fn default_display_limit() -> usize {
    50
}

fn default_remote_lookup_limit() -> usize {
    20
}

fn default_unit_delay_ms() -> u64 {
    1000
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
            remote_lookup_limit: default_remote_lookup_limit(),
            unit_delay_ms: default_unit_delay_ms(),
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address for the HTTP server (e.g. "0.0.0.0:8000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Enable CORS (useful for browser-based clients)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_enabled: true,
        }
    }
}
