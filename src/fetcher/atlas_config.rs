//! Atlas API endpoint configuration
//!
//! Keeps the base URL, endpoint paths and client tuning in one place so the
//! fetcher can be pointed at a mock server in tests.

use std::time::Duration;

/// Default public API base URL
pub const DEFAULT_BASE_URL: &str = "https://atlas.ripe.net/api/v2";

/// Default page size requested from list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Configuration for the Atlas API fetcher
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Base URL without trailing slash (e.g., <https://atlas.ripe.net/api/v2>)
    pub base_url: String,

    /// Anchor listing path
    pub anchors_endpoint: String,

    /// Anchor measurement catalog path
    pub anchor_measurements_endpoint: String,

    /// Requested page size for list endpoints
    pub page_size: u32,

    /// Optional API key sent as `key` on every request
    pub api_key: Option<String>,

    /// Overall request timeout; `None` keeps the client default
    pub request_timeout: Option<Duration>,

    /// Connect timeout; `None` keeps the client default
    pub connect_timeout: Option<Duration>,
}

impl AtlasConfig {
    /// Configuration for a custom base URL with default paths
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Full URL of the anchor listing
    pub fn anchors_url(&self) -> String {
        format!("{}{}", self.base_url, self.anchors_endpoint)
    }

    /// Full URL of the anchor measurement catalog
    pub fn anchor_measurements_url(&self) -> String {
        format!("{}{}", self.base_url, self.anchor_measurements_endpoint)
    }

    /// Full URL of one measurement's results
    pub fn results_url(&self, measurement_id: u64) -> String {
        format!("{}/measurements/{}/results/", self.base_url, measurement_id)
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            anchors_endpoint: "/anchors/".to_string(),
            anchor_measurements_endpoint: "/anchor-measurements/".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            api_key: None,
            request_timeout: None,
            connect_timeout: None,
        }
    }
}
