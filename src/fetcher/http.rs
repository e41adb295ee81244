//! Atlas HTTP client helper module
//!
//! Provides the single GET primitive every Atlas request goes through:
//! - Shared rate limit integration
//! - Optional API key injection
//! - Status and body classification into [`FetcherError`]
//!
//! No retry loop here: retrying a half-consumed
//! pagination sequence is decided above this layer.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::fetcher::atlas_config::AtlasConfig;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::harvester::rate_limit::RateLimiter;
use crate::metrics::record_http_request;

/// Maximum number of body bytes kept in an error message
const ERROR_BODY_LIMIT: usize = 512;

/// HTTP client for Atlas API interactions
///
/// Owns its `reqwest::Client`: each worker builds its own instance so no
/// connection state is shared between workers.
pub struct AtlasHttpClient {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: Option<String>,
}

impl AtlasHttpClient {
    /// Create a new HTTP client
    ///
    /// # Arguments
    /// * `client` - Underlying reqwest client
    /// * `rate_limiter` - Shared rate limiter (Arc for global quota enforcement)
    /// * `api_key` - Optional Atlas API key
    pub fn new(client: Client, rate_limiter: Arc<RateLimiter>, api_key: Option<String>) -> Self {
        Self {
            client,
            rate_limiter,
            api_key,
        }
    }

    /// Build a client with the timeouts from `config`
    ///
    /// # Errors
    /// Returns `FetcherError::Network` if the TLS backend cannot be initialised
    pub fn from_config(config: &AtlasConfig, rate_limiter: Arc<RateLimiter>) -> FetcherResult<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetcherError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::new(client, rate_limiter, config.api_key.clone()))
    }

    /// Execute a GET request against an absolute URL and decode the JSON body
    ///
    /// # Arguments
    /// * `url` - Absolute URL, possibly already carrying a query string
    /// * `params` - Additional query parameters
    ///
    /// # Errors
    /// - `HttpStatus` for any non-2xx response
    /// - `Network` when the request or body transfer fails
    /// - `Parse` when the body is not valid JSON for `T`
    pub async fn get_url<T>(&self, url: &str, params: &[(&str, String)]) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        self.rate_limiter
            .acquire(1)
            .await
            .map_err(|e| FetcherError::RateLimit(e.to_string()))?;

        let mut request = self.client.get(url).query(params);
        if let Some(key) = &self.api_key {
            // Cursor links already carry the first request's query
            if !carries_key(url) {
                request = request.query(&[("key", key.as_str())]);
            }
        }

        debug!("GET {} with {} params", url, params.len());
        let started = Instant::now();

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                record_http_request("network_error", started.elapsed());
                return Err(FetcherError::Network(e.to_string()));
            }
        };

        let status = response.status();
        record_http_request(status.as_str(), started.elapsed());

        let body = response
            .text()
            .await
            .map_err(|e| FetcherError::Network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(FetcherError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            FetcherError::Parse(format!("Failed to deserialize response from {url}: {e}"))
        })
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Whether `url` already has a `key` query parameter
fn carries_key(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| parsed.query_pairs().any(|(name, _)| name == "key"))
        .unwrap_or(false)
}
