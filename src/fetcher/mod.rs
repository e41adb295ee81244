//! Upstream measurement API access
//!
//! Everything that talks to the remote archive lives here: the rate-limited
//! HTTP client, the cursor pagination helpers, the response parsers and the
//! [`MeasurementSource`] implementation for the RIPE Atlas v2 API.

use crate::{Anchor, MeasurementRef};
use async_trait::async_trait;
use serde::Deserialize;

pub mod atlas;
pub mod atlas_config;
pub mod atlas_parser;
pub mod http;
pub mod pagination;

pub use atlas::AtlasFetcher;
pub use atlas_config::AtlasConfig;

/// Fetcher errors
///
/// Every variant is a transport-level failure from the point of view of the
/// retry supervisor: the request may succeed if the whole batch is re-run.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Requested URL
        url: String,
        /// Truncated response body
        body: String,
    },

    /// Connection, TLS or timeout failure
    #[error("network error: {0}")]
    Network(String),

    /// Response body is not the expected JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Response is JSON but structurally unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local request budget could not be acquired
    #[error("rate limiter error: {0}")]
    RateLimit(String),
}

impl FetcherError {
    /// Whether re-running the failed work may succeed
    ///
    /// Malformed JSON is treated the same as a dropped connection: archive
    /// endpoints occasionally return truncated bodies under load.
    pub fn is_transient(&self) -> bool {
        match self {
            FetcherError::HttpStatus { .. }
            | FetcherError::Network(_)
            | FetcherError::Parse(_)
            | FetcherError::InvalidResponse(_)
            | FetcherError::RateLimit(_) => true,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One probe's result object from a measurement results download
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeResult {
    /// Source probe id
    pub prb_id: u32,
    /// Individual ping replies; timeouts and errors carry no `rtt`
    #[serde(default)]
    pub result: Vec<PingReply>,
}

impl ProbeResult {
    /// RTT values of the successful replies, in arrival order
    pub fn rtts(&self) -> impl Iterator<Item = f64> + '_ {
        self.result.iter().filter_map(|reply| reply.rtt)
    }
}

/// A single ping reply inside a [`ProbeResult`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingReply {
    /// Round-trip time in milliseconds, absent for lost packets
    #[serde(default)]
    pub rtt: Option<f64>,
}

/// Source of catalog and measurement data
///
/// The Atlas API is the production implementation; tests substitute
/// in-memory sources to observe exactly which requests are issued.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// List every usable anchor in the archive
    async fn list_anchors(&self) -> FetcherResult<Vec<Anchor>>;

    /// Scan the anchor measurement catalog for ping measurements
    ///
    /// # Returns
    /// `(target anchor id, measurement)` pairs whose target is in `anchor_ids`,
    /// in catalog order
    async fn list_ping_measurements(
        &self,
        anchor_ids: &[u32],
    ) -> FetcherResult<Vec<(u32, MeasurementRef)>>;

    /// Fetch recent results of one measurement for a set of source probes
    ///
    /// # Arguments
    /// * `measurement` - Measurement to read
    /// * `start` - Earliest result timestamp (Unix seconds)
    /// * `probe_ids` - Source probes to include, sent as one batched request
    async fn fetch_results(
        &self,
        measurement: MeasurementRef,
        start: i64,
        probe_ids: &[u32],
    ) -> FetcherResult<Vec<ProbeResult>>;
}
