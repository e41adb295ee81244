//! RIPE Atlas v2 API fetcher
//!
//! Implements [`MeasurementSource`] on top of [`AtlasHttpClient`] and the
//! cursor pagination helpers.

use crate::fetcher::atlas_config::AtlasConfig;
use crate::fetcher::atlas_parser::AtlasParser;
use crate::fetcher::http::AtlasHttpClient;
use crate::fetcher::pagination::fetch_all;
use crate::fetcher::{FetcherResult, MeasurementSource, ProbeResult};
use crate::harvester::rate_limit::RateLimiter;
use crate::{Anchor, MeasurementRef};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Atlas API fetcher
pub struct AtlasFetcher {
    http: AtlasHttpClient,
    config: AtlasConfig,
}

impl AtlasFetcher {
    /// Create a fetcher with its own HTTP client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: AtlasConfig, rate_limiter: Arc<RateLimiter>) -> FetcherResult<Self> {
        let http = AtlasHttpClient::from_config(&config, rate_limiter)?;
        Ok(Self { http, config })
    }

    /// Get the base URL for this fetcher
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[async_trait]
impl MeasurementSource for AtlasFetcher {
    async fn list_anchors(&self) -> FetcherResult<Vec<Anchor>> {
        let url = self.config.anchors_url();
        info!("Listing anchors from {}", url);

        let params = [("page_size", self.config.page_size.to_string())];
        let anchors = fetch_all(
            &self.http,
            &url,
            &params,
            AtlasParser::is_usable_anchor,
            AtlasParser::parse_anchor,
        )
        .await?;

        info!(anchors = anchors.len(), "Anchor listing complete");
        Ok(anchors)
    }

    async fn list_ping_measurements(
        &self,
        anchor_ids: &[u32],
    ) -> FetcherResult<Vec<(u32, MeasurementRef)>> {
        let url = self.config.anchor_measurements_url();
        info!(
            "Scanning anchor measurement catalog at {} for {} anchors",
            url,
            anchor_ids.len()
        );

        let params = [
            ("page_size", self.config.page_size.to_string()),
            ("include", "target".to_string()),
        ];
        let measurements = fetch_all(
            &self.http,
            &url,
            &params,
            |item| AtlasParser::is_ping_to(item, anchor_ids),
            AtlasParser::parse_anchor_measurement,
        )
        .await?;

        info!(
            measurements = measurements.len(),
            "Anchor measurement scan complete"
        );
        Ok(measurements)
    }

    async fn fetch_results(
        &self,
        measurement: MeasurementRef,
        start: i64,
        probe_ids: &[u32],
    ) -> FetcherResult<Vec<ProbeResult>> {
        let url = self.config.results_url(measurement.id());
        let probe_list = probe_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let params = [("start", start.to_string()), ("probe_ids", probe_list)];

        debug!(
            measurement = %measurement,
            probes = probe_ids.len(),
            start,
            "Fetching measurement results"
        );

        let results: Vec<ProbeResult> = self.http.get_url(&url, &params).await?;

        debug!(
            measurement = %measurement,
            results = results.len(),
            "Measurement results received"
        );
        Ok(results)
    }
}
