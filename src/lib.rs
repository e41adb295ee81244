//! # RTT Harvester Library
//!
//! Harvests round-trip-time samples from a RIPE-Atlas-style measurement archive
//! and turns them into a calibration dataset: one CSV per destination anchor,
//! holding a bounded, representative set of RTTs for every source probe.
//!
//! ## Features
//!
//! - **Cursor Pagination**: Lazily follows `next` links through large catalogs
//! - **Representative Downsampling**: Decile skeleton plus uniform random draw
//! - **Resume Capability**: Progress is replayed from append-only logs
//! - **Bounded Concurrency**: Fixed worker pool with whole-batch retry
//! - **Rate Limiting**: Shared request budget against the upstream API
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtt_harvester::harvester::{HarvestConfig, Harvester};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::default();
//! let summary = Harvester::new(config).run().await?;
//! println!("{} samples written", summary.samples_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - HTTP client, cursor pagination, and the Atlas API source
//! - [`catalog`] - Anchor list cache and anchor to measurement mapping
//! - [`resume`] - Per-destination checkpoint ledger
//! - [`downsample`] - Bounded representative subset selection
//! - [`harvester`] - Per-destination orchestration, worker pool, retry supervisor
//!
//! ## Data Types
//!
//! - [`Anchor`] - A well-known probe with fixed coordinates
//! - [`MeasurementRef`] - Upstream id of a ping measurement targeting an anchor
//! - [`PingTimeRecord`] - One retained RTT sample

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Anchor catalog loading and caching
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Representative downsampling of RTT samples
pub mod downsample;

/// Upstream API access
pub mod fetcher;

/// Retrieval orchestration, worker pool and retry supervision
pub mod harvester;

/// Observability metrics
pub mod metrics;

/// Checkpoint ledger for resumable retrieval
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Number of samples retained per (destination, source) pair
pub const TARGET_SAMPLE_COUNT: usize = 500;

/// A measurement anchor: a probe with known location used as a ping target
///
/// Field order matches the anchor cache CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor id
    pub aid: u32,
    /// Probe id of the anchor's own probe
    pub pid: u32,
    /// IPv4 address
    pub address_v4: Ipv4Addr,
    /// IPv4 origin AS number
    pub asn_v4: u32,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// ISO 3166 country code
    pub country_code: String,
    /// City name
    pub city: String,
}

/// Upstream identifier of a ping measurement targeting an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementRef(pub u64);

impl MeasurementRef {
    /// Raw measurement id
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MeasurementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One retained RTT sample for a (destination, source) pair
///
/// Field order matches the sample log CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingTimeRecord {
    /// Probe id of the destination anchor
    pub destination_probe_id: u32,
    /// Probe id of the source probe
    pub source_probe_id: u32,
    /// Position of the sample within the batch it was appended with
    pub sample_index: u32,
    /// Round-trip time in milliseconds
    pub rtt: f64,
}

impl PingTimeRecord {
    /// Build records for one downsampled batch, indexed from zero
    pub fn batch(destination_probe_id: u32, source_probe_id: u32, rtts: &[f64]) -> Vec<Self> {
        rtts.iter()
            .enumerate()
            .map(|(i, &rtt)| Self {
                destination_probe_id,
                source_probe_id,
                sample_index: i as u32,
                rtt,
            })
            .collect()
    }
}
