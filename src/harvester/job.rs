//! Destination jobs and their lifecycle

use crate::{Anchor, MeasurementRef};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Retrieval work for one destination anchor
#[derive(Debug, Clone)]
pub struct DestinationJob {
    /// Destination anchor
    pub anchor: Anchor,
    /// Ping measurements targeting the anchor, in drain order
    pub measurements: Vec<MeasurementRef>,
    /// Probe ids of every anchor, shared by all jobs
    pub all_sources: Arc<[u32]>,
}

impl DestinationJob {
    /// Create a job
    pub fn new(anchor: Anchor, measurements: Vec<MeasurementRef>, all_sources: Arc<[u32]>) -> Self {
        Self {
            anchor,
            measurements,
            all_sources,
        }
    }

    /// Sources expected to ping this destination
    ///
    /// An anchor never measures itself, so its own probe is excluded.
    pub fn expected_sources(&self) -> Vec<u32> {
        self.all_sources
            .iter()
            .copied()
            .filter(|&source| source != self.anchor.pid)
            .collect()
    }
}

/// Per-destination state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Replaying the destination's sample log
    LoadingProgress,
    /// Fetching results of the measurement at this position
    Draining(usize),
    /// Nothing left to do this run
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::LoadingProgress => write!(f, "loading_progress"),
            JobState::Draining(i) => write!(f, "draining({i})"),
            JobState::Done => write!(f, "done"),
        }
    }
}

/// Result of one destination reaching [`JobState::Done`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Destination anchor id
    pub anchor_id: u32,
    /// Destination probe id
    pub destination_probe_id: u32,
    /// Destination address
    pub address: Ipv4Addr,
    /// Samples appended this run
    pub samples_written: usize,
    /// Result batches fetched this run
    pub measurements_fetched: usize,
    /// Expected sources at or above target
    pub sources_satisfied: usize,
    /// Expected sources still below target
    pub sources_outstanding: usize,
}

impl JobOutcome {
    /// Empty outcome for `anchor`
    pub fn new(anchor: &Anchor) -> Self {
        Self {
            anchor_id: anchor.aid,
            destination_probe_id: anchor.pid,
            address: anchor.address_v4,
            samples_written: 0,
            measurements_fetched: 0,
            sources_satisfied: 0,
            sources_outstanding: 0,
        }
    }

    /// Whether every expected source reached the target
    pub fn is_satisfied(&self) -> bool {
        self.sources_outstanding == 0
    }
}
