//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rtt_harvester::fetcher::{
    FetcherError, FetcherResult, MeasurementSource, PingReply, ProbeResult,
};
use rtt_harvester::{Anchor, MeasurementRef};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Anchor with a documentation-range address derived from its id
pub fn anchor(aid: u32, pid: u32) -> Anchor {
    Anchor {
        aid,
        pid,
        address_v4: Ipv4Addr::new(198, 51, 100, aid as u8),
        asn_v4: 64496 + aid,
        latitude: 52.0 + f64::from(aid) / 10.0,
        longitude: 4.0 + f64::from(aid) / 10.0,
        country_code: "NL".into(),
        city: format!("City {aid}"),
    }
}

/// Probe result holding the given RTTs plus one lost reply
pub fn probe_result(prb_id: u32, rtts: impl IntoIterator<Item = f64>) -> ProbeResult {
    let mut result: Vec<PingReply> = rtts.into_iter().map(|rtt| PingReply { rtt: Some(rtt) }).collect();
    result.push(PingReply { rtt: None });
    ProbeResult { prb_id, result }
}

/// Scriptable in-memory measurement archive
#[derive(Default)]
pub struct StubArchive {
    pub anchors: Vec<Anchor>,
    pub measurements: Vec<(u32, MeasurementRef)>,
    pub results: HashMap<MeasurementRef, Vec<ProbeResult>>,
    /// Upcoming `fetch_results` calls that fail with a network error
    pub failing_fetches: AtomicUsize,
    pub anchor_listings: AtomicUsize,
    pub fetches: Mutex<Vec<(MeasurementRef, Vec<u32>)>>,
}

impl StubArchive {
    /// Archive where every anchor's measurement carries `samples` RTTs from
    /// every other anchor's probe
    pub fn complete(anchors: Vec<Anchor>, samples: usize) -> Self {
        let mut archive = Self::default();
        for (i, destination) in anchors.iter().enumerate() {
            let measurement = MeasurementRef(1_000 + i as u64);
            archive.measurements.push((destination.aid, measurement));
            let results = anchors
                .iter()
                .filter(|source| source.pid != destination.pid)
                .map(|source| probe_result(source.pid, (0..samples).map(|n| 10.0 + n as f64 * 0.01)))
                .collect();
            archive.results.insert(measurement, results);
        }
        archive.anchors = anchors;
        archive
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetched_measurements(&self) -> Vec<MeasurementRef> {
        self.fetches.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }
}

#[async_trait]
impl MeasurementSource for StubArchive {
    async fn list_anchors(&self) -> FetcherResult<Vec<Anchor>> {
        self.anchor_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.anchors.clone())
    }

    async fn list_ping_measurements(
        &self,
        anchor_ids: &[u32],
    ) -> FetcherResult<Vec<(u32, MeasurementRef)>> {
        Ok(self
            .measurements
            .iter()
            .copied()
            .filter(|(aid, _)| anchor_ids.contains(aid))
            .collect())
    }

    async fn fetch_results(
        &self,
        measurement: MeasurementRef,
        _start: i64,
        probe_ids: &[u32],
    ) -> FetcherResult<Vec<ProbeResult>> {
        self.fetches
            .lock()
            .unwrap()
            .push((measurement, probe_ids.to_vec()));

        let fail = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(FetcherError::Network("connection reset by peer".into()));
        }

        Ok(self
            .results
            .get(&measurement)
            .map(|results| {
                results
                    .iter()
                    .filter(|r| probe_ids.contains(&r.prb_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
