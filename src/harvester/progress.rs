//! Batch progress reporting
//!
//! Workers report each finished destination; a line is logged whenever the
//! completed share crosses another step (10% by default) and for the final
//! destination.

use super::job::JobOutcome;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

const DEFAULT_PERCENT_STEP: usize = 10;

/// Completed destinations out of a batch
#[derive(Debug)]
pub struct BatchProgress {
    total: usize,
    percent_step: usize,
    completed: AtomicUsize,
    samples: AtomicUsize,
    last_bucket: AtomicUsize,
    start_time: Instant,
}

impl BatchProgress {
    /// Progress over `total` destinations
    pub fn new(total: usize) -> Self {
        Self::with_step(total, DEFAULT_PERCENT_STEP)
    }

    /// Progress logging every `percent_step` percent
    pub fn with_step(total: usize, percent_step: usize) -> Self {
        Self {
            total,
            percent_step: percent_step.clamp(1, 100),
            completed: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
            last_bucket: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count a finished destination, returning whether a line was logged
    pub fn record(&self, outcome: &JobOutcome) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.samples
            .fetch_add(outcome.samples_written, Ordering::SeqCst);

        let bucket = self.percentage_of(completed) / self.percent_step;
        let previous = self.last_bucket.fetch_max(bucket, Ordering::SeqCst);
        if bucket > previous || completed == self.total {
            info!("{}", self.format_progress());
            return true;
        }
        false
    }

    /// Destinations finished so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Samples written by finished destinations
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> usize {
        self.percentage_of(self.completed())
    }

    fn percentage_of(&self, completed: usize) -> usize {
        if self.total == 0 {
            return 100;
        }
        completed.min(self.total) * 100 / self.total
    }

    /// Remaining time extrapolated from the average destination time
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let completed = self.completed();
        let remaining = self.total.saturating_sub(completed);
        if completed == 0 || remaining == 0 {
            return None;
        }
        let per_item = self.start_time.elapsed().as_secs_f64() / completed as f64;
        Some(Duration::from_secs_f64(per_item * remaining as f64))
    }

    /// Human-readable progress string for logging
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} destinations done - {}% complete, {} samples written",
            self.completed().min(self.total),
            self.total,
            self.percentage(),
            self.samples()
        )];

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
