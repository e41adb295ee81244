//! Status command implementation
//!
//! Replays every sample log read-only and reports how far each destination
//! is from the per-pair target. Safe to run while a harvest is writing.

use crate::catalog::read_anchor_cache;
use crate::resume::{inspect, ledger_path};
use crate::TARGET_SAMPLE_COUNT;
use clap::Args;
use tracing::error;

use super::{Cli, CliError};

/// Per-destination progress report
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Samples per (destination, source) pair counted as complete
    #[arg(long, default_value_t = TARGET_SAMPLE_COUNT)]
    pub target_samples: usize,
}

/// Totals of a status run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Anchors in the cache
    pub destinations: usize,
    /// Destinations with a sample log
    pub started: usize,
    /// Destinations with every source at target
    pub complete: usize,
    /// Samples across all logs
    pub samples: usize,
}

impl StatusCommand {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> Result<StatusReport, CliError> {
        let anchors = read_anchor_cache(&cli.anchor_cache)?;
        let sources: Vec<u32> = anchors.iter().map(|a| a.pid).collect();

        let mut report = StatusReport {
            destinations: anchors.len(),
            ..StatusReport::default()
        };
        let mut invalid = 0;

        for anchor in &anchors {
            let path = ledger_path(&cli.output_dir, anchor.address_v4);
            if !path.exists() {
                continue;
            }

            let progress = match inspect(&path, anchor.pid) {
                Ok(progress) => progress,
                Err(e) => {
                    error!(anchor = anchor.aid, error = %e, "Invalid sample log");
                    invalid += 1;
                    continue;
                }
            };

            let expected: Vec<u32> = sources.iter().copied().filter(|&s| s != anchor.pid).collect();
            let outstanding = progress.todo(&expected, self.target_samples).len();

            report.started += 1;
            report.samples += progress.total();
            if outstanding == 0 {
                report.complete += 1;
            }

            println!(
                "{:>6} {:<15} {:>8} samples {:>5}/{} sources complete",
                anchor.aid,
                anchor.address_v4,
                progress.total(),
                expected.len().saturating_sub(outstanding),
                expected.len()
            );
        }

        println!(
            "{} destinations, {} started, {} complete, {} samples",
            report.destinations, report.started, report.complete, report.samples
        );

        if invalid > 0 {
            return Err(CliError::InvalidArgument(format!(
                "{invalid} invalid sample log(s) under {}",
                cli.output_dir.display()
            )));
        }
        Ok(report)
    }
}
