//! Append-only per-destination sample log
//!
//! Layout: `<dir>/<address_v4>.csv` with header
//! `destination_probe_id,source_probe_id,sample_index,rtt`.
//!
//! Rows are only ever appended, so a crash can at worst leave a partial last
//! row. Opening the log checks the header and replays the complete lines, then
//! cuts such a tail off. A file with a foreign header is never modified.

use super::lock::LedgerLock;
use super::progress::RetrievalProgress;
use super::{ResumeError, ResumeResult};
use crate::{Anchor, PingTimeRecord};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sample log columns, in file order
pub const LEDGER_HEADER: [&str; 4] = [
    "destination_probe_id",
    "source_probe_id",
    "sample_index",
    "rtt",
];

/// Read size when scanning backwards for the last newline
const TAIL_CHUNK: usize = 8 * 1024;

/// Log file for a destination address
pub fn ledger_path(dir: &Path, address: Ipv4Addr) -> PathBuf {
    dir.join(format!("{address}.csv"))
}

/// Append handle to one destination's sample log
pub struct CheckpointLedger {
    path: PathBuf,
    destination_probe_id: u32,
    writer: csv::Writer<File>,
    rows_appended: usize,
    _lock: LedgerLock,
}

impl CheckpointLedger {
    /// Open or create the log for `destination` and replay it
    ///
    /// # Arguments
    /// * `dir` - Directory holding all sample logs
    /// * `destination` - Anchor the log belongs to
    ///
    /// # Returns
    /// Stored sample counts per source, and a handle for further appends
    ///
    /// # Errors
    /// - `SchemaMismatch` if the header differs from [`LEDGER_HEADER`]
    /// - `Corrupt` if a row is unreadable or names another destination
    /// - `LockError` if another handle is writing the same log
    pub fn open(dir: &Path, destination: &Anchor) -> ResumeResult<(RetrievalProgress, Self)> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create {}: {e}", dir.display())))?;

        let path = ledger_path(dir, destination.address_v4);
        let lock = LedgerLock::try_acquire(&path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::IoError(format!("Failed to open {}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| ResumeError::IoError(e.to_string()))?
            .len();
        let keep = complete_len(&mut file)
            .map_err(|e| ResumeError::IoError(format!("Failed to scan {}: {e}", path.display())))?;

        let progress = if keep == 0 {
            // No complete line: empty, or the header write was cut short
            let header = format!("{}\n", LEDGER_HEADER.join(","));
            check_partial_header(&mut file, len, &header, &path)?;
            file.set_len(0)
                .and_then(|_| file.seek(SeekFrom::Start(0)))
                .and_then(|_| file.write_all(header.as_bytes()))
                .and_then(|_| file.sync_data())
                .map_err(|e| ResumeError::IoError(format!("Failed to write header: {e}")))?;
            debug!(path = %path.display(), "Created sample log");
            RetrievalProgress::new()
        } else {
            file.seek(SeekFrom::Start(0))
                .map_err(|e| ResumeError::IoError(e.to_string()))?;
            let progress = replay((&file).take(keep), &path, destination.pid)?;
            if keep < len {
                file.set_len(keep)
                    .and_then(|_| file.sync_data())
                    .map_err(|e| {
                        ResumeError::IoError(format!("Failed to repair {}: {e}", path.display()))
                    })?;
                warn!(
                    path = %path.display(),
                    bytes = len - keep,
                    "Dropped partial trailing row from sample log"
                );
            }
            progress
        };
        info!(
            path = %path.display(),
            destination = destination.pid,
            sources = progress.sources(),
            samples = progress.total(),
            "Sample log replayed"
        );

        let append_file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| ResumeError::IoError(format!("Failed to open {}: {e}", path.display())))?;
        let writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(append_file);

        Ok((
            progress,
            Self {
                path,
                destination_probe_id: destination.pid,
                writer,
                rows_appended: 0,
                _lock: lock,
            },
        ))
    }

    /// Append one batch of records and make it durable
    pub fn append(&mut self, records: &[PingTimeRecord]) -> ResumeResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            debug_assert_eq!(record.destination_probe_id, self.destination_probe_id);
            self.writer
                .serialize(record)
                .map_err(|e| ResumeError::CsvError(format!("Failed to write row: {e}")))?;
        }
        self.writer
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush {}: {e}", self.path.display())))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync {}: {e}", self.path.display())))?;

        self.rows_appended += records.len();
        Ok(())
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle
    pub fn rows_appended(&self) -> usize {
        self.rows_appended
    }
}

/// Replay a log without locking or repairing it
///
/// A partial trailing row is ignored rather than truncated, so this is safe
/// to run next to an active writer.
pub fn inspect(path: &Path, destination_probe_id: u32) -> ResumeResult<RetrievalProgress> {
    let bytes = std::fs::read(path)
        .map_err(|e| ResumeError::IoError(format!("Failed to read {}: {e}", path.display())))?;
    let end = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    if end == 0 {
        return Ok(RetrievalProgress::new());
    }
    replay(&bytes[..end], path, destination_probe_id)
}

/// Check the header and count rows per source
fn replay<R: Read>(
    source: R,
    path: &Path,
    destination_probe_id: u32,
) -> ResumeResult<RetrievalProgress> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| ResumeError::CsvError(format!("Failed to read header: {e}")))?
        .clone();

    if !headers.iter().eq(LEDGER_HEADER) {
        return Err(ResumeError::SchemaMismatch {
            path: path.display().to_string(),
            expected: LEDGER_HEADER.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut progress = RetrievalProgress::new();
    for (i, row) in reader.deserialize::<PingTimeRecord>().enumerate() {
        let record = row.map_err(|e| ResumeError::Corrupt {
            path: path.display().to_string(),
            reason: format!("row {}: {e}", i + 1),
        })?;
        if record.destination_probe_id != destination_probe_id {
            return Err(ResumeError::Corrupt {
                path: path.display().to_string(),
                reason: format!(
                    "row {} belongs to destination {}, expected {}",
                    i + 1,
                    record.destination_probe_id,
                    destination_probe_id
                ),
            });
        }
        progress.record(record.source_probe_id, 1);
    }

    Ok(progress)
}

/// Length of the file up to and including its last newline
fn complete_len(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    let mut buf = vec![0u8; TAIL_CHUNK];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// Accept a line-less file only if it is a cut-off copy of the header
fn check_partial_header(file: &mut File, len: u64, header: &str, path: &Path) -> ResumeResult<()> {
    let mut found = Vec::new();
    if len < header.len() as u64 {
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut found))
            .map_err(|e| ResumeError::IoError(format!("Failed to read {}: {e}", path.display())))?;
        if header.as_bytes().starts_with(&found) {
            return Ok(());
        }
    }
    Err(ResumeError::SchemaMismatch {
        path: path.display().to_string(),
        expected: LEDGER_HEADER.join(","),
        found: String::from_utf8_lossy(&found).into_owned(),
    })
}
