//! Resume capability for destination retrieval
//!
//! Each destination owns one append-only CSV log. Progress is never stored
//! separately: opening a log replays it into a [`RetrievalProgress`], and the
//! todo set of every run is derived from that replay.

pub mod ledger;
pub mod lock;
pub mod progress;

pub use ledger::{inspect, ledger_path, CheckpointLedger, LEDGER_HEADER};
pub use lock::LedgerLock;
pub use progress::RetrievalProgress;

/// Errors related to the checkpoint ledger
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Log header differs from the expected column list
    #[error("sample log {path} has unexpected header: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        /// Log file
        path: String,
        /// Expected columns
        expected: String,
        /// Columns found in the file
        found: String,
    },

    /// Log content contradicts the destination it belongs to
    #[error("corrupt sample log {path}: {reason}")]
    Corrupt {
        /// Log file
        path: String,
        /// What was wrong
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

impl ResumeError {
    /// Whether re-opening the ledger later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ResumeError::IoError(_))
    }
}

/// Result type for ledger operations
pub type ResumeResult<T> = Result<T, ResumeError>;
