//! Storage Error Types
//!
//! This module defines the error types for the log store.
//!
//! ## Error Categories
//!
//! - `OpenDirectory`: the log directory could not be created or listed
//! - `SegmentParse`: a segment could not be parsed during recovery
//! - `SegmentIo`: stat/seek/read/write failures during normal operations
//! - `Recovery`: the store failed to choose or open an active segment
//!
//! Recovery-time errors (`OpenDirectory`, `SegmentParse`, `Recovery`) are
//! fatal: [`LogStore::open`](crate::storage::LogStore::open) returns the
//! error and no store is produced. Operation-time errors (`SegmentIo`) are
//! surfaced to the caller; they never mutate the index and never roll the
//! segment. There is no internal retry.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the log store.
///
/// Every variant that concerns a specific file carries its path, so an
/// operator can find the offending segment from the log line alone.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The log directory could not be created or listed.
    #[error("couldn't open log directory {}: {source}", path.display())]
    OpenDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A segment file could not be parsed during recovery.
    #[error("couldn't parse segment {}: {reason}", path.display())]
    SegmentParse { path: PathBuf, reason: String },

    /// An I/O operation on a segment failed outside of recovery.
    #[error("segment I/O failed on {}: {source}", path.display())]
    SegmentIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store failed to choose or open an active segment at startup.
    #[error("couldn't open an active segment: {source}")]
    Recovery {
        #[source]
        source: io::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
