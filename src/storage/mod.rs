//! Storage Engine Module
//!
//! This module provides the persistent core of EmberKV: a log-structured
//! key-value store built from three collaborating pieces.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        LogStore                             │
//! │                                                             │
//! │  ┌───────────────────────┐   ┌──────────────────────────┐   │
//! │  │     ShardedIndex      │   │     active segment       │   │
//! │  │ 128 × Mutex<HashMap>  │   │  (append handle + mutex) │   │
//! │  │  key → IndexEntry     │   │                          │   │
//! │  └───────────┬───────────┘   └────────────┬─────────────┘   │
//! │              │ points into                │ appends          │
//! │              ▼                            ▼                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   log directory: append-only segment files          │    │
//! │  │   <millis>-<random>  <millis>-<random>  ...         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ purges expired entries
//!              ┌─────────────┴─────────────┐
//!              │       ExpirySweeper       │
//!              │  (background tokio task)  │
//!              └───────────────────────────┘
//! ```
//!
//! Values are never buffered in memory on the read path: `stream_get` seeks
//! into the segment a key's index entry points at and streams the exact
//! byte range into the caller's sink. Writes append framed records to the
//! active segment, rolling to a fresh file when the size cap is reached.
//! On startup the index is rebuilt by replaying every segment in
//! chronological order.

pub mod error;
pub mod expiry;
pub mod index;
pub mod segment;
pub mod store;

// Re-export commonly used types
pub use error::{StoreError, StoreResult};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use index::{IndexEntry, ShardedIndex, SHARD_COUNT};
pub use store::{LogStore, LogStoreOptions, StoreStats, DEFAULT_MAX_SEGMENT_BYTES};
