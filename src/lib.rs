//! # EmberKV - A Log-Structured Persistent Key-Value Store
//!
//! EmberKV is a persistent key-value store written in Rust. Values live in
//! append-only log segments on disk and are served by streaming bytes
//! straight from the segment file into the response, never buffering a
//! value in memory.
//!
//! ## Features
//!
//! - **Log-Structured Storage**: Every write appends a framed record to the
//!   active segment; segments roll at a size cap and old segments are never
//!   rewritten
//! - **Streaming Reads**: A read seeks to the value's offset and copies the
//!   exact byte range into a caller-supplied sink
//! - **Sharded Index**: 128 independently locked shards map keys to their
//!   on-disk location, so operations on unrelated keys never contend
//! - **Expiration**: Every entry carries an expiration timestamp; expired
//!   keys vanish lazily on access and via a background sweeper
//! - **Crash Recovery**: Reopening a directory replays the segments in
//!   chronological order and rebuilds the index
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                │
//! │                                                                     │
//! │  ┌─────────────┐     ┌──────────────────────────────────────────┐   │
//! │  │ HTTP Server │────>│                LogStore                  │   │
//! │  │ /get  /set  │     │  ┌────────────────┐  ┌────────────────┐  │   │
//! │  └─────────────┘     │  │  ShardedIndex  │  │ active segment │  │   │
//! │                      │  │ 128 × Mutex'd  │  │ (append handle │  │   │
//! │                      │  │    HashMap     │  │   + mutex)     │  │   │
//! │                      │  └───────┬────────┘  └───────┬────────┘  │   │
//! │                      └──────────┼──────────────────┼───────────┘   │
//! │                                 ▼                  ▼               │
//! │                      ┌──────────────────────────────────────────┐  │
//! │                      │  log directory of append-only segments   │  │
//! │                      └──────────────────────────────────────────┘  │
//! │                                 ▲                                  │
//! │                                 │                                  │
//! │                      ┌──────────┴───────────┐                      │
//! │                      │    ExpirySweeper     │                      │
//! │                      │ (background task,    │                      │
//! │                      │  index only)         │                      │
//! │                      └──────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::storage::{LogStore, LogStoreOptions};
//!
//! let store = LogStore::open("./store", LogStoreOptions::default())?;
//!
//! // Keep a key for a minute.
//! let expire_at = std::time::SystemTime::now()
//!     .duration_since(std::time::UNIX_EPOCH)
//!     .unwrap()
//!     .as_millis() as i64
//!     + 60_000;
//! store.set("greeting", expire_at, b"hello")?;
//!
//! // Stream it back into any std::io::Write sink.
//! let mut sink = Vec::new();
//! let found = store.stream_get("greeting", &mut sink)?;
//! assert!(found);
//! assert_eq!(sink, b"hello");
//! # Ok::<(), emberkv::storage::StoreError>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the log store (sharded index, segment files, recovery,
//!   expiry sweeper)
//! - [`server`]: the HTTP front-end streaming values in and out of the store
//!
//! ## Design Highlights
//!
//! ### Locking Discipline
//!
//! Each of the 128 index shards has its own mutex, held for the whole of any
//! operation touching a key in that shard, including across file I/O. A
//! single writer mutex serializes appends and is only ever taken after a
//! shard mutex, so deadlock is impossible and a streaming read can trust its
//! index entry for the read's full duration.
//!
//! ### Zero-Buffer Reads
//!
//! A value is never materialized in memory on the read path. `stream_get`
//! opens the segment the index points at, seeks, and copies exactly the
//! value's bytes into the caller's sink; over HTTP that sink feeds the
//! response body chunk by chunk.
//!
//! ### Lazy + Active Expiry
//!
//! Expired keys are dropped when accessed (lazy) and by a background
//! sweeper (active), so memory is reclaimed even for keys never read again.
//! Records on disk are left alone either way; an expired record doubles as
//! a tombstone for recovery.

pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use server::router;
pub use storage::{
    start_expiry_sweeper, ExpiryConfig, ExpirySweeper, LogStore, LogStoreOptions, StoreError,
    StoreResult,
};

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 8000;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default log directory
pub const DEFAULT_DATA_DIR: &str = "./store";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
