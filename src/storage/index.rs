//! Sharded In-Memory Index
//!
//! This module implements the in-memory side of the log store: a fixed array
//! of independently locked hash-table shards mapping each key to the location
//! of its live value inside a segment file on disk.
//!
//! ## Design Decisions
//!
//! 1. **128 Shards**: A global lock would serialize all operations, including
//!    reads against unrelated keys; a per-key lock would be wasteful. 128
//!    shards bounds contention to ~1/128 on uniformly distributed keys while
//!    keeping memory overhead trivial.
//! 2. **Exclusive Mutex, not RwLock**: a streaming read must keep its index
//!    entry stable across a file open + seek + stream, so readers hold the
//!    same exclusive lock writers do. A shared lock would force either a copy
//!    of the entry or a re-validation after I/O.
//! 3. **Caller-held guard**: [`ShardedIndex::lock`] hands the shard's
//!    `MutexGuard` to the caller so the lock's scope can span file I/O. The
//!    guard exposes the plain `HashMap` API for lookups and mutations.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ShardedIndex                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ ...128  │           │
//! │  │ Mutex   │ │ Mutex   │ │ Mutex   │ │ shards  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │         │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards with a 32-bit FNV hash, so two
//! operations on keys in different shards never contend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Number of shards in the index. Fixed at compile time; shard selection is
/// `fnv32(key) % SHARD_COUNT`, so changing this constant changes the shard
/// assignment of every key (harmless, since the index is rebuilt on open).
pub const SHARD_COUNT: usize = 128;

/// Location of the live value for one key.
///
/// The byte range `[value_offset, value_offset + value_len)` of the file at
/// `segment_path` holds the latest-written value for the key, as long as the
/// owning shard's lock is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Segment file the value lives in. Segments are never truncated or
    /// rewritten, so the path stays valid even after the writer rolls on.
    pub segment_path: PathBuf,
    /// Expiration in milliseconds since the Unix epoch. An entry is live
    /// only while `expire_at` is strictly greater than the current time.
    pub expire_at: i64,
    /// Byte offset of the value's first byte within the segment.
    pub value_offset: u64,
    /// Value size in bytes.
    pub value_len: u64,
}

/// One bucket of the index: a plain map guarded by its own mutex.
#[derive(Debug, Default)]
struct Shard {
    entries: Mutex<HashMap<String, IndexEntry>>,
}

/// The complete keyspace, partitioned into [`SHARD_COUNT`] shards.
#[derive(Debug)]
pub struct ShardedIndex {
    shards: Vec<Shard>,
}

impl Default for ShardedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    pub(crate) fn shard_index(key: &str) -> usize {
        fnv32(key) as usize % SHARD_COUNT
    }

    /// Locks the shard owning `key` and returns the guard.
    ///
    /// The guard is the caller's lock handle: every lookup or mutation for
    /// this key must go through it, and the shard stays locked until the
    /// guard is dropped. Operations hold it across their file I/O so that a
    /// concurrent writer cannot move the entry out from under a streaming
    /// read.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, HashMap<String, IndexEntry>> {
        self.shards[Self::shard_index(key)].entries.lock().unwrap()
    }

    /// Bulk-merges recovered entries into the index, overwriting existing
    /// keys. Used while replaying segments at startup, oldest first, so that
    /// later segments win.
    pub fn merge(&self, entries: HashMap<String, IndexEntry>) {
        for (key, entry) in entries {
            let mut shard = self.lock(&key);
            shard.insert(key, entry);
        }
    }

    /// Removes every entry in shard `shard` whose expiration is at or
    /// before `now`. Returns the number of entries removed.
    ///
    /// The shard lock is held only for the retain pass over that one shard,
    /// so purging never blocks operations on the other 127 shards. The
    /// background sweeper walks the index with this one shard batch at a
    /// time instead of draining the whole keyspace in a single pass.
    pub fn purge_shard(&self, shard: usize, now: i64) -> u64 {
        let mut entries = self.shards[shard % SHARD_COUNT].entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.expire_at > now);
        (before - entries.len()) as u64
    }

    /// Removes every entry whose expiration is at or before `now`, across
    /// all shards. Returns the number of entries removed.
    pub fn purge_expired(&self, now: i64) -> u64 {
        (0..SHARD_COUNT)
            .map(|shard| self.purge_shard(shard, now))
            .sum()
    }

    /// Returns the number of live entries across all shards.
    ///
    /// Approximate under concurrency: shards are counted one at a time.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.entries.lock().unwrap().len())
            .sum()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 32-bit FNV hash with multiply-before-xor ordering.
///
/// Offset basis 2166136261, prime 16777619, arithmetic modulo 2^32. The
/// multiply-then-xor order is part of the shard-assignment contract and must
/// not be swapped.
#[inline]
fn fnv32(key: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in key.as_bytes() {
        hash = hash.wrapping_mul(16_777_619);
        hash ^= u32::from(byte);
    }
    hash
}
