//! Log Store Engine
//!
//! This module implements the engine itself: a log-structured key-value
//! store that persists values in append-only segment files and serves reads
//! by streaming bytes straight from disk into a caller-supplied sink.
//!
//! ## Data Flow
//!
//! ```text
//! set(key, expire, value)                stream_get(key, sink)
//!        │                                      │
//!        ▼                                      ▼
//! ┌──────────────┐                       ┌──────────────┐
//! │ shard lock   │                       │ shard lock   │
//! └──────┬───────┘                       └──────┬───────┘
//!        ▼                                      ▼
//! ┌──────────────┐                       ┌──────────────┐
//! │ writer lock  │                       │ index lookup │
//! └──────┬───────┘                       └──────┬───────┘
//!        ▼                                      ▼
//! ┌──────────────┐                       ┌──────────────┐
//! │ stat, maybe  │                       │ open segment │
//! │ roll, append │                       │ seek, stream │
//! └──────┬───────┘                       └──────┬───────┘
//!        ▼                                      ▼
//! ┌──────────────┐                       release shard lock
//! │ update shard │
//! └──────────────┘
//! ```
//!
//! ## Locking Discipline
//!
//! The shard mutex is always acquired before the segment-writer mutex, no
//! operation takes two shard mutexes, and `stream_get` never takes the
//! writer mutex at all, so deadlock is impossible. Both locks are held
//! across the disk write in `set`; the shard lock is held across the whole
//! streaming read in `stream_get`, which keeps the index entry (and the
//! segment bytes it points at) stable for the read's full duration.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use super::error::{StoreError, StoreResult};
use super::index::{IndexEntry, ShardedIndex, SHARD_COUNT};
use super::segment::{parse_segment, record_header, segment_name};

/// Default cap on a segment's size: 32 MiB. The cap is advisory: a single
/// record larger than the cap is still written whole into a freshly rolled
/// segment, which then exceeds it.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 32 * 1024 * 1024;

/// Per-store configuration.
#[derive(Debug, Clone, Copy)]
pub struct LogStoreOptions {
    /// Size threshold at which the active segment rolls. A write that would
    /// reach or exceed this cap goes to a fresh segment instead.
    pub max_segment_bytes: u64,
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Self {
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
        }
    }
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the Unix epoch")
        .as_millis() as i64
}

/// The segment currently receiving appends. Replaced wholesale on roll; the
/// previous handle closes on drop while the file itself stays on disk.
#[derive(Debug)]
struct ActiveSegment {
    file: File,
    path: PathBuf,
}

/// Point-in-time operation counters.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    /// Live keys in the index.
    pub keys: usize,
    /// Total `set` calls.
    pub set_ops: u64,
    /// Total `stream_get` calls.
    pub get_ops: u64,
    /// `stream_get` calls that streamed a value.
    pub hits: u64,
    /// Index entries dropped because their expiration passed (lazy removal
    /// on access plus sweeper removals).
    pub expired: u64,
}

/// A log-structured key-value store over a single flat directory of
/// append-only segment files.
///
/// One instance owns the directory for the life of the process. All
/// operations are thread-safe; the store is designed to be wrapped in an
/// `Arc` and shared across request handlers.
///
/// # Example
///
/// ```no_run
/// use emberkv::storage::{LogStore, LogStoreOptions};
///
/// let store = LogStore::open("./store", LogStoreOptions::default())?;
/// store.set("name", i64::MAX, b"Ember")?;
///
/// let mut sink = Vec::new();
/// assert!(store.stream_get("name", &mut sink)?);
/// assert_eq!(sink, b"Ember");
/// # Ok::<(), emberkv::storage::StoreError>(())
/// ```
#[derive(Debug)]
pub struct LogStore {
    /// The log directory. All segments live directly inside it; there is no
    /// metadata file, no lockfile, no manifest.
    dir: PathBuf,
    /// Sharded key → entry index, rebuilt from the segments on open.
    index: ShardedIndex,
    /// Write handle to the active segment, serialized by its mutex.
    active: Mutex<ActiveSegment>,
    opts: LogStoreOptions,

    set_count: AtomicU64,
    get_count: AtomicU64,
    hit_count: AtomicU64,
    expired_count: AtomicU64,
}

impl LogStore {
    /// Opens the store at `dir`, creating the directory if needed.
    ///
    /// Recovery replays every segment in lexical (= chronological) name
    /// order to rebuild the index, then picks the segment to append to: the
    /// newest one if it still has room, a fresh one otherwise. Any parse or
    /// I/O failure during recovery is fatal and no store is produced.
    pub fn open(dir: impl Into<PathBuf>, opts: LogStoreOptions) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::OpenDirectory {
            path: dir.clone(),
            source,
        })?;

        let mut segments = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|source| StoreError::OpenDirectory {
            path: dir.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| StoreError::OpenDirectory {
                path: dir.clone(),
                source,
            })?;
            segments.push(entry.path());
        }
        segments.sort();

        // Replay oldest-first so later segments overwrite earlier ones.
        let index = ShardedIndex::new();
        let now = now_millis();
        for path in &segments {
            index.merge(parse_segment(path, now)?);
        }

        let active = match segments.last() {
            Some(last) => {
                let size = fs::metadata(last)
                    .map_err(|source| StoreError::Recovery { source })?
                    .len();
                if size >= opts.max_segment_bytes {
                    // The newest segment is already at capacity.
                    Self::create_segment_file(&dir)?
                } else {
                    let file = OpenOptions::new()
                        .append(true)
                        .open(last)
                        .map_err(|source| StoreError::Recovery { source })?;
                    ActiveSegment {
                        file,
                        path: last.clone(),
                    }
                }
            }
            None => Self::create_segment_file(&dir)?,
        };

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            keys = index.len(),
            active = %active.path.display(),
            "log store opened"
        );

        Ok(Self {
            dir,
            index,
            active: Mutex::new(active),
            opts,
            set_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        })
    }

    /// Persists `value` under `key` with the given expiration (milliseconds
    /// since the Unix epoch).
    ///
    /// The record always lands on disk. If `expire_at` is not in the future
    /// the key's index entry is removed instead of updated: a `set` with a
    /// past expiration is how a key is deleted, and the record on disk acts
    /// as a tombstone for recovery.
    pub fn set(&self, key: &str, expire_at: i64, value: &[u8]) -> StoreResult<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.index.lock(key);
        let mut active = self.active.lock().unwrap();

        let mut end = active
            .file
            .metadata()
            .map_err(|source| segment_io(&active.path, source))?
            .len();

        let header = record_header(expire_at, key, value.len());
        let header_len = header.len() as u64;
        let record_len = header_len + value.len() as u64 + 1;

        // Roll if this record would reach the cap. Inclusive on purpose: a
        // record that exactly fills the segment still rolls. A record larger
        // than the cap lands whole in the fresh segment regardless.
        if end + record_len >= self.opts.max_segment_bytes {
            *active = Self::create_segment_file(&self.dir)?;
            debug!(segment = %active.path.display(), "rolled to a new segment");
            end = 0;
        }

        // One contiguous write: header || value || ','.
        let mut record = header;
        record.extend_from_slice(value);
        record.push(b',');
        active
            .file
            .write_all(&record)
            .map_err(|source| segment_io(&active.path, source))?;

        if expire_at <= now_millis() {
            entries.remove(key);
        } else {
            entries.insert(
                key.to_string(),
                IndexEntry {
                    segment_path: active.path.clone(),
                    expire_at,
                    value_offset: end + header_len,
                    value_len: value.len() as u64,
                },
            );
        }

        Ok(())
    }

    /// Streams the value for `key` into `sink` without buffering it in
    /// memory.
    ///
    /// Returns `Ok(true)` and exactly the value's bytes on a hit, `Ok(false)`
    /// with nothing written when the key is absent or expired (the expired
    /// entry is dropped on the spot). On an I/O error the sink may already
    /// have received a prefix of the value; callers that have started
    /// forwarding those bytes must treat the result as corrupt.
    pub fn stream_get<W: Write>(&self, key: &str, sink: &mut W) -> StoreResult<bool> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.index.lock(key);
        let entry = match entries.get(key) {
            None => return Ok(false),
            Some(entry) => entry.clone(),
        };

        // Expiration is inclusive: an entry whose expire_at equals the
        // current millisecond is already dead, and reading it drops it.
        if entry.expire_at <= now_millis() {
            entries.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        // The shard lock stays held across the open/seek/stream below, so a
        // concurrent set cannot supersede the entry mid-read.
        let mut file = File::open(&entry.segment_path)
            .map_err(|source| segment_io(&entry.segment_path, source))?;
        file.seek(SeekFrom::Start(entry.value_offset))
            .map_err(|source| segment_io(&entry.segment_path, source))?;

        let copied = io::copy(&mut (&mut file).take(entry.value_len), sink)
            .map_err(|source| segment_io(&entry.segment_path, source))?;
        if copied != entry.value_len {
            return Err(segment_io(
                &entry.segment_path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "segment ended before the full value",
                ),
            ));
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Drops expired index entries from `count` consecutive shards starting
    /// at `start`, wrapping past the last shard. Never touches the disk.
    /// Returns the number of entries removed.
    ///
    /// This is the background sweeper's entry point: it walks the 128
    /// shards in small batches so no single sweep holds more than one shard
    /// lock at a time and the whole keyspace is never drained in one go.
    pub fn purge_expired_shards(&self, start: usize, count: usize) -> u64 {
        let now = now_millis();
        let purged = (0..count.min(SHARD_COUNT))
            .map(|offset| self.index.purge_shard((start + offset) % SHARD_COUNT, now))
            .sum();
        if purged > 0 {
            self.expired_count.fetch_add(purged, Ordering::Relaxed);
        }
        purged
    }

    /// Drops every index entry whose expiration has passed, across all
    /// shards. Returns the number of entries removed.
    pub fn purge_expired(&self) -> u64 {
        self.purge_expired_shards(0, SHARD_COUNT)
    }

    /// Returns the number of live keys (approximate under concurrency).
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// The log directory this store owns.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns operation counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.index.len(),
            set_ops: self.set_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    fn create_segment_file(dir: &Path) -> StoreResult<ActiveSegment> {
        let path = dir.join(segment_name(now_millis()));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| segment_io(&path, source))?;
        Ok(ActiveSegment { file, path })
    }
}

fn segment_io(path: &Path, source: io::Error) -> StoreError {
    StoreError::SegmentIo {
        path: path.to_path_buf(),
        source,
    }
}
