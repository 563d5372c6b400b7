//! Background Expiry Sweeper
//!
//! Expired keys are dropped from the index lazily, when something reads or
//! overwrites them. That leaves a gap: an entry whose expiration passes and
//! which is never touched again would sit in memory forever. The sweeper
//! closes that gap by walking the index in the background and purging dead
//! entries.
//!
//! The sweeper is purely an in-memory janitor. It never touches the
//! segments on disk (dead records stay where they were written) and it can
//! only ever remove entries that a read would have dropped anyway, so it
//! cannot change the result of any `stream_get`.
//!
//! ## Incremental Sweeping
//!
//! The index is made of 128 independently locked shards, and the sweeper
//! leans on that: instead of draining the whole keyspace in one pass, it
//! keeps a cursor and purges a small window of consecutive shards per tick,
//! wrapping around the shard array. No tick ever holds more than one shard
//! lock, and each lock is held only for a retain pass over that shard, so
//! sweeping is invisible to foreground operations.
//!
//! Pacing is two-speed. While a window keeps turning up dead entries the
//! sweeper ticks at `busy_interval` to finish the revolution quickly; once
//! a window comes back clean it falls back to `idle_interval` and crawls.
//! With the defaults a quiet store gets a full revolution roughly every
//! eight seconds, and an expiring one in well under a second.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::index::SHARD_COUNT;
use super::store::LogStore;

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Shards purged per tick. The cursor advances by this much each time,
    /// so a full revolution takes `SHARD_COUNT / shards_per_tick` ticks.
    pub shards_per_tick: usize,
    /// Tick interval while the previous window removed something.
    pub busy_interval: Duration,
    /// Tick interval while the index looks clean.
    pub idle_interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            // 8 shards per tick: a 16-tick revolution.
            shards_per_tick: SHARD_COUNT / 16,
            busy_interval: Duration::from_millis(10),
            idle_interval: Duration::from_millis(500),
        }
    }
}

/// Handle to the running sweeper task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    task: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Starts the sweeper as a background tokio task.
    pub fn start(store: Arc<LogStore>, config: ExpiryConfig) -> Self {
        Self {
            task: tokio::spawn(sweeper_loop(store, config)),
        }
    }

    /// Stops the sweeper. Called automatically when the handle drops.
    ///
    /// The task is aborted rather than signalled; abortion only lands on an
    /// await point, and the loop's sole await is its sleep, so a shard purge
    /// is never cut off halfway.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(store: Arc<LogStore>, config: ExpiryConfig) {
    let window = config.shards_per_tick.clamp(1, SHARD_COUNT);
    let mut cursor = 0usize;
    let mut interval = config.idle_interval;

    loop {
        tokio::time::sleep(interval).await;

        let purged = store.purge_expired_shards(cursor, window);
        cursor = (cursor + window) % SHARD_COUNT;

        interval = if purged > 0 {
            debug!(purged, cursor, "purged expired entries");
            config.busy_interval
        } else {
            config.idle_interval
        };
    }
}

/// Starts the sweeper with default configuration.
pub fn start_expiry_sweeper(store: Arc<LogStore>) -> ExpirySweeper {
    ExpirySweeper::start(store, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::now_millis;
    use crate::storage::LogStoreOptions;

    fn open_store(dir: &std::path::Path) -> Arc<LogStore> {
        Arc::new(LogStore::open(dir, LogStoreOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        for i in 0..10 {
            store
                .set(&format!("key:{i}"), now_millis() + 50, b"value")
                .unwrap();
        }
        store
            .set("keeper", now_millis() + 60_000, b"value")
            .unwrap();
        assert_eq!(store.key_count(), 11);

        let config = ExpiryConfig {
            shards_per_tick: SHARD_COUNT,
            busy_interval: Duration::from_millis(10),
            idle_interval: Duration::from_millis(10),
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.key_count(), 1);
        let mut sink = Vec::new();
        assert!(store.stream_get("keeper", &mut sink).unwrap());
    }

    #[tokio::test]
    async fn test_sweeper_revolution_covers_every_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        // Keys spread over many different shards, all about to die.
        for i in 0..64 {
            store
                .set(&format!("key:{i}"), now_millis() + 30, b"value")
                .unwrap();
        }

        // Small windows: the cursor needs a full 16-tick revolution to see
        // the whole index.
        let config = ExpiryConfig {
            shards_per_tick: SHARD_COUNT / 16,
            busy_interval: Duration::from_millis(5),
            idle_interval: Duration::from_millis(5),
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), config);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        {
            let _sweeper = ExpirySweeper::start(
                Arc::clone(&store),
                ExpiryConfig {
                    shards_per_tick: SHARD_COUNT,
                    busy_interval: Duration::from_millis(10),
                    idle_interval: Duration::from_millis(10),
                },
            );
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Sweeper handle drops here, aborting the task.
        }

        store.set("k", now_millis() + 10, b"v").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // No sweeper is running, so the dead entry stays indexed until
        // something reads it.
        assert_eq!(store.key_count(), 1);
        let mut sink = Vec::new();
        assert!(!store.stream_get("k", &mut sink).unwrap());
        assert_eq!(store.key_count(), 0);
    }
}
