//! Durable Checkpoint Store
//!
//! This module persists the index: checkpoint rows (serialized instants
//! keyed by log offset, with time and transfer-id columns for binary
//! search) and versioned block contents. The engine only ever talks to the
//! [`IndexStore`] trait; [`SqliteIndexStore`] is the embedded implementation.
//!
//! ## Why SQLite?
//!
//! The index sits next to a trace file on one machine:
//! - **Zero configuration**: embedded database, no separate server
//! - **Ordered lookups**: indexed `time` / `transfer_id` columns give the
//!   "latest checkpoint at or before X" queries the engine binary-searches
//!   with
//! - **ACID transactions**: a checkpoint and its dirty blocks land together
//!   or not at all
//!
//! ## Schema
//!
//! ```text
//! checkpoints(log_offset PK, time, transfer_id, instant BLOB)
//! blocks(block_id, log_offset, data BLOB, PK(block_id, log_offset))
//! markers(key PK, value)
//! ```
//!
//! Checkpoint rows are append-only and written by the single indexing
//! worker; queries only read. The `markers` table records whether a previous
//! run finished indexing this log (and with what geometry), so reopening a
//! fully indexed log skips the scan entirely.
//!
//! ## Thread Safety
//!
//! The connection pool handles concurrent access; implementations are
//! shared as `Arc<dyn IndexStore>` across the worker and query tasks.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

/// One persisted checkpoint: a serialized instant plus the columns the
/// engine searches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRow {
    pub log_offset: u64,
    pub time: i64,
    pub transfer_id: u64,
    /// Checkpoint blob, decoded with `Instant::unpack`.
    pub blob: Vec<u8>,
}

/// Contents of one block as of one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVersion {
    pub block_id: u64,
    pub data: Vec<u8>,
}

/// Durable key-to-blob storage with the ordered lookups checkpoint binary
/// search needs.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Drop every persisted row. Called when (re)indexing starts from
    /// scratch.
    async fn clear(&self) -> Result<()>;

    /// Persist a checkpoint and the blocks dirtied since the previous one,
    /// atomically.
    async fn put_checkpoint(&self, row: &CheckpointRow, blocks: &[BlockVersion]) -> Result<()>;

    /// Latest checkpoint whose time is <= `time`.
    async fn checkpoint_at_or_before_time(&self, time: i64) -> Result<Option<CheckpointRow>>;

    /// Earliest checkpoint whose time is > `time`.
    async fn checkpoint_after_time(&self, time: i64) -> Result<Option<CheckpointRow>>;

    /// Latest checkpoint whose transfer-id counter is <= `transfer_id`.
    async fn checkpoint_at_or_before_id(&self, transfer_id: u64) -> Result<Option<CheckpointRow>>;

    /// The checkpoint with the greatest log offset.
    async fn last_checkpoint(&self) -> Result<Option<CheckpointRow>>;

    /// Every checkpoint, in log-offset order.
    async fn checkpoints(&self) -> Result<Vec<CheckpointRow>>;

    async fn checkpoint_count(&self) -> Result<u64>;

    /// Newest version of `block_id` persisted at or before `max_offset`.
    async fn block_at(&self, block_id: u64, max_offset: u64) -> Result<Option<Vec<u8>>>;

    async fn get_marker(&self, key: &str) -> Result<Option<String>>;
    async fn set_marker(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed [`IndexStore`].
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CheckpointRecord {
    log_offset: i64,
    time: i64,
    transfer_id: i64,
    instant: Vec<u8>,
}

impl From<CheckpointRecord> for CheckpointRow {
    fn from(r: CheckpointRecord) -> Self {
        CheckpointRow {
            log_offset: r.log_offset as u64,
            time: r.time,
            transfer_id: r.transfer_id as u64,
            blob: r.instant,
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    log_offset  INTEGER PRIMARY KEY,
    time        INTEGER NOT NULL,
    transfer_id INTEGER NOT NULL,
    instant     BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_time ON checkpoints (time);
CREATE INDEX IF NOT EXISTS idx_checkpoints_transfer ON checkpoints (transfer_id);
CREATE TABLE IF NOT EXISTS blocks (
    block_id   INTEGER NOT NULL,
    log_offset INTEGER NOT NULL,
    data       BLOB NOT NULL,
    PRIMARY KEY (block_id, log_offset)
);
CREATE TABLE IF NOT EXISTS markers (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

impl SqliteIndexStore {
    /// Open (or create) an index database next to its log file.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests.
    ///
    /// Capped at one connection: every pooled connection to `:memory:`
    /// would otherwise get its own empty database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checkpoints").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM blocks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM markers").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn put_checkpoint(&self, row: &CheckpointRow, blocks: &[BlockVersion]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (log_offset, time, transfer_id, instant) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(row.log_offset as i64)
        .bind(row.time)
        .bind(row.transfer_id as i64)
        .bind(row.blob.as_slice())
        .execute(&mut *tx)
        .await?;

        for block in blocks {
            sqlx::query(
                "INSERT OR REPLACE INTO blocks (block_id, log_offset, data) VALUES (?, ?, ?)",
            )
            .bind(block.block_id as i64)
            .bind(row.log_offset as i64)
            .bind(block.data.as_slice())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            log_offset = row.log_offset,
            time = row.time,
            transfer_id = row.transfer_id,
            dirty_blocks = blocks.len(),
            "Checkpoint persisted"
        );
        Ok(())
    }

    async fn checkpoint_at_or_before_time(&self, time: i64) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT log_offset, time, transfer_id, instant FROM checkpoints \
             WHERE time <= ? ORDER BY log_offset DESC LIMIT 1",
        )
        .bind(time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn checkpoint_after_time(&self, time: i64) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT log_offset, time, transfer_id, instant FROM checkpoints \
             WHERE time > ? ORDER BY log_offset ASC LIMIT 1",
        )
        .bind(time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn checkpoint_at_or_before_id(&self, transfer_id: u64) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT log_offset, time, transfer_id, instant FROM checkpoints \
             WHERE transfer_id <= ? ORDER BY log_offset DESC LIMIT 1",
        )
        .bind(transfer_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn last_checkpoint(&self) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT log_offset, time, transfer_id, instant FROM checkpoints \
             ORDER BY log_offset DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn checkpoints(&self) -> Result<Vec<CheckpointRow>> {
        let rows = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT log_offset, time, transfer_id, instant FROM checkpoints \
             ORDER BY log_offset ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn checkpoint_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn block_at(&self, block_id: u64, max_offset: u64) -> Result<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT data FROM blocks WHERE block_id = ? AND log_offset <= ? \
             ORDER BY log_offset DESC LIMIT 1",
        )
        .bind(block_id as i64)
        .bind(max_offset as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data)
    }

    async fn get_marker(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM markers WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_marker(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO markers (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(log_offset: u64, time: i64, transfer_id: u64) -> CheckpointRow {
        CheckpointRow {
            log_offset,
            time,
            transfer_id,
            blob: vec![log_offset as u8, time as u8, transfer_id as u8],
        }
    }

    async fn seeded() -> SqliteIndexStore {
        let store = SqliteIndexStore::new_in_memory().await.unwrap();
        for (offset, time, id) in [(100, 10, 3), (200, 25, 7), (300, 25, 9), (400, 60, 20)] {
            store.put_checkpoint(&row(offset, time, id), &[]).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_put_and_count() {
        let store = seeded().await;
        assert_eq!(store.checkpoint_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_time_lookups() {
        let store = seeded().await;

        let cp = store.checkpoint_at_or_before_time(30).await.unwrap().unwrap();
        // Two checkpoints share time 25; the later offset wins for "latest".
        assert_eq!(cp.log_offset, 300);

        let cp = store.checkpoint_at_or_before_time(10).await.unwrap().unwrap();
        assert_eq!(cp.log_offset, 100);

        assert!(store.checkpoint_at_or_before_time(9).await.unwrap().is_none());

        let cp = store.checkpoint_after_time(25).await.unwrap().unwrap();
        assert_eq!(cp.log_offset, 400);

        assert!(store.checkpoint_after_time(60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_id_lookup() {
        let store = seeded().await;
        let cp = store.checkpoint_at_or_before_id(8).await.unwrap().unwrap();
        assert_eq!(cp.log_offset, 200);
        let cp = store.checkpoint_at_or_before_id(100).await.unwrap().unwrap();
        assert_eq!(cp.log_offset, 400);
        assert!(store.checkpoint_at_or_before_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_and_all_checkpoints() {
        let store = seeded().await;
        assert_eq!(store.last_checkpoint().await.unwrap().unwrap().log_offset, 400);

        let all = store.checkpoints().await.unwrap();
        let offsets: Vec<u64> = all.iter().map(|c| c.log_offset).collect();
        assert_eq!(offsets, vec![100, 200, 300, 400]);
        // Blobs round-trip byte for byte.
        assert_eq!(all[0].blob, vec![100, 10, 3]);
    }

    #[tokio::test]
    async fn test_block_versions() {
        let store = SqliteIndexStore::new_in_memory().await.unwrap();
        store
            .put_checkpoint(
                &row(100, 1, 1),
                &[BlockVersion {
                    block_id: 5,
                    data: vec![1, 1, 1],
                }],
            )
            .await
            .unwrap();
        store
            .put_checkpoint(
                &row(200, 2, 2),
                &[BlockVersion {
                    block_id: 5,
                    data: vec![2, 2, 2],
                }],
            )
            .await
            .unwrap();

        // The version visible at an offset is the newest at or before it.
        assert_eq!(store.block_at(5, 150).await.unwrap().unwrap(), vec![1, 1, 1]);
        assert_eq!(store.block_at(5, 200).await.unwrap().unwrap(), vec![2, 2, 2]);
        assert!(store.block_at(5, 50).await.unwrap().is_none());
        assert!(store.block_at(6, 500).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_everything() {
        let store = seeded().await;
        store.set_marker("indexed", "yes").await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.checkpoint_count().await.unwrap(), 0);
        assert!(store.last_checkpoint().await.unwrap().is_none());
        assert!(store.get_marker("indexed").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_markers() {
        let store = SqliteIndexStore::new_in_memory().await.unwrap();
        assert!(store.get_marker("fingerprint").await.unwrap().is_none());
        store.set_marker("fingerprint", "abc").await.unwrap();
        assert_eq!(
            store.get_marker("fingerprint").await.unwrap().unwrap(),
            "abc"
        );
        store.set_marker("fingerprint", "def").await.unwrap();
        assert_eq!(
            store.get_marker("fingerprint").await.unwrap().unwrap(),
            "def"
        );
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let store = SqliteIndexStore::new(&path).await.unwrap();
            store.put_checkpoint(&row(1, 1, 1), &[]).await.unwrap();
        }

        let store = SqliteIndexStore::new(&path).await.unwrap();
        assert_eq!(store.checkpoint_count().await.unwrap(), 1);
    }
}
