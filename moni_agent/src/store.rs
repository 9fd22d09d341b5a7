//! Bounded, timestamp-keyed metrics history in an embedded SQLite file.
//!
//! Rows live in one `Metrics` table keyed by the 8-byte big-endian timestamp,
//! clustered in key order (`WITHOUT ROWID`), so byte order is time order. The
//! file runs in WAL mode: a single-connection pool serializes write
//! transactions, and a separate pool serves reads from committed snapshots
//! without waiting on the writer.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::DataPoint;

/// Maximum number of points kept; the oldest are evicted first.
pub const RETENTION_CAP: usize = 100;

/// Bounded wait for the exclusive file lock taken by [`Store::open`].
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

const BUSY_TIMEOUT: Duration = Duration::from_secs(1);
const LOCK_POLL: Duration = Duration::from_millis(50);
const READ_CONNECTIONS: u32 = 4;
const SCHEMA_VERSION: u32 = 1;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Metrics (
        key   BLOB PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    ) WITHOUT ROWID
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metrics store {} is locked by another process", .0.display())]
    Locked(PathBuf),
    #[error("metrics store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record encoding: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("record schema version {0} is not supported")]
    UnsupportedVersion(u32),
}

/// Big-endian so that byte-lexicographic key order is chronological order.
pub fn encode_key(timestamp: i64) -> [u8; 8] {
    (timestamp as u64).to_be_bytes()
}

#[derive(Serialize)]
struct RecordOut<'a> {
    version: u32,
    #[serde(flatten)]
    point: &'a DataPoint,
}

#[derive(Deserialize)]
struct RecordHeader {
    version: u32,
}

fn encode_record(point: &DataPoint) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&RecordOut {
        version: SCHEMA_VERSION,
        point,
    })?)
}

fn decode_record(bytes: &[u8]) -> Result<DataPoint, StoreError> {
    let RecordHeader { version } = serde_json::from_slice(bytes)?;
    if version != SCHEMA_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Takes the advisory lock on `<path>.lock`, polling until `timeout` elapses.
/// The lock is held for as long as the returned handle is open.
async fn acquire_lock(path: &Path, timeout: Duration) -> Result<File, StoreError> {
    let lock_path = lock_path_for(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|source| StoreError::Io {
            path: lock_path.clone(),
            source,
        })?;
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(file),
            Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                tokio::time::sleep(LOCK_POLL).await;
            }
            Err(TryLockError::WouldBlock) => return Err(StoreError::Locked(path.to_path_buf())),
            Err(TryLockError::Error(source)) => {
                return Err(StoreError::Io {
                    path: lock_path,
                    source,
                })
            }
        }
    }
}

/// Deletes the oldest rows, one key at a time from the front, until at most
/// `cap` remain. Returns how many were evicted.
async fn enforce_retention(
    tx: &mut Transaction<'_, Sqlite>,
    cap: usize,
) -> Result<usize, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Metrics")
        .fetch_one(&mut **tx)
        .await?;
    let excess = count - i64::try_from(cap).unwrap_or(i64::MAX);
    if excess <= 0 {
        return Ok(0);
    }
    let oldest: Vec<Vec<u8>> =
        sqlx::query_scalar("SELECT key FROM Metrics ORDER BY key ASC LIMIT ?")
            .bind(excess)
            .fetch_all(&mut **tx)
            .await?;
    for key in &oldest {
        sqlx::query("DELETE FROM Metrics WHERE key = ?")
            .bind(key.as_slice())
            .execute(&mut **tx)
            .await?;
    }
    Ok(oldest.len())
}

pub struct Store {
    path: PathBuf,
    writer: SqlitePool,
    readers: SqlitePool,
    _lock: File,
}

impl Store {
    /// Opens or creates the store at `path`. Fails if another process holds it
    /// for longer than [`LOCK_TIMEOUT`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, LOCK_TIMEOUT).await
    }

    pub async fn open_with_timeout(
        path: impl AsRef<Path>,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let lock = acquire_lock(&path, lock_timeout).await?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // One long-lived connection: write transactions are totally ordered.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options.clone().create_if_missing(true))
            .await?;
        sqlx::query(CREATE_TABLE).execute(&writer).await?;

        let readers = SqlitePoolOptions::new()
            .max_connections(READ_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "metrics store opened");
        Ok(Self {
            path,
            writer,
            readers,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `point` under `timestamp` (replacing any point with the same
    /// second) and applies retention, all in one transaction.
    pub async fn put(&self, timestamp: i64, point: &DataPoint) -> Result<(), StoreError> {
        let value = encode_record(point)?;
        let mut tx = self.writer.begin().await?;
        sqlx::query("INSERT OR REPLACE INTO Metrics (key, value) VALUES (?, ?)")
            .bind(encode_key(timestamp).to_vec())
            .bind(value)
            .execute(&mut *tx)
            .await?;
        let evicted = enforce_retention(&mut tx, RETENTION_CAP).await?;
        tx.commit().await?;
        if evicted > 0 {
            debug!(timestamp, evicted, "retention evicted oldest points");
        }
        Ok(())
    }

    /// Up to `limit` most recent points, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<DataPoint>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        // A single statement reads one committed snapshot.
        let values: Vec<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM Metrics ORDER BY key DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.readers)
                .await?;
        let mut points = values
            .iter()
            .map(|v| decode_record(v))
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse();
        Ok(points)
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Metrics")
            .fetch_one(&self.readers)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    pub async fn close(&self) {
        self.readers.close().await;
        self.writer.close().await;
    }
}
