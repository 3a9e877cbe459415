//! Single-row SQLite store for the latest device snapshot.
//!
//! The table holds at most one row (`id = 1`). Writes replace it with an
//! upsert inside a transaction; reads never see a half-written row.
//!
//! All database work runs on the blocking thread pool via
//! [`tokio::task::spawn_blocking`]. A blocking task runs to completion even if
//! the future awaiting it is dropped, so a write that has started is never
//! abandoned halfway by a cancelled caller.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device_latest (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  fetched_at_ms INTEGER NOT NULL,
  raw_json TEXT NOT NULL
);
";

/// The last known-good device state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub fetched_at_ms: i64,
    pub raw_json: Vec<u8>,
}

impl Snapshot {
    /// Milliseconds elapsed between the fetch and `now`.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.fetched_at_ms
    }
}

/// Handle to the snapshot database. Clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Self::init(Connection::open(&path)?)
        })
        .await?
    }

    /// A private, non-persistent store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replaces the stored snapshot. Both columns change together.
    pub async fn put(&self, raw_json: Vec<u8>, fetched_at: DateTime<Utc>) -> Result<(), StoreError> {
        let raw = String::from_utf8(raw_json).map_err(|_| StoreError::Encoding)?;
        let fetched_at_ms = fetched_at.timestamp_millis();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO device_latest (id, fetched_at_ms, raw_json)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                   fetched_at_ms = excluded.fetched_at_ms,
                   raw_json      = excluded.raw_json",
                params![fetched_at_ms, raw],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Returns the stored snapshot, or [`StoreError::NotFound`] before the
    /// first successful write.
    pub async fn get(&self) -> Result<Snapshot, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT fetched_at_ms, raw_json FROM device_latest WHERE id = 1",
                    [],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            match row {
                Some((fetched_at_ms, raw)) => Ok(Snapshot {
                    fetched_at_ms,
                    raw_json: raw.into_bytes(),
                }),
                None => Err(StoreError::NotFound),
            }
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await?
    }
}
