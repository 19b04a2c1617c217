//! Append-only SQLite packet store, WAL mode.
//!
//! Schema: one `packets` table of `(id, received_at, raw)` plus an index on
//! `received_at`. The ingestion client is the only writer; readers open
//! their own connection per query.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;

use aprs_core::types::RawFrame;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS packets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    received_at REAL NOT NULL,
    raw TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_received_at ON packets(received_at);
"#;

const INSERT: &str = "INSERT INTO packets (received_at, raw) VALUES (?1, ?2)";

/// Inserts between durability checkpoints.
pub const DEFAULT_COMMIT_EVERY: u32 = 500;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Row count and capture-time range of the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreStats {
    pub count: i64,
    pub oldest: Option<f64>,
    pub newest: Option<f64>,
}

/// Handle on the packet database.
pub struct PacketStore {
    conn: Connection,
    commit_every: u32,
    pending: u32,
    uncommitted: Vec<(f64, String)>,
}

impl PacketStore {
    /// Open or create the store, creating parent directories and the schema
    /// if they are missing.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open in-memory store (for testing).
    pub fn open_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open an existing store for reading. `Ok(None)` when the file is absent.
    ///
    /// Never creates the file or the schema.
    pub fn open_existing(path: &Path) -> StoreResult<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Some(PacketStore {
            conn,
            commit_every: DEFAULT_COMMIT_EVERY,
            pending: 0,
            uncommitted: Vec::new(),
        }))
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(PacketStore {
            conn,
            commit_every: DEFAULT_COMMIT_EVERY,
            pending: 0,
            uncommitted: Vec::new(),
        })
    }

    /// Change the checkpoint interval (minimum 1).
    pub fn with_commit_every(mut self, n: u32) -> Self {
        self.commit_every = n.max(1);
        self
    }

    /// Inserts since the last checkpoint.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append one line. Opens a transaction on the first insert after a
    /// checkpoint and commits once `commit_every` inserts have accumulated.
    ///
    /// An `Err` means only this row was not written. Rows accepted earlier
    /// stay buffered until a commit succeeds, and are replayed if SQLite
    /// rolled the open transaction back. A failed checkpoint is not reported
    /// here.
    pub fn insert(&mut self, received_at: f64, raw: &str) -> StoreResult<()> {
        self.resume()?;
        self.conn.execute(INSERT, params![received_at, raw])?;
        self.uncommitted.push((received_at, raw.to_owned()));
        self.pending += 1;
        if self.pending >= self.commit_every {
            if let Err(e) = self.flush() {
                tracing::debug!(
                    buffered = self.uncommitted.len(),
                    "checkpoint failed, retrying at next boundary: {e}"
                );
            }
        }
        Ok(())
    }

    /// Commit pending inserts.
    ///
    /// On failure the buffered rows are kept and the counter restarts, so the
    /// commit is retried at the next checkpoint boundary.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.pending = 0;
        if self.uncommitted.is_empty() && self.conn.is_autocommit() {
            return Ok(());
        }
        self.resume()?;
        self.conn.execute_batch("COMMIT")?;
        self.uncommitted.clear();
        Ok(())
    }

    /// Make sure a transaction is open and holds every buffered row.
    ///
    /// A statement error such as `SQLITE_FULL` can roll back the whole
    /// transaction; the connection is then in autocommit mode again and the
    /// buffered rows are re-inserted.
    fn resume(&mut self) -> StoreResult<()> {
        if !self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("BEGIN")?;
        if !self.uncommitted.is_empty() {
            tracing::debug!(rows = self.uncommitted.len(), "replaying rolled back inserts");
        }
        for (received_at, raw) in &self.uncommitted {
            if let Err(e) = self.conn.execute(INSERT, params![received_at, raw]) {
                if !self.conn.is_autocommit() {
                    let _ = self.conn.execute_batch("ROLLBACK");
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Inserts accepted but not yet committed.
    pub fn uncommitted(&self) -> usize {
        self.uncommitted.len()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Frames with `received_at >= cutoff`, oldest first, ties in insert order.
    pub fn frames_since(&self, cutoff: f64) -> StoreResult<Vec<RawFrame>> {
        let mut stmt = self.conn.prepare(
            "SELECT received_at, raw FROM packets
             WHERE received_at >= ?1 ORDER BY received_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], |r| {
            Ok(RawFrame {
                received_at: r.get(0)?,
                text: r.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), MIN(received_at), MAX(received_at) FROM packets",
            [],
            |r| {
                Ok(StoreStats {
                    count: r.get(0)?,
                    oldest: r.get(1)?,
                    newest: r.get(2)?,
                })
            },
        )?)
    }
}

impl Drop for PacketStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(
                lost = self.uncommitted.len(),
                "final packet store commit failed: {e}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
