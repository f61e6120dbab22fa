//! The replication log -- the durable ordered KV replicas share.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::{ReplicationError, Result};

/// One fetched log entry: the ordinal within its origin plus the serialised
/// changeset payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub rowid: i64,
    pub payload: String,
}

/// A durable log keyed by `(origin_uuid, origin_rowid)`.
///
/// Any backend that supports "query by origin, rowid beyond a cursor, in
/// ascending order" satisfies the contract. Writes must be safe to retry:
/// publishing the same key twice overwrites with identical content.
pub trait ReplicationLog: Send + Sync {
    /// Writes (or overwrites) the payload for `(origin, rowid)`.
    fn publish(&self, origin: &Uuid, rowid: i64, payload: &str) -> Result<()>;

    /// All entries for `origin` with rowid strictly beyond `cursor`, in
    /// ascending rowid order.
    fn fetch_since(&self, origin: &Uuid, cursor: i64) -> Result<Vec<LogEntry>>;
}

/// The reference log backend: a SQLite file on a path every replica can
/// reach (a synced directory, a network mount).
pub struct SqliteLog {
    conn: Mutex<Connection>,
}

impl SqliteLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            ReplicationError::Transport(format!("failed to open log {}: {e}", path.display()))
        })?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS replication_log (
                 origin       TEXT NOT NULL,
                 origin_rowid INTEGER NOT NULL,
                 received     TEXT NOT NULL,
                 payload      TEXT NOT NULL,
                 PRIMARY KEY (origin, origin_rowid)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReplicationError::Transport(format!("mutex poisoned: {e}")))
    }
}

impl ReplicationLog for SqliteLog {
    fn publish(&self, origin: &Uuid, rowid: i64, payload: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO replication_log (origin, origin_rowid, received, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![origin.to_string(), rowid, Utc::now().to_rfc3339(), payload],
        )?;
        debug!(%origin, rowid, "published changeset to log");
        Ok(())
    }

    fn fetch_since(&self, origin: &Uuid, cursor: i64) -> Result<Vec<LogEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT origin_rowid, payload
             FROM replication_log
             WHERE origin = ?1 AND origin_rowid > ?2
             ORDER BY origin_rowid ASC",
        )?;
        let rows = stmt.query_map(params![origin.to_string(), cursor], |row| {
            Ok(LogEntry {
                rowid: row.get(0)?,
                payload: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> (tempfile::TempDir, SqliteLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteLog::open(dir.path().join("log.db")).unwrap();
        (dir, log)
    }

    #[test]
    fn fetch_beyond_cursor_in_order() {
        let (_dir, log) = log();
        let origin = Uuid::new_v4();
        log.publish(&origin, 2, "two").unwrap();
        log.publish(&origin, 1, "one").unwrap();
        log.publish(&origin, 3, "three").unwrap();

        let all = log.fetch_since(&origin, 0).unwrap();
        assert_eq!(
            all.iter().map(|e| e.rowid).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let tail = log.fetch_since(&origin, 2).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].payload, "three");
    }

    #[test]
    fn publish_is_overwrite_safe() {
        let (_dir, log) = log();
        let origin = Uuid::new_v4();
        log.publish(&origin, 1, "payload").unwrap();
        log.publish(&origin, 1, "payload").unwrap();
        assert_eq!(log.fetch_since(&origin, 0).unwrap().len(), 1);
    }

    #[test]
    fn origins_are_partitioned() {
        let (_dir, log) = log();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        log.publish(&a, 1, "from a").unwrap();
        assert!(log.fetch_since(&b, 0).unwrap().is_empty());
    }
}
