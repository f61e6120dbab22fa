//! [`SqliteStore`] -- SQLite-backed storage implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use factdb_core::RefCoder;

use crate::error::{Result, StorageError};
use crate::sqlite::schema;

/// SQLite-backed implementation of the [`Store`](crate::traits::Store)
/// trait.
///
/// Wraps a [`rusqlite::Connection`] in a `Mutex`: single writer per
/// process, mutation bracketed by a connection-level transaction around
/// each changeset apply.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    uuid: Uuid,
    coder: RefCoder,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path. `salt` seeds a fresh
    /// store's identity; an existing store keeps the salt it was created
    /// with.
    pub fn open(path: impl AsRef<Path>, salt: Option<Uuid>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening store");
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::from_connection(conn, salt)
    }

    /// Opens an in-memory store (useful for tests).
    pub fn open_in_memory(salt: Option<Uuid>) -> Result<Self> {
        debug!("opening in-memory store");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("failed to open in-memory db: {e}")))?;
        Self::from_connection(conn, salt)
    }

    fn from_connection(conn: Connection, salt: Option<Uuid>) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StorageError::Connection(format!("failed to set pragmas: {e}")))?;

        init_schema(&conn)?;
        let uuid = bootstrap_salt(&conn, salt)?;
        info!(store = %uuid, "store ready");

        Ok(Self {
            conn: Mutex::new(conn),
            uuid,
            coder: RefCoder::new(&uuid.to_string()),
        })
    }

    /// The store identity: the salt behind the ref mapping and the origin
    /// stamped on locally-recorded changesets.
    pub fn store_uuid(&self) -> Uuid {
        self.uuid
    }

    pub(crate) fn coder(&self) -> &RefCoder {
        &self.coder
    }

    /// Acquires the connection lock. Helper used by all operation modules.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

/// Creates or validates the schema, driven by `PRAGMA user_version`.
fn init_schema(conn: &Connection) -> Result<()> {
    let found: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    let mut at = found;
    if found == 0 {
        debug!("fresh store file, creating baseline schema");
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)
                .map_err(|e| StorageError::Migration {
                    name: "baseline".into(),
                    reason: format!("{e}\nStatement: {}", truncate(stmt, 120)),
                })?;
        }
        conn.pragma_update(None, "user_version", schema::BASELINE_VERSION)?;
        at = schema::BASELINE_VERSION;
    } else if found < schema::BASELINE_VERSION {
        return Err(StorageError::SchemaTooOld {
            found,
            baseline: schema::BASELINE_VERSION,
        });
    } else if found > schema::CURRENT_VERSION {
        return Err(StorageError::SchemaTooNew {
            found,
            current: schema::CURRENT_VERSION,
        });
    }

    for &(version, name, sql) in schema::MIGRATIONS {
        if version <= at {
            continue;
        }
        debug!(name, version, "applying migration");
        conn.execute_batch(sql)
            .map_err(|e| StorageError::Migration {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;
        conn.pragma_update(None, "user_version", version)?;
        at = version;
    }

    Ok(())
}

/// Reuses the persisted salt, or stores the requested (or a fresh) one.
fn bootstrap_salt(conn: &Connection, requested: Option<Uuid>) -> Result<Uuid> {
    let existing: Option<String> = conn
        .query_row("SELECT val FROM config WHERE key = 'salt'", [], |row| {
            row.get(0)
        })
        .optional()?;

    if let Some(salt) = existing {
        return Uuid::parse_str(&salt)
            .map_err(|_| StorageError::Corrupt(format!("config salt is not a uuid: {salt}")));
    }

    let salt = requested.unwrap_or_else(Uuid::new_v4);
    conn.execute(
        "INSERT INTO config (key, val) VALUES ('salt', ?1)",
        [salt.to_string()],
    )?;
    conn.execute(
        "INSERT INTO config (key, val) VALUES ('created', ?1)",
        [Utc::now().to_rfc3339()],
    )?;
    Ok(salt)
}

/// Truncates a string for error messages.
fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max])
    } else {
        s.to_owned()
    }
}
