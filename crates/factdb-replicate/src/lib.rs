//! Changeset replication between independent stores.
//!
//! The shared medium is an ordered key-value log keyed by
//! `(origin_uuid, origin_rowid)` with a JSON changeset payload. The
//! [`ReplicationLog`] trait is the seam; [`SqliteLog`] is the reference
//! backend, a SQLite file on a path all replicas can reach. The
//! [`Replicator`] ships applied local changesets outward (push) and ingests
//! from configured sources (pull); both directions are idempotent and safe
//! to retry.

pub mod log;
pub mod replicator;

pub use log::{LogEntry, ReplicationLog, SqliteLog};
pub use replicator::Replicator;

use factdb_storage::StorageError;

/// Errors that can occur while replicating.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The shared log could not be reached or written.
    #[error("replication transport error: {0}")]
    Transport(String),

    /// A fetched payload did not parse as a changeset.
    #[error("invalid payload from {origin} at rowid {rowid}: {reason}")]
    Payload {
        origin: uuid::Uuid,
        rowid: i64,
        reason: String,
    },

    /// The local store failed while recording or applying.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("log error: {0}")]
    Log(#[from] rusqlite::Error),
}

/// Convenience alias used throughout the replication crate.
pub type Result<T> = std::result::Result<T, ReplicationError>;
