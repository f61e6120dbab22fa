//! Client and transaction orchestration for the factdb system.
//!
//! A [`Client`] wraps a store (and optionally a replicator) for one
//! `"<client>:<user>"` caller; a [`Transaction`] translates query text into
//! changesets, records and applies them, and returns the resulting items.

pub mod client;
pub mod transaction;

pub use client::Client;
pub use transaction::Transaction;

use factdb_query::QueryError;
use factdb_replicate::ReplicationError;
use factdb_storage::StorageError;

/// Errors surfaced by the client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The query does not match the grammar; no transaction was started.
    #[error(transparent)]
    Parse(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// A create/set/del with an empty fact list, rejected before any state
    /// change.
    #[error("no data supplied")]
    MissingData,

    /// A mutation whose match is not a single ref.
    #[error("expected a ref first, got {0}")]
    ExpectedRef(String),

    /// The ref does not resolve in this store.
    #[error("@{0} does not exist")]
    UnknownRef(String),

    #[error("transaction already committed")]
    Closed,

    /// The `REPLICATE` action without a configured replicator.
    #[error("replication is not configured")]
    ReplicationUnavailable,

    #[error("invalid client identifier {0:?} (expected \"client:user\")")]
    InvalidClient(String),
}

/// Convenience alias used throughout the client crate.
pub type Result<T> = std::result::Result<T, ClientError>;
