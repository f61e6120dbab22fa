//! Storage error types.

use uuid::Uuid;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "item", "changeset").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// `record_changeset` saw a uuid that is already recorded.
    #[error("changeset already exists: {0}")]
    ChangesetExists(Uuid),

    /// `apply_changeset` was called on an already-applied changeset.
    #[error("changeset already applied: {0}")]
    ChangesetAlreadyApplied(Uuid),

    /// The store file predates this implementation's baseline schema.
    #[error("schema version {found} is too old (needs migration by an older release; baseline is {baseline})")]
    SchemaTooOld { found: i32, baseline: i32 },

    /// The store file was written by a newer implementation.
    #[error("schema version {found} is newer than supported version {current}")]
    SchemaTooNew { found: i32, current: i32 },

    /// A search fact of a kind `get_items` cannot match on.
    #[error("unsupported search term: {0}")]
    InvalidSearch(String),

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration {
        /// Name of the migration that failed.
        name: String,
        /// Underlying error description.
        reason: String,
    },

    /// Persisted state violates a store invariant.
    #[error("store corrupt: {0}")]
    Corrupt(String),

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Creates a [`StorageError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for the duplicate-changeset rejection, which ingestion
    /// treats as "already have it".
    pub fn is_duplicate_changeset(&self) -> bool {
        matches!(self, Self::ChangesetExists(_))
    }
}
