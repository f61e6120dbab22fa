//! The `Store` trait -- the engine contract the rest of the system
//! programs against.
//!
//! Consumers (the transaction orchestrator, the replicator, the CLI) depend
//! on this trait rather than on a concrete backend so alternatives can be
//! substituted. The reference backend is [`SqliteStore`](crate::SqliteStore).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use factdb_core::{ChangeSet, Fact, Item};

use crate::error::Result;

/// Terminal-flag updates for a recorded changeset. Only `Some` fields are
/// applied; both flags are monotonic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSetUpdate {
    pub applied: Option<bool>,
    pub replicated: Option<bool>,
}

impl ChangeSetUpdate {
    pub fn applied() -> Self {
        Self {
            applied: Some(true),
            replicated: None,
        }
    }

    pub fn replicated() -> Self {
        Self {
            applied: None,
            replicated: Some(true),
        }
    }
}

/// The only stateful component: an append-only fact log with derived
/// current/archive views and changeset persistence.
pub trait Store: Send + Sync {
    /// The store's identity. Doubles as the salt for the ref mapping and as
    /// the `origin` of changesets first recorded here.
    fn uuid(&self) -> Uuid;

    // -- Items ---------------------------------------------------------------

    /// The current set of facts behind a ref, including archived items and
    /// changeset-items. `None` when the ref resolves to nothing.
    fn get_item(&self, r: &Fact) -> Result<Option<Item>>;

    /// As [`get_item`](Store::get_item), addressed by durable uuid. Resolves
    /// changeset-items as well as regular items.
    fn get_item_by_uuid(&self, uuid: &Uuid) -> Result<Option<Item>>;

    /// ANDs the search facts over the current, unarchived view. Results are
    /// in item-creation order, capped at 100.
    fn get_items(&self, search: &[Fact]) -> Result<Vec<Item>>;

    /// Tag/prop discovery. `"#t"` (or `"t"`) lists tags with that prefix;
    /// `"#t/p"` lists props of `t` with prefix `p`. Each hit is an item
    /// carrying the tag or flag plus a `(_db, count, N)` fact.
    fn get_hints(&self, prefix: &str) -> Result<Vec<Item>>;

    /// With a ref: every fact-row ever written for that item, newest first,
    /// rendered as "Added ..." / "Revoked ..." descriptions. Without: the
    /// rows of the last 100 transactions store-wide.
    fn get_history(&self, r: Option<&Fact>) -> Result<Vec<Item>>;

    /// The last 100 changeset-items, newest first.
    fn get_changesets(&self) -> Result<Vec<Item>>;

    // -- Identity ------------------------------------------------------------

    /// Resolves a primary ref to the item's durable uuid.
    fn ref_to_uuid(&self, r: &Fact) -> Result<Option<Uuid>>;

    /// Resolves a durable uuid back to its primary ref in this store.
    fn uuid_to_ref(&self, uuid: &Uuid) -> Result<Option<Fact>>;

    /// Allocates the next monotonic id, materialises its ref via the
    /// salt-keyed hash, and persists the mapping.
    fn next_ref(
        &self,
        uid: &Uuid,
        created: &DateTime<Utc>,
        is_changeset: bool,
    ) -> Result<(Fact, i64)>;

    // -- Changesets ----------------------------------------------------------

    /// Persists a changeset. Rejects an already-recorded uuid.
    fn record_changeset(&self, cs: &ChangeSet) -> Result<Uuid>;

    fn load_changeset(&self, uuid: &Uuid) -> Result<ChangeSet>;

    fn check_changeset_exists(&self, uuid: &Uuid) -> Result<bool>;

    /// Applies a recorded changeset under a single backend transaction:
    /// materialises the changeset-item, then performs each change, then
    /// marks the changeset applied. Returns the changeset-item followed by
    /// one item per change, in change order. Re-applying is an error.
    fn apply_changeset(&self, uuid: &Uuid) -> Result<Vec<Item>>;

    /// Flips terminal flags on a recorded changeset.
    fn update_changeset(&self, cs: &ChangeSet, update: ChangeSetUpdate) -> Result<()>;

    /// Changesets originated here, applied, and not yet replicated, in
    /// record order.
    fn get_unreplicated_changesets(&self) -> Result<Vec<ChangeSet>>;

    /// The ingestion cursor for a remote origin: `max(origin_rowid)` over
    /// changesets ingested from it, or 0 when none.
    fn get_last_ingested_changeset(&self, origin: &Uuid) -> Result<i64>;
}
