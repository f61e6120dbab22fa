//! Storage backend for the factdb system.
//!
//! Provides the [`Store`] trait and a SQLite implementation
//! ([`SqliteStore`]): an append-only fact log with derived current views,
//! the collapse trigger, changeset persistence, and the apply state
//! machine.

pub mod error;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience.
pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use sqlite::doctor;
pub use traits::{ChangeSetUpdate, Store};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use factdb_core::{ChangeSet, Fact, Item};

use crate::error::Result;
use crate::sqlite::{changesets, hints, history, items};

impl Store for SqliteStore {
    fn uuid(&self) -> Uuid {
        self.store_uuid()
    }

    fn get_item(&self, r: &Fact) -> Result<Option<Item>> {
        if !r.is_ref() {
            return Err(StorageError::InvalidSearch(format!(
                "not a ref: {r}"
            )));
        }
        let conn = self.lock_conn()?;
        items::get_item_on_conn(&conn, &r.value)
    }

    fn get_item_by_uuid(&self, uuid: &Uuid) -> Result<Option<Item>> {
        let conn = self.lock_conn()?;
        items::get_item_by_uuid_on_conn(&conn, uuid)
    }

    fn get_items(&self, search: &[Fact]) -> Result<Vec<Item>> {
        let conn = self.lock_conn()?;
        items::get_items_on_conn(&conn, search)
    }

    fn get_hints(&self, prefix: &str) -> Result<Vec<Item>> {
        let conn = self.lock_conn()?;
        hints::get_hints_on_conn(&conn, prefix)
    }

    fn get_history(&self, r: Option<&Fact>) -> Result<Vec<Item>> {
        let conn = self.lock_conn()?;
        history::get_history_on_conn(&conn, r)
    }

    fn get_changesets(&self) -> Result<Vec<Item>> {
        let conn = self.lock_conn()?;
        changesets::changesets_as_items_on_conn(&conn)
    }

    fn ref_to_uuid(&self, r: &Fact) -> Result<Option<Uuid>> {
        let conn = self.lock_conn()?;
        items::ref_to_uuid_on_conn(&conn, &r.value)
    }

    fn uuid_to_ref(&self, uuid: &Uuid) -> Result<Option<Fact>> {
        let conn = self.lock_conn()?;
        items::uuid_to_ref_on_conn(&conn, uuid)
    }

    fn next_ref(
        &self,
        uid: &Uuid,
        created: &DateTime<Utc>,
        is_changeset: bool,
    ) -> Result<(Fact, i64)> {
        let conn = self.lock_conn()?;
        items::next_ref_on_conn(&conn, self.coder(), uid, created, is_changeset)
    }

    fn record_changeset(&self, cs: &ChangeSet) -> Result<Uuid> {
        let conn = self.lock_conn()?;
        changesets::record_on_conn(&conn, cs)
    }

    fn load_changeset(&self, uuid: &Uuid) -> Result<ChangeSet> {
        let conn = self.lock_conn()?;
        changesets::load_on_conn(&conn, self.store_uuid(), uuid)
    }

    fn check_changeset_exists(&self, uuid: &Uuid) -> Result<bool> {
        let conn = self.lock_conn()?;
        changesets::check_exists_on_conn(&conn, uuid)
    }

    fn apply_changeset(&self, uuid: &Uuid) -> Result<Vec<Item>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        match changesets::apply_on_conn(&tx, self.coder(), self.store_uuid(), uuid) {
            Ok(resp) => {
                tx.commit()?;
                Ok(resp)
            }
            // The transaction rolls back on drop, leaving the pre-apply
            // state intact.
            Err(e) => Err(e),
        }
    }

    fn update_changeset(&self, cs: &ChangeSet, update: ChangeSetUpdate) -> Result<()> {
        let conn = self.lock_conn()?;
        changesets::update_on_conn(&conn, &cs.uuid, update)
    }

    fn get_unreplicated_changesets(&self) -> Result<Vec<ChangeSet>> {
        let conn = self.lock_conn()?;
        changesets::unreplicated_on_conn(&conn, self.store_uuid())
    }

    fn get_last_ingested_changeset(&self, origin: &Uuid) -> Result<i64> {
        let conn = self.lock_conn()?;
        changesets::last_ingested_on_conn(&conn, origin)
    }
}
