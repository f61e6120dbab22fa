//! The replicator: push applied changesets outward, pull from sources.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use factdb_core::{ChangeSet, Fact, fact};
use factdb_storage::{ChangeSetUpdate, Store, StorageError};

use crate::log::ReplicationLog;
use crate::{ReplicationError, Result};

/// Ships this store's applied changesets to the shared log and ingests
/// changesets from configured source stores.
///
/// Sources are plain items tagged `_ingest` whose content is the origin
/// store uuid to pull from. Both directions are cooperative: callers invoke
/// [`push`](Replicator::push) after commit and [`pull`](Replicator::pull)
/// on a timer or explicit request.
pub struct Replicator {
    store: Arc<dyn Store>,
    log: Box<dyn ReplicationLog>,
}

impl Replicator {
    pub fn new(store: Arc<dyn Store>, log: Box<dyn ReplicationLog>) -> Self {
        Self { store, log }
    }

    /// Pushes every applied-but-unreplicated local changeset to the log.
    /// Idempotent: the remote accepts overwrites of identical keys, and the
    /// replicated flag only flips after a successful write. Returns the
    /// number shipped.
    pub fn push(&self) -> Result<usize> {
        let pending = self.store.get_unreplicated_changesets()?;
        let mut shipped = 0;
        for cs in pending {
            let rowid = cs.origin_rowid.ok_or_else(|| {
                ReplicationError::Storage(StorageError::Internal(format!(
                    "local changeset {} has no ordinal",
                    cs.uuid
                )))
            })?;
            let payload = cs.to_payload()?;
            self.log.publish(&cs.origin, rowid, &payload)?;
            self.store
                .update_changeset(&cs, ChangeSetUpdate::replicated())?;
            debug!(changeset = %cs.uuid, rowid, "replicated changeset");
            shipped += 1;
        }
        if shipped > 0 {
            info!(shipped, "pushed changesets to replication log");
        }
        Ok(shipped)
    }

    /// Pulls from every configured source, applying fetched changesets in
    /// per-origin rowid order. Returns the number applied.
    ///
    /// Invalid payloads are logged and skipped; because the cursor derives
    /// from recorded changesets, a skipped row is retried next pull unless
    /// a later row from the same origin lands first.
    pub fn pull(&self) -> Result<usize> {
        let mut applied = 0;
        for source in self.sources()? {
            applied += self.pull_from(&source)?;
        }
        Ok(applied)
    }

    /// Push then pull, the `REPLICATE` query behaviour.
    pub fn run(&self) -> Result<(usize, usize)> {
        let pushed = self.push()?;
        let pulled = self.pull()?;
        Ok((pushed, pulled))
    }

    /// The origin uuids of every `_ingest` item. Items whose content does
    /// not parse as a uuid are skipped with a warning.
    fn sources(&self) -> Result<Vec<Uuid>> {
        let items = self.store.get_items(&[Fact::tag(fact::TAG_INGEST)])?;
        let mut sources = Vec::new();
        for item in items {
            let content = item.content_text().trim();
            match Uuid::parse_str(content) {
                Ok(origin) => sources.push(origin),
                Err(_) => {
                    warn!(content, "ignoring _ingest item with non-uuid content");
                }
            }
        }
        Ok(sources)
    }

    fn pull_from(&self, source: &Uuid) -> Result<usize> {
        // Self-loop protection at the source level.
        if *source == self.store.uuid() {
            debug!(%source, "skipping ingest source pointing at this store");
            return Ok(0);
        }

        let cursor = self.store.get_last_ingested_changeset(source)?;
        let entries = self.log.fetch_since(source, cursor)?;
        debug!(%source, cursor, fetched = entries.len(), "pulled from source");

        let mut applied = 0;
        for entry in entries {
            let cs = match ChangeSet::from_payload(&entry.payload, *source, entry.rowid) {
                Ok(cs) => cs,
                Err(e) => {
                    warn!(
                        origin = %source,
                        rowid = entry.rowid,
                        error = %e,
                        "skipping invalid replication payload"
                    );
                    continue;
                }
            };
            if self.ingest(&cs)? {
                applied += 1;
            }
        }
        if applied > 0 {
            info!(origin = %source, applied, "ingested changesets");
        }
        Ok(applied)
    }

    /// Records and applies one fetched changeset. Returns whether it was
    /// applied now (duplicates that are already applied count as done).
    fn ingest(&self, cs: &ChangeSet) -> Result<bool> {
        // A changeset that originated here went through apply already.
        if cs.origin == self.store.uuid() {
            return Ok(false);
        }

        match self.store.record_changeset(cs) {
            Ok(_) => {}
            Err(e) if e.is_duplicate_changeset() => {
                // Already ingested; re-apply only if a previous run died
                // between record and apply.
                let existing = self.store.load_changeset(&cs.uuid)?;
                if existing.applied {
                    debug!(changeset = %cs.uuid, "already applied, skipping");
                    return Ok(false);
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.store.apply_changeset(&cs.uuid)?;
        Ok(true)
    }
}
