//! Change and ChangeSet -- the unit-of-commit types.
//!
//! A [`Change`] is one grouped mutation against a single item; a
//! [`ChangeSet`] bundles the changes of one transaction together with its
//! provenance (client, origin store, ordinal within that origin). Changesets
//! are what replication ships between stores, so their JSON wire form is
//! part of the external contract.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fact::Fact;

/// One grouped mutation against a single item.
///
/// `uuid` is the durable per-item identity: generated when the item is
/// created and stable across replicas. `revoke = false` asserts the facts;
/// `revoke = true` marks them no longer current. A create is identified by
/// the presence of a `(_db, created, ...)` fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub uuid: Uuid,
    #[serde(default)]
    pub revoke: bool,
    pub facts: BTreeSet<Fact>,
}

impl Change {
    pub fn assert(uuid: Uuid, facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            uuid,
            revoke: false,
            facts: facts.into_iter().collect(),
        }
    }

    pub fn revoke(uuid: Uuid, facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            uuid,
            revoke: true,
            facts: facts.into_iter().collect(),
        }
    }

    /// A non-revoking change carrying a creation timestamp creates a new
    /// item; anything else updates an existing one.
    pub fn is_create(&self) -> bool {
        !self.revoke && self.facts.iter().any(Fact::is_created)
    }

    /// The creation timestamp value, for create changes.
    pub fn created_value(&self) -> Option<&str> {
        self.facts
            .iter()
            .find(|f| f.is_created())
            .map(|f| f.value.as_str())
    }
}

/// A transactional bundle of changes with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// Stable global identifier of the changeset.
    pub uuid: Uuid,
    /// Free-form `"<client>:<user>"` string identifying the caller.
    pub client: String,
    /// Uuid of the store that first produced this changeset.
    pub origin: Uuid,
    /// Monotonic ordinal within the origin store; `None` until recorded
    /// locally.
    pub origin_rowid: Option<i64>,
    pub created: DateTime<Utc>,
    /// Original query text, kept for audit.
    pub query: String,
    pub changes: Vec<Change>,
    pub applied: bool,
    pub replicated: bool,
}

impl ChangeSet {
    /// A fresh, empty changeset originating at `origin`.
    pub fn new(client: impl Into<String>, origin: Uuid, query: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            client: client.into(),
            origin,
            origin_rowid: None,
            created: Utc::now(),
            query: query.into(),
            changes: Vec::new(),
            applied: false,
            replicated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Serialises the change list as stored in the `changesets` table and in
    /// the changeset-item's content.
    pub fn changes_to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.changes)
    }

    pub fn changes_from_json(json: &str) -> serde_json::Result<Vec<Change>> {
        serde_json::from_str(json)
    }

    /// The replication wire form.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(&ChangeSetPayload {
            uuid: self.uuid,
            client: self.client.clone(),
            created: self.created,
            query: self.query.clone(),
            changes: self.changes.clone(),
        })
    }

    /// Reconstructs a changeset from a replication log entry. Origin and
    /// ordinal come from the log key; the terminal flags start cleared on
    /// the ingesting side.
    pub fn from_payload(
        payload: &str,
        origin: Uuid,
        origin_rowid: i64,
    ) -> serde_json::Result<Self> {
        let wire: ChangeSetPayload = serde_json::from_str(payload)?;
        Ok(Self {
            uuid: wire.uuid,
            client: wire.client,
            origin,
            origin_rowid: Some(origin_rowid),
            created: wire.created,
            query: wire.query,
            changes: wire.changes,
            applied: false,
            replicated: false,
        })
    }
}

/// The JSON payload shipped through the replication log: `(origin, rowid)`
/// key the entry; the payload carries the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetPayload {
    pub uuid: Uuid,
    pub client: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub query: String,
    pub changes: Vec<Change>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn origin() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn create_detection() {
        let create = Change::assert(
            Uuid::new_v4(),
            [Fact::content("hi"), Fact::created(&Utc::now())],
        );
        assert!(create.is_create());
        assert!(create.created_value().is_some());

        let update = Change::assert(Uuid::new_v4(), [Fact::tag("todo")]);
        assert!(!update.is_create());

        // A revoke never creates, even if it lists the created fact.
        let revoke = Change::revoke(Uuid::new_v4(), [Fact::created(&Utc::now())]);
        assert!(!revoke.is_create());
    }

    #[test]
    fn changes_json_round_trip() {
        let mut cs = ChangeSet::new("test:user", origin(), "CREATE hi #todo");
        cs.changes.push(Change::assert(
            Uuid::new_v4(),
            [
                Fact::content("hi"),
                Fact::tag("todo"),
                Fact::created(&Utc::now()),
            ],
        ));
        cs.changes
            .push(Change::revoke(Uuid::new_v4(), [Fact::flag("todo", "done")]));

        let json = cs.changes_to_json().unwrap();
        let back = ChangeSet::changes_from_json(&json).unwrap();
        assert_eq!(back, cs.changes);
    }

    #[test]
    fn payload_round_trip() {
        let mut cs = ChangeSet::new("repl:user", origin(), "CREATE hi");
        cs.changes.push(Change::assert(
            Uuid::new_v4(),
            [Fact::content("hi"), Fact::created(&Utc::now())],
        ));
        cs.origin_rowid = Some(7);
        cs.applied = true;

        let payload = cs.to_payload().unwrap();
        let back = ChangeSet::from_payload(&payload, cs.origin, 7).unwrap();

        assert_eq!(back.uuid, cs.uuid);
        assert_eq!(back.client, cs.client);
        assert_eq!(back.created, cs.created);
        assert_eq!(back.query, cs.query);
        assert_eq!(back.changes, cs.changes);
        assert_eq!(back.origin_rowid, Some(7));
        // Terminal flags do not travel.
        assert!(!back.applied);
        assert!(!back.replicated);
    }

    #[test]
    fn payload_fields_are_stable() {
        let cs = ChangeSet::new("repl:user", origin(), "");
        let value: serde_json::Value =
            serde_json::from_str(&cs.to_payload().unwrap()).unwrap();
        for key in ["uuid", "client", "created", "query", "changes"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
