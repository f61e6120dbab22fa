//! Changeset persistence and the apply state machine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use factdb_core::{ChangeSet, Fact, Item, RefCoder, fact};

use crate::error::{Result, StorageError};
use crate::sqlite::items;
use crate::traits::ChangeSetUpdate;

pub(crate) fn check_exists_on_conn(conn: &Connection, uuid: &Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM changesets WHERE uuid = ?1",
            [uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Persists a changeset. The uuid is the idempotency guard: recording an
/// existing one is rejected.
pub(crate) fn record_on_conn(conn: &Connection, cs: &ChangeSet) -> Result<Uuid> {
    if check_exists_on_conn(conn, &cs.uuid)? {
        return Err(StorageError::ChangesetExists(cs.uuid));
    }
    conn.execute(
        "INSERT INTO changesets (uuid, client, created, query, changes, origin, origin_rowid, applied, replicated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
        params![
            cs.uuid.to_string(),
            cs.client,
            cs.created.to_rfc3339(),
            cs.query,
            cs.changes_to_json()?,
            cs.origin.to_string(),
            cs.origin_rowid,
        ],
    )?;
    debug!(changeset = %cs.uuid, origin = %cs.origin, "recorded changeset");
    Ok(cs.uuid)
}

pub(crate) fn load_on_conn(conn: &Connection, store_uuid: Uuid, uuid: &Uuid) -> Result<ChangeSet> {
    conn.query_row(
        "SELECT rowid, uuid, client, created, query, changes, origin, origin_rowid, applied, replicated
         FROM changesets WHERE uuid = ?1",
        [uuid.to_string()],
        |row| Ok(changeset_from_row(row, store_uuid)),
    )
    .optional()?
    .ok_or_else(|| StorageError::not_found("changeset", uuid))?
}

/// Flips terminal flags. Both are monotonic; callers only ever set them.
pub(crate) fn update_on_conn(
    conn: &Connection,
    uuid: &Uuid,
    update: ChangeSetUpdate,
) -> Result<()> {
    if let Some(applied) = update.applied {
        let n = conn.execute(
            "UPDATE changesets SET applied = ?1 WHERE uuid = ?2",
            params![applied as i64, uuid.to_string()],
        )?;
        if n != 1 {
            return Err(StorageError::not_found("changeset", uuid));
        }
    }
    if let Some(replicated) = update.replicated {
        let n = conn.execute(
            "UPDATE changesets SET replicated = ?1 WHERE uuid = ?2",
            params![replicated as i64, uuid.to_string()],
        )?;
        if n != 1 {
            return Err(StorageError::not_found("changeset", uuid));
        }
    }
    Ok(())
}

/// Changesets originated here, applied, and not yet shipped, in record
/// order. For local changesets the ordinal is the table rowid.
pub(crate) fn unreplicated_on_conn(conn: &Connection, store_uuid: Uuid) -> Result<Vec<ChangeSet>> {
    let mut stmt = conn.prepare(
        "SELECT rowid, uuid, client, created, query, changes, origin, rowid AS origin_rowid, applied, replicated
         FROM changesets
         WHERE origin = ?1 AND applied = 1 AND replicated = 0
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map([store_uuid.to_string()], |row| {
        Ok(changeset_from_row(row, store_uuid))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

pub(crate) fn last_ingested_on_conn(conn: &Connection, origin: &Uuid) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(origin_rowid) FROM changesets WHERE origin = ?1",
        [origin.to_string()],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0))
}

/// The last 100 changeset-items, newest first.
pub(crate) fn changesets_as_items_on_conn(conn: &Connection) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(
        "SELECT dbid, tag, prop, val, tx_ref
         FROM current_facts_inc_tx
         WHERE is_tx = 1
           AND dbid IN (
             SELECT rowid
             FROM transactions
             ORDER BY rowid DESC
             LIMIT 100
           )
         ORDER BY dbid DESC",
    )?;
    let mut rows = stmt.query([])?;

    let mut order: Vec<i64> = Vec::new();
    let mut grouped: std::collections::HashMap<i64, BTreeSet<Fact>> =
        std::collections::HashMap::new();
    while let Some(row) = rows.next()? {
        let dbid: i64 = row.get("dbid")?;
        if !grouped.contains_key(&dbid) {
            order.push(dbid);
        }
        grouped
            .entry(dbid)
            .or_default()
            .insert(items::fact_from_row(row)?);
    }

    Ok(order
        .into_iter()
        .filter_map(|dbid| grouped.remove(&dbid))
        .map(Item::new)
        .collect())
}

/// The apply state machine, run inside one backend transaction by the
/// store: materialise the changeset-item, perform each change, mark the
/// changeset applied. Returns the changeset-item followed by one item per
/// change, in change order.
pub(crate) fn apply_on_conn(
    conn: &Connection,
    coder: &RefCoder,
    store_uuid: Uuid,
    uuid: &Uuid,
) -> Result<Vec<Item>> {
    let cs = load_on_conn(conn, store_uuid, uuid)?;
    if cs.applied {
        return Err(StorageError::ChangesetAlreadyApplied(cs.uuid));
    }

    // Materialise the changeset-item.
    let (cs_ref, _) = items::next_ref_on_conn(conn, coder, &cs.uuid, &cs.created, true)?;
    let mut facts = BTreeSet::from([
        cs_ref.clone(),
        Fact::created(&Utc::now()),
        Fact::tag(fact::TAG_TX),
        Fact::value(fact::TAG_TX, "client", cs.client.clone()),
        Fact::value(fact::TAG_TX, "created", cs.created.to_rfc3339()),
        Fact::value(fact::TAG_TX, "uuid", cs.uuid.to_string()),
        Fact::value(fact::TAG_TX, "origin", cs.origin.to_string()),
        Fact::content(cs.changes_to_json()?),
    ]);
    if !cs.query.is_empty() {
        facts.insert(Fact::value(fact::TAG_TX, "query", cs.query.clone()));
    }
    let cs_item = items::create_item_on_conn(conn, &cs_ref, &cs.uuid, &Item::new(facts))?;

    let mut resp = vec![cs_item];
    for change in &cs.changes {
        let item = if change.revoke {
            items::revoke_item_facts_on_conn(conn, &cs_ref, &change.uuid, &change.facts)?
        } else if change.is_create() {
            let created = change
                .created_value()
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(cs.created);
            let (new_ref, _) =
                items::next_ref_on_conn(conn, coder, &change.uuid, &created, false)?;
            let with_ref: BTreeSet<Fact> = change
                .facts
                .iter()
                .cloned()
                .chain([new_ref])
                .collect();
            items::create_item_on_conn(conn, &cs_ref, &change.uuid, &Item::new(with_ref))?
        } else {
            items::update_item_on_conn(conn, &cs_ref, &change.uuid, &change.facts)?
        };
        resp.push(item);
    }

    update_on_conn(conn, uuid, ChangeSetUpdate::applied())?;
    info!(changeset = %cs.uuid, changes = cs.changes.len(), "applied changeset");
    Ok(resp)
}

/// Deserialises a `changesets` row. For changesets this store originated,
/// a missing ordinal falls back to the table rowid.
fn changeset_from_row(row: &Row<'_>, store_uuid: Uuid) -> Result<ChangeSet> {
    let rowid: i64 = row.get("rowid").map_err(StorageError::Query)?;
    let uuid: String = row.get("uuid").map_err(StorageError::Query)?;
    let client: String = row.get("client").map_err(StorageError::Query)?;
    let created: String = row.get("created").map_err(StorageError::Query)?;
    let query: String = row.get("query").map_err(StorageError::Query)?;
    let changes: String = row.get("changes").map_err(StorageError::Query)?;
    let origin: String = row.get("origin").map_err(StorageError::Query)?;
    let origin_rowid: Option<i64> = row.get("origin_rowid").map_err(StorageError::Query)?;
    let applied: bool = row.get("applied").map_err(StorageError::Query)?;
    let replicated: bool = row.get("replicated").map_err(StorageError::Query)?;

    let origin = items::parse_uuid(&origin)?;
    let origin_rowid = match origin_rowid {
        Some(r) => Some(r),
        None if origin == store_uuid => Some(rowid),
        None => None,
    };

    Ok(ChangeSet {
        uuid: items::parse_uuid(&uuid)?,
        client,
        origin,
        origin_rowid,
        created: DateTime::parse_from_rfc3339(&created)
            .map_err(|e| StorageError::Corrupt(format!("malformed changeset created time: {e}")))?
            .with_timezone(&Utc),
        query,
        changes: ChangeSet::changes_from_json(&changes)?,
        applied,
        replicated,
    })
}
