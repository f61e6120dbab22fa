//! Item reads and fact-row writes for [`SqliteStore`].
//!
//! Free functions over `&Connection` so the same code runs both standalone
//! (behind the store's lock) and inside the apply transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use factdb_core::{Fact, Item, RefCoder};

use crate::error::{Result, StorageError};

/// Maximum number of items a search returns.
pub(crate) const SEARCH_CAP: usize = 100;

/// Deserialises a `current_facts*` row into a [`Fact`].
pub(crate) fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let tag: String = row.get("tag")?;
    let prop: String = row.get("prop")?;
    let val: String = row.get("val")?;
    let mut fact = Fact::value(tag, prop, val);
    if let Ok(Some(tx)) = row.get::<_, Option<String>>("tx_ref") {
        fact = fact.with_tx(tx);
    }
    Ok(fact)
}

/// Allocates the next id, materialises its ref via the salt-keyed hash, and
/// persists the mapping. For changeset-items the uuid lands in
/// `changeset_uuid`; for regular items in `uuid`.
pub(crate) fn next_ref_on_conn(
    conn: &Connection,
    coder: &RefCoder,
    uid: &Uuid,
    created: &DateTime<Utc>,
    is_changeset: bool,
) -> Result<(Fact, i64)> {
    let uid = uid.to_string();
    let (item_uuid, changeset_uuid) = if is_changeset {
        (None, Some(uid))
    } else {
        (Some(uid), None)
    };

    conn.execute(
        "INSERT INTO idlist (created, uuid, changeset_uuid, archived) VALUES (?1, ?2, ?3, 0)",
        params![created.to_rfc3339(), item_uuid, changeset_uuid],
    )?;
    let id = conn.last_insert_rowid();

    let ref_value = coder.encode(id as u64);
    if coder.decode(&ref_value) != Some(id as u64) {
        return Err(StorageError::Corrupt(format!(
            "ref {ref_value} does not round-trip to id {id}"
        )));
    }

    let updated = conn.execute(
        "UPDATE idlist SET ref = ?1 WHERE rowid = ?2 AND ref IS NULL",
        params![ref_value, id],
    )?;
    if updated != 1 {
        return Err(StorageError::Corrupt(format!(
            "unexpected result storing new ref {ref_value}"
        )));
    }

    debug!(id, r = %ref_value, "allocated ref");
    Ok((Fact::primary_ref(ref_value), id))
}

/// The current facts behind a ref, including archived items and
/// changeset-items.
pub(crate) fn get_item_on_conn(conn: &Connection, ref_value: &str) -> Result<Option<Item>> {
    let mut stmt = conn
        .prepare("SELECT tag, prop, val, tx_ref FROM current_facts_inc_tx WHERE ref = ?1")?;
    let facts = stmt
        .query_map([ref_value], fact_from_row)?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    if facts.is_empty() {
        return Ok(None);
    }
    Ok(Some(Item::new(facts)))
}

pub(crate) fn ref_to_uuid_on_conn(conn: &Connection, ref_value: &str) -> Result<Option<Uuid>> {
    let found: Option<Option<String>> = conn
        .query_row("SELECT uuid FROM idlist WHERE ref = ?1", [ref_value], |row| {
            row.get(0)
        })
        .optional()?;
    match found.flatten() {
        Some(uuid) => Ok(Some(parse_uuid(&uuid)?)),
        None => Ok(None),
    }
}

/// Resolves a durable uuid (item or changeset) to its ref here.
pub(crate) fn uuid_to_ref_on_conn(conn: &Connection, uuid: &Uuid) -> Result<Option<Fact>> {
    let found: Option<String> = conn
        .query_row(
            "SELECT ref FROM idlist WHERE uuid = ?1 OR changeset_uuid = ?1",
            [uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.map(Fact::primary_ref))
}

pub(crate) fn get_item_by_uuid_on_conn(conn: &Connection, uuid: &Uuid) -> Result<Option<Item>> {
    match uuid_to_ref_on_conn(conn, uuid)? {
        Some(r) => get_item_on_conn(conn, &r.value),
        None => Ok(None),
    }
}

/// ANDs the search facts over the current, unarchived view: one join per
/// term, results grouped per item in creation order, capped at
/// [`SEARCH_CAP`].
pub(crate) fn get_items_on_conn(conn: &Connection, search: &[Fact]) -> Result<Vec<Item>> {
    let mut sql = String::from(
        "SELECT c.dbid AS dbid, c.tag AS tag, c.prop AS prop, c.val AS val, c.tx_ref AS tx_ref
         FROM current_facts c",
    );
    let mut params_vec: Vec<String> = Vec::new();

    for fact in search {
        let prefix = format!("f{}", params_vec.len());
        let clause = if fact.is_tag() {
            params_vec.push(fact.tag.clone());
            format!("{prefix}.tag = ?{}", params_vec.len())
        } else if fact.is_content() {
            // Content is a caseless substring match.
            params_vec.push(format!("%{}%", fact.value));
            format!(
                "{prefix}.tag = '_db' AND {prefix}.prop = 'content' AND {prefix}.val LIKE ?{}",
                params_vec.len()
            )
        } else if fact.is_ref() {
            return Err(StorageError::InvalidSearch(fact.to_string()));
        } else if fact.is_flag() {
            params_vec.push(fact.tag.clone());
            let tag_n = params_vec.len();
            params_vec.push(fact.prop.clone());
            format!("{prefix}.tag = ?{tag_n} AND {prefix}.prop = ?{}", params_vec.len())
        } else if fact.has_value() {
            params_vec.push(fact.tag.clone());
            let tag_n = params_vec.len();
            params_vec.push(fact.prop.clone());
            let prop_n = params_vec.len();
            params_vec.push(fact.value.clone());
            format!(
                "{prefix}.tag = ?{tag_n} AND {prefix}.prop = ?{prop_n} AND {prefix}.val = ?{}",
                params_vec.len()
            )
        } else {
            return Err(StorageError::InvalidSearch(fact.to_string()));
        };
        sql.push_str(&format!(
            " INNER JOIN current_facts AS {prefix} ON c.dbid = {prefix}.dbid AND {clause}"
        ));
    }

    sql.push_str(" ORDER BY c.created");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params_vec.iter()))?;

    // Group rows per item, keeping first-seen (creation) order.
    let mut order: Vec<i64> = Vec::new();
    let mut grouped: std::collections::HashMap<i64, BTreeSet<Fact>> =
        std::collections::HashMap::new();
    while let Some(row) = rows.next()? {
        let dbid: i64 = row.get("dbid")?;
        if !grouped.contains_key(&dbid) {
            if order.len() >= SEARCH_CAP {
                break;
            }
            order.push(dbid);
        }
        grouped.entry(dbid).or_default().insert(fact_from_row(row)?);
    }

    Ok(order
        .into_iter()
        .filter_map(|dbid| grouped.remove(&dbid))
        .map(Item::new)
        .collect())
}

/// Appends fact rows for the item with durable id `uid`, attributed to the
/// changeset-item `changeset_ref`. The collapse trigger retires older rows
/// in each `(dbid, tag, prop)` group; the idlist archived column follows
/// the archived flag.
pub(crate) fn add_facts_on_conn<'a>(
    conn: &Connection,
    changeset_ref: &Fact,
    uid: &Uuid,
    facts: impl IntoIterator<Item = &'a Fact>,
    revoke: bool,
) -> Result<()> {
    let (dbid, archived): (i64, i64) = conn
        .query_row(
            "SELECT rowid, archived FROM idlist WHERE uuid = ?1 OR changeset_uuid = ?1",
            [uid.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("item", uid))?;

    let csid: i64 = conn
        .query_row(
            "SELECT rowid FROM transactions WHERE ref = ?1",
            [changeset_ref.value.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("transaction", &changeset_ref.value))?;

    let mut archive_changed: Option<bool> = None;
    let mut stmt = conn.prepare(
        "INSERT INTO facts (changeset, dbid, tag, prop, val, revoke, current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
    )?;
    for fact in facts {
        if fact.is_archived_flag() {
            archive_changed = Some(!revoke);
        }
        stmt.execute(params![
            csid,
            dbid,
            fact.tag,
            fact.prop,
            fact.value,
            revoke as i64
        ])?;
    }

    if let Some(now_archived) = archive_changed {
        if (now_archived as i64) != archived {
            conn.execute(
                "UPDATE idlist SET archived = ?1 WHERE rowid = ?2",
                params![now_archived as i64, dbid],
            )?;
        }
    }

    Ok(())
}

/// Writes a new item's initial facts and reads the materialised item back.
pub(crate) fn create_item_on_conn(
    conn: &Connection,
    changeset_ref: &Fact,
    uid: &Uuid,
    item: &Item,
) -> Result<Item> {
    add_facts_on_conn(conn, changeset_ref, uid, item.facts(), false)?;
    read_back(conn, uid)
}

pub(crate) fn update_item_on_conn(
    conn: &Connection,
    changeset_ref: &Fact,
    uid: &Uuid,
    facts: &BTreeSet<Fact>,
) -> Result<Item> {
    add_facts_on_conn(conn, changeset_ref, uid, facts.iter(), false)?;
    read_back(conn, uid)
}

pub(crate) fn revoke_item_facts_on_conn(
    conn: &Connection,
    changeset_ref: &Fact,
    uid: &Uuid,
    facts: &BTreeSet<Fact>,
) -> Result<Item> {
    add_facts_on_conn(conn, changeset_ref, uid, facts.iter(), true)?;
    read_back(conn, uid)
}

fn read_back(conn: &Connection, uid: &Uuid) -> Result<Item> {
    get_item_by_uuid_on_conn(conn, uid)?.ok_or_else(|| StorageError::not_found("item", uid))
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| StorageError::Corrupt(format!("malformed uuid: {s}")))
}
