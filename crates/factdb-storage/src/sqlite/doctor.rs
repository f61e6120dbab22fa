//! Store consistency checks.
//!
//! Verifies the invariants the engine relies on: the ref mapping
//! round-trips, every identity row is either an item or a changeset-item,
//! each applied changeset has exactly one changeset-item, and the archived
//! column agrees with the archived flag fact.

use rusqlite::Connection;
use tracing::debug;

use factdb_core::RefCoder;

use crate::error::Result;
use crate::sqlite::store::SqliteStore;

/// A single detected inconsistency, already rendered for display.
pub type Problem = String;

/// Runs all checks and returns the problems found (empty means healthy).
pub fn check(store: &SqliteStore) -> Result<Vec<Problem>> {
    let conn = store.lock_conn()?;
    let mut problems = Vec::new();
    check_idlist(&conn, store.coder(), &mut problems)?;
    check_changesets(&conn, &mut problems)?;
    check_archived(&conn, &mut problems)?;
    debug!(problems = problems.len(), "doctor finished");
    Ok(problems)
}

fn check_idlist(conn: &Connection, coder: &RefCoder, problems: &mut Vec<Problem>) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT rowid, ref, uuid, changeset_uuid FROM idlist ORDER BY rowid")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let rowid: i64 = row.get(0)?;
        let ref_value: Option<String> = row.get(1)?;
        let uuid: Option<String> = row.get(2)?;
        let changeset_uuid: Option<String> = row.get(3)?;

        match ref_value {
            None => problems.push(format!("idlist row {rowid} has no ref")),
            Some(r) => {
                if coder.decode(&r) != Some(rowid as u64) {
                    problems.push(format!("ref {r} does not decode to id {rowid}"));
                }
                if coder.encode(rowid as u64) != r {
                    problems.push(format!("id {rowid} does not encode to ref {r}"));
                }
            }
        }

        match (uuid.is_some(), changeset_uuid.is_some()) {
            (true, true) => {
                problems.push(format!("idlist row {rowid} is both item and changeset"))
            }
            (false, false) => problems.push(format!("idlist row {rowid} has no uuid")),
            _ => {}
        }
    }
    Ok(())
}

fn check_changesets(conn: &Connection, problems: &mut Vec<Problem>) -> Result<()> {
    // Every applied changeset has exactly one changeset-item carrying its
    // uuid as a `_tx/uuid` fact.
    let mut stmt = conn.prepare(
        "SELECT c.uuid,
                (SELECT COUNT(DISTINCT f.dbid)
                 FROM facts f
                 INNER JOIN transactions t ON t.rowid = f.dbid
                 WHERE f.tag = '_tx' AND f.prop = 'uuid' AND f.val = c.uuid
                   AND f.current = 1 AND f.revoke = 0) AS items
         FROM changesets c
         WHERE c.applied = 1",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let uuid: String = row.get(0)?;
        let items: i64 = row.get(1)?;
        if items != 1 {
            problems.push(format!(
                "applied changeset {uuid} has {items} changeset-items, expected 1"
            ));
        }
    }
    Ok(())
}

fn check_archived(conn: &Connection, problems: &mut Vec<Problem>) -> Result<()> {
    // The denormalised archived column must agree with the current archived
    // flag fact.
    let mut stmt = conn.prepare(
        "SELECT i.rowid, i.archived,
                EXISTS (SELECT 1 FROM facts f
                        WHERE f.dbid = i.rowid
                          AND f.tag = '_db' AND f.prop = 'archived'
                          AND f.current = 1 AND f.revoke = 0) AS flagged
         FROM idlist i
         WHERE i.changeset_uuid IS NULL",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let rowid: i64 = row.get(0)?;
        let archived: bool = row.get(1)?;
        let flagged: bool = row.get(2)?;
        if archived != flagged {
            problems.push(format!(
                "item {rowid} archived column is {archived} but flag fact says {flagged}"
            ));
        }
    }
    Ok(())
}
