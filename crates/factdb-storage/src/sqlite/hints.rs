//! Tag and prop discovery (`HINTS`).

use rusqlite::Connection;

use factdb_core::{Fact, Item};

use crate::error::Result;

/// Splits a hint prefix (`"#t"`, `"t"`, `"#t/p"`, `"#t/"`) and dispatches
/// to tag or prop discovery.
pub(crate) fn get_hints_on_conn(conn: &Connection, prefix: &str) -> Result<Vec<Item>> {
    let stripped = prefix.trim_start_matches('#');
    match stripped.split_once('/') {
        Some((tag, prop_prefix)) => props_as_items(conn, tag, prop_prefix),
        None => tags_as_items(conn, stripped),
    }
}

/// One item per distinct tag with the given prefix, carrying the tag and a
/// `(_db, count, N)` fact. Hidden system tags only show up when asked for
/// explicitly.
fn tags_as_items(conn: &Connection, prefix: &str) -> Result<Vec<Item>> {
    let mut sql = String::from(
        "SELECT tag, COUNT(DISTINCT dbid) AS c
         FROM current_facts",
    );
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if !prefix.is_empty() {
        params.push(format!("{}%", escape_like(prefix)));
        conditions.push(format!("tag LIKE ?{} ESCAPE '\\'", params.len()));
    }
    if !prefix.starts_with('_') {
        conditions.push("substr(tag, 1, 1) != '_'".to_owned());
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" GROUP BY tag ORDER BY tag");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let tag: String = row.get("tag")?;
        let count: i64 = row.get("c")?;
        Ok(Item::new([
            Fact::tag(tag),
            Fact::value("_db", "count", count.to_string()),
        ]))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// One item per distinct prop of `tag` with the given prefix.
fn props_as_items(conn: &Connection, tag: &str, prefix: &str) -> Result<Vec<Item>> {
    let mut sql = String::from(
        "SELECT prop, COUNT(DISTINCT dbid) AS c
         FROM current_facts
         WHERE tag = ?1 AND prop != ''",
    );
    let mut params: Vec<String> = vec![tag.to_owned()];

    if !prefix.is_empty() {
        params.push(format!("{}%", escape_like(prefix)));
        sql.push_str(&format!(" AND prop LIKE ?{} ESCAPE '\\'", params.len()));
    }
    sql.push_str(" GROUP BY prop ORDER BY prop");

    let mut stmt = conn.prepare(&sql)?;
    let tag = tag.to_owned();
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), move |row| {
        let prop: String = row.get("prop")?;
        let count: i64 = row.get("c")?;
        Ok(Item::new([
            Fact::flag(tag.clone(), prop),
            Fact::value("_db", "count", count.to_string()),
        ]))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Escapes LIKE wildcards in a prefix; `_` is common in system tags and
/// prop names.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
