//! History reconstruction (`HISTORY`).

use rusqlite::Connection;

use factdb_core::{Fact, Item};

use crate::error::Result;

/// With a ref: every fact-row ever written for that item, newest first.
/// Without: the rows of the last 100 transactions across the store. Each
/// row becomes an item whose content describes the write and whose ref
/// points at the changeset-item that made it.
pub(crate) fn get_history_on_conn(conn: &Connection, r: Option<&Fact>) -> Result<Vec<Item>> {
    let mut sql = String::from(
        "SELECT i.ref AS ref, f.tag AS tag, f.prop AS prop, f.val AS val, f.revoke AS revoke,
                t.ref AS tx_ref, t.created AS tx_created
         FROM facts f
         INNER JOIN items i
            ON i.rowid = f.dbid
         INNER JOIN transactions t
            ON t.rowid = f.changeset
         WHERE ",
    );
    let mut params: Vec<String> = Vec::new();

    if let Some(r) = r {
        params.push(r.value.clone());
        sql.push_str("i.ref = ?1");
    } else {
        sql.push_str(
            "f.changeset IN (
                SELECT rowid
                FROM transactions
                ORDER BY rowid DESC
                LIMIT 100
            )",
        );
    }

    sql.push_str(
        " AND f.dbid != f.changeset
          ORDER BY f.rowid DESC",
    );

    let store_wide = r.is_none();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), move |row| {
        let item_ref: String = row.get("ref")?;
        let tag: String = row.get("tag")?;
        let prop: String = row.get("prop")?;
        let val: String = row.get("val")?;
        let revoke: bool = row.get("revoke")?;
        let tx_ref: String = row.get("tx_ref")?;
        let tx_created: String = row.get("tx_created")?;

        let fact = Fact::value(tag, prop, val);
        let mut desc = if store_wide {
            format!("@{item_ref}: ")
        } else {
            String::new()
        };
        desc.push_str(if revoke { "Revoked " } else { "Added " });
        desc.push_str(&fact.to_string());

        Ok(Item::new([
            Fact::primary_ref(tx_ref),
            Fact::content(desc),
            Fact::value("_db", "created", tx_created),
        ]))
    })?;

    Ok(rows.collect::<rusqlite::Result<_>>()?)
}
