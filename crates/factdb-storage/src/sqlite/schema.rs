//! DDL statements and migrations for the SQLite schema.
//!
//! The schema version lives in `PRAGMA user_version`. Version 0 means a
//! fresh file: the full baseline is created and the pragma stamped.
//! Versions below [`BASELINE_VERSION`] belong to the legacy era of this
//! format (pre-`_db` fact tags, changesets without origin columns) and are
//! rejected at open; versions above [`CURRENT_VERSION`] come from a newer
//! release and are rejected too.
//!
//! Timestamps are TEXT in RFC 3339 so lexicographic ORDER BY is
//! chronological. Booleans are INTEGER 0/1. The `changes` column is JSON.

/// First version this implementation can open.
pub const BASELINE_VERSION: i32 = 12;

/// Version written by this implementation: the baseline plus one step per
/// entry in [`MIGRATIONS`].
pub const CURRENT_VERSION: i32 = BASELINE_VERSION + MIGRATIONS.len() as i32;

/// Baseline DDL, executed in order on a fresh file.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Config: salt and store bookkeeping ----------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key TEXT NOT NULL,
        val TEXT NOT NULL
    )
    "#,
    // -- Identity list: one row per item or changeset-item -------------------
    // The integer rowid is the id the salt-keyed hash maps to/from `ref`.
    // Exactly one of uuid / changeset_uuid is populated.
    r#"
    CREATE TABLE IF NOT EXISTS idlist (
        ref            TEXT,
        uuid           TEXT,
        changeset_uuid TEXT,
        created        TEXT NOT NULL,
        archived       INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_idlist_ref ON idlist (ref)",
    "CREATE INDEX IF NOT EXISTS idx_idlist_uuid ON idlist (uuid)",
    "CREATE INDEX IF NOT EXISTS idx_idlist_changeset_uuid ON idlist (changeset_uuid)",
    "CREATE INDEX IF NOT EXISTS idx_idlist_created ON idlist (created)",
    "CREATE INDEX IF NOT EXISTS idx_idlist_archived ON idlist (archived)",
    // -- Facts: the append-only log ------------------------------------------
    // `dbid` references idlist.rowid; `changeset` references the
    // changeset-item's rowid. Rows are written once and never deleted;
    // `current` is flipped 1 -> 0 by the collapse trigger.
    r#"
    CREATE TABLE IF NOT EXISTS facts (
        changeset INTEGER NOT NULL,
        dbid      INTEGER NOT NULL,
        tag       TEXT NOT NULL,
        prop      TEXT NOT NULL DEFAULT '',
        val       TEXT NOT NULL DEFAULT '',
        revoke    INTEGER NOT NULL DEFAULT 0,
        current   INTEGER NOT NULL DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_facts_dbid ON facts (dbid)",
    "CREATE INDEX IF NOT EXISTS idx_facts_tag ON facts (tag)",
    "CREATE INDEX IF NOT EXISTS idx_facts_prop ON facts (prop)",
    "CREATE INDEX IF NOT EXISTS idx_facts_current ON facts (current)",
    "CREATE INDEX IF NOT EXISTS idx_facts_revoke ON facts (revoke)",
    // -- Changesets -----------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS changesets (
        uuid         TEXT NOT NULL,
        client       TEXT NOT NULL,
        created      TEXT NOT NULL,
        query        TEXT NOT NULL DEFAULT '',
        changes      TEXT NOT NULL,
        origin       TEXT NOT NULL,
        origin_rowid INTEGER,
        applied      INTEGER NOT NULL DEFAULT 0,
        replicated   INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_changesets_uuid ON changesets (uuid)",
    "CREATE INDEX IF NOT EXISTS idx_changesets_origin ON changesets (origin, origin_rowid)",
    // -- Views ----------------------------------------------------------------
    r#"
    CREATE VIEW IF NOT EXISTS items
    AS
    SELECT rowid, ref, uuid, archived, created
        FROM idlist
        WHERE changeset_uuid IS NULL
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS current_items
    AS
    SELECT rowid, ref, uuid, created
        FROM items
        WHERE archived = 0
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS transactions
    AS
    SELECT rowid, ref, changeset_uuid AS uuid, archived, created
        FROM idlist
        WHERE uuid IS NULL
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS current_facts_inc_tx
    AS
    SELECT i.ref, f.dbid, f.tag, f.prop, f.val, t.ref AS tx_ref, i.archived, i.created,
           CASE WHEN i.changeset_uuid IS NOT NULL THEN 1 ELSE 0 END AS is_tx
        FROM facts f
        INNER JOIN idlist i
            ON i.rowid = f.dbid
        INNER JOIN transactions t
            ON t.rowid = f.changeset
        WHERE f.current = 1
        AND f.revoke = 0
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS current_facts_inc_archived
    AS
    SELECT ref, dbid, tag, prop, val, tx_ref, archived, created
        FROM current_facts_inc_tx
        WHERE is_tx = 0
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS current_facts
    AS
    SELECT ref, dbid, tag, prop, val, tx_ref, created
        FROM current_facts_inc_archived
        WHERE archived = 0
    "#,
    // -- Collapse trigger -----------------------------------------------------
    // After a row lands with current = 1, every other current row in its
    // (dbid, tag, prop) group flips to 0: latest insert wins.
    r#"
    CREATE TRIGGER IF NOT EXISTS collapse_current_facts
    AFTER INSERT
        ON facts
    FOR EACH ROW
    WHEN
        1 NOT IN (SELECT COUNT(rowid) FROM facts
                  WHERE current = 1 AND dbid = new.dbid
                    AND tag = new.tag AND prop = new.prop)
    BEGIN
        UPDATE facts
        SET current = 0
        WHERE dbid = new.dbid
            AND rowid != new.rowid
            AND current = 1
            AND tag = new.tag
            AND prop = new.prop;
    END
    "#,
];

/// Forward-only migration steps past the baseline: `(version, name, sql)`.
/// A file at version `v` gets every step with version greater than `v`, in
/// order, and the pragma bumped after each.
pub const MIGRATIONS: &[(i32, &str, &str)] = &[];
