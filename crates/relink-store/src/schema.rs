//! Table definitions and schema versioning.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{OpContext, StoreError, StoreResult};

/// Version written to `meta.schema_version` by this build
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tag_set (
    tag_set_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tags       TEXT    NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS artifact (
    artifact_id INTEGER PRIMARY KEY AUTOINCREMENT,
    package     TEXT    NOT NULL,
    file        TEXT    NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS link_invocation (
    invocation_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    program           TEXT    NOT NULL,
    tag_set_id        INTEGER NOT NULL,
    entry_artifact_id INTEGER,
    captured_at       TEXT    NOT NULL,
    UNIQUE (program, tag_set_id),
    FOREIGN KEY (tag_set_id) REFERENCES tag_set(tag_set_id),
    FOREIGN KEY (entry_artifact_id) REFERENCES artifact(artifact_id)
);
CREATE TABLE IF NOT EXISTS argument (
    invocation_id INTEGER NOT NULL,
    position      INTEGER NOT NULL,
    kind          TEXT    NOT NULL,
    token         TEXT    NOT NULL,
    PRIMARY KEY (invocation_id, position),
    FOREIGN KEY (invocation_id) REFERENCES link_invocation(invocation_id)
);
CREATE TABLE IF NOT EXISTS invocation_artifact (
    invocation_id INTEGER NOT NULL,
    artifact_id   INTEGER NOT NULL,
    PRIMARY KEY (invocation_id, artifact_id),
    FOREIGN KEY (invocation_id) REFERENCES link_invocation(invocation_id),
    FOREIGN KEY (artifact_id) REFERENCES artifact(artifact_id)
);
CREATE TABLE IF NOT EXISTS manifest_line (
    invocation_id INTEGER NOT NULL,
    line          TEXT    NOT NULL,
    PRIMARY KEY (invocation_id, line),
    FOREIGN KEY (invocation_id) REFERENCES link_invocation(invocation_id)
);
"#;

/// Create missing tables and record the schema version.
pub(crate) fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA).op("create cache tables")?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )
    .op("record schema version")?;
    check_version(conn)
}

/// Whether the file has been initialized by a capture at all.
pub(crate) fn is_initialized(conn: &Connection) -> StoreResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
            |row| row.get(0),
        )
        .optional()
        .op("inspect cache schema")?;
    Ok(found.is_some())
}

/// Fail if the file was written by an incompatible schema.
pub(crate) fn check_version(conn: &Connection) -> StoreResult<()> {
    let found: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .op("read schema version")?;

    match found {
        Some(v) if v == SCHEMA_VERSION.to_string() => Ok(()),
        Some(v) => Err(StoreError::SchemaVersion {
            found: v,
            expected: SCHEMA_VERSION,
        }),
        None => Err(StoreError::SchemaVersion {
            found: "<missing>".to_string(),
            expected: SCHEMA_VERSION,
        }),
    }
}
