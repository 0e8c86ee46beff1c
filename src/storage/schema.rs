//! Database schema definitions
//!
//! The SQLite backend emulates a hash-per-key store: every page is a set of
//! named fields under a namespaced key (`<prefix>:pages:<url>`).

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per (key, field) pair
CREATE TABLE IF NOT EXISTS page_fields (
    key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (key, field)
) WITHOUT ROWID;
"#;

/// Creates the field table if it does not exist yet
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
