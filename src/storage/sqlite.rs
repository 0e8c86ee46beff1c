//! SQLite storage implementation
//!
//! Records are stored as named fields under `<prefix>:pages:<url>`, the way a
//! hash-per-key store would hold them. See [`crate::storage::codec`] for how
//! fields are encoded.

use crate::page::PageRecord;
use crate::storage::codec::{decode_fields, encode_fields};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Backend, StorageError, StorageResult};
use rusqlite::{params, Connection, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteBackend {
    conn: Option<Connection>,
    namespace: String,
}

impl SqliteBackend {
    /// Opens (or creates) a database file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `prefix` - Namespace prefix; keys are `<prefix>:pages:<url>`
    pub fn open(path: &Path, prefix: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::from_connection(conn, prefix)
    }

    /// Creates an in-memory database
    pub fn open_in_memory(prefix: &str) -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, prefix)
    }

    fn from_connection(conn: Connection, prefix: &str) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Some(conn),
            namespace: format!("{}:pages:", prefix),
        })
    }

    /// Returns the namespaced storage key for a URL
    pub fn namespaced_key(&self, url: &str) -> String {
        format!("{}{}", self.namespace, url)
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    fn conn_mut(&mut self) -> StorageResult<&mut Connection> {
        self.conn.as_mut().ok_or(StorageError::Closed)
    }

    fn namespace_len(&self) -> i64 {
        self.namespace.chars().count() as i64
    }
}

fn write_record(tx: &Transaction<'_>, key: &str, record: &PageRecord) -> StorageResult<()> {
    tx.execute("DELETE FROM page_fields WHERE key = ?1", params![key])?;

    let mut stmt =
        tx.prepare_cached("INSERT INTO page_fields (key, field, value) VALUES (?1, ?2, ?3)")?;
    for (field, value) in encode_fields(record)? {
        stmt.execute(params![key, field, value])?;
    }
    Ok(())
}

impl Backend for SqliteBackend {
    fn get(&self, key: &str) -> StorageResult<Option<PageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT field, value FROM page_fields WHERE key = ?1")?;

        let fields = stmt
            .query_map(params![self.namespaced_key(key)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        if fields.is_empty() {
            return Ok(None);
        }
        decode_fields(fields).map(Some)
    }

    fn put(&mut self, key: &str, record: &PageRecord) -> StorageResult<()> {
        let key = self.namespaced_key(key);
        let tx = self.conn_mut()?.transaction()?;
        write_record(&tx, &key, record)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<Option<PageRecord>> {
        let existing = self.get(key)?;
        if existing.is_some() {
            let key = self.namespaced_key(key);
            self.conn()?
                .execute("DELETE FROM page_fields WHERE key = ?1", params![key])?;
        }
        Ok(existing)
    }

    fn entries(&self) -> StorageResult<Vec<(String, PageRecord)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT key, field, value FROM page_fields
             WHERE substr(key, 1, ?2) = ?1 ORDER BY key",
        )?;

        let mut grouped: BTreeMap<String, HashMap<String, String>> = BTreeMap::new();
        let rows = stmt.query_map(params![self.namespace, self.namespace_len()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (key, field, value) = row?;
            grouped.entry(key).or_default().insert(field, value);
        }

        grouped
            .into_iter()
            .map(|(key, fields)| {
                let url = key
                    .strip_prefix(&self.namespace)
                    .unwrap_or(&key)
                    .to_string();
                Ok((url, decode_fields(fields)?))
            })
            .collect()
    }

    fn merge(&mut self, records: Vec<(String, PageRecord)>) -> StorageResult<()> {
        let keyed: Vec<_> = records
            .into_iter()
            .map(|(key, record)| (self.namespaced_key(&key), record))
            .collect();

        let tx = self.conn_mut()?.transaction()?;
        for (key, record) in &keyed {
            write_record(&tx, key, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(DISTINCT key) FROM page_fields WHERE substr(key, 1, ?2) = ?1",
            params![self.namespace, self.namespace_len()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM page_fields WHERE key = ?1)",
            params![self.namespaced_key(key)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn clear(&mut self) -> StorageResult<()> {
        let namespace_len = self.namespace_len();
        let namespace = self.namespace.clone();
        self.conn()?.execute(
            "DELETE FROM page_fields WHERE substr(key, 1, ?2) = ?1",
            params![namespace, namespace_len],
        )?;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        }
        Ok(())
    }
}
