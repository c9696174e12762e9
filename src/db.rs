use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::store::{
    AddressRecord, AddressStore, AllowStore, InsertOutcome, NewAddressRecord, RecordFilter,
};

/// Timestamps are stored as fixed-width RFC3339 UTC text with microsecond
/// precision, so lexical order in SQL equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    // ==========================================================================
    // Exit Nodes Table (unique on address, never updated)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exit_nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT UNIQUE NOT NULL,
            country TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Allowlist Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS allowlist (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exit_nodes_country ON exit_nodes(country)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exit_nodes_timestamp ON exit_nodes(timestamp)",
        [],
    )?;

    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn insert_exit_node(conn: &Connection, record: &NewAddressRecord) -> Result<InsertOutcome> {
    let result = conn.execute(
        "INSERT INTO exit_nodes (ip_address, country, timestamp) VALUES (?1, ?2, ?3)",
        params![
            record.address,
            record.country_code,
            format_timestamp(&record.ingested_at),
        ],
    );

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to insert exit node")),
    }
}

pub fn exit_node_exists(conn: &Connection, address: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM exit_nodes WHERE ip_address = ?1",
            params![address],
            |_| Ok(()),
        )
        .optional()?;

    Ok(found.is_some())
}

pub fn get_exit_nodes(conn: &Connection, filter: &RecordFilter) -> Result<Vec<AddressRecord>> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(country) = &filter.country {
        values.push(country.clone());
        clauses.push(format!("country = ?{}", values.len()));
    }
    if let Some(after) = &filter.ingested_after {
        values.push(format_timestamp(after));
        clauses.push(format!("timestamp > ?{}", values.len()));
    }
    if let Some(before) = &filter.ingested_before {
        values.push(format_timestamp(before));
        clauses.push(format!("timestamp < ?{}", values.len()));
    }

    let mut sql = String::from("SELECT id, ip_address, country, timestamp FROM exit_nodes");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id ASC");

    debug!(sql = %sql, "querying exit nodes");

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let timestamp_str: String = row.get(3)?;

            Ok(AddressRecord {
                id: row.get(0)?,
                address: row.get(1)?,
                country_code: row.get(2)?,
                ingested_at: parse_timestamp(3, &timestamp_str)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM exit_nodes", [], |row| row.get(0))?;
    Ok(count)
}

pub fn insert_allowlist_entry(conn: &Connection, address: &str) -> Result<InsertOutcome> {
    let result = conn.execute(
        "INSERT INTO allowlist (ip_address) VALUES (?1)",
        params![address],
    );

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to insert allowlist entry")),
    }
}

pub fn delete_allowlist_entry(conn: &Connection, address: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM allowlist WHERE ip_address = ?1",
        params![address],
    )?;
    Ok(deleted > 0)
}

pub fn get_allowlist(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT ip_address FROM allowlist ORDER BY id ASC")?;
    let addresses = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(addresses)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Both stores backed by one SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }
}

impl AddressStore for SqliteStore {
    fn contains_address(&self, address: &str) -> Result<bool> {
        let conn = self.conn()?;
        exit_node_exists(&conn, address)
    }

    fn insert_address(&self, record: &NewAddressRecord) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        insert_exit_node(&conn, record)
    }

    fn find_addresses(&self, filter: &RecordFilter) -> Result<Vec<AddressRecord>> {
        let conn = self.conn()?;
        get_exit_nodes(&conn, filter)
    }

    fn count_addresses(&self) -> Result<i64> {
        let conn = self.conn()?;
        verify_count(&conn)
    }
}

impl AllowStore for SqliteStore {
    fn insert_allowed(&self, address: &str) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        insert_allowlist_entry(&conn, address)
    }

    fn delete_allowed(&self, address: &str) -> Result<bool> {
        let conn = self.conn()?;
        delete_allowlist_entry(&conn, address)
    }

    fn allowed_addresses(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        get_allowlist(&conn)
    }
}
