//! SQLite store utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so report readers do not block ledger writers
//! - `busy_timeout = 5s` to absorb short lock waits before surfacing a conflict
//! - `foreign_keys = ON` so specimens and ledger rows cannot dangle

pub mod ledger;
pub mod migrations;
pub mod schema;
pub mod taxa;

use anyhow::{Context, bail};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};

use crate::error::{EngineError, Result};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store, apply runtime pragmas, and migrate the
/// schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

/// Open an existing store without creating it.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be opened, or was
/// created by a different schema version.
pub fn open_existing(path: &Path) -> anyhow::Result<Connection> {
    if !path.exists() {
        bail!(
            "{}: store {} does not exist",
            crate::error::ErrorCode::NotInitialized.code(),
            path.display()
        );
    }
    let conn = Connection::open(path).with_context(|| format!("open store {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    require_current_schema(&conn)?;
    Ok(conn)
}

/// Fail with [`EngineError::NotInitialized`] unless the schema is current.
///
/// # Errors
///
/// Returns an error if the version cannot be read or does not match.
pub fn require_current_schema(conn: &Connection) -> Result<()> {
    let found = migrations::current_schema_version(conn)?;
    if found == migrations::LATEST_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(EngineError::NotInitialized {
            found,
            expected: migrations::LATEST_SCHEMA_VERSION,
        })
    }
}

/// Run `work` inside an IMMEDIATE transaction.
///
/// The write lock is taken before the first read, so two writers touching
/// the same specimen are serialized instead of both computing a delta from
/// the same stale snapshot. Commits on `Ok`; any `Err` drops the
/// transaction, which rolls back every ledger and aggregate write.
///
/// # Errors
///
/// Returns the closure's error, or [`EngineError::ConcurrentModification`]
/// when the lock cannot be taken within the busy timeout.
pub fn write_transaction<T>(
    conn: &mut Connection,
    work: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = work(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Current UTC time in the audit-field format.
pub(crate) fn audit_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Open an in-memory store with the latest schema. Test support only.
#[cfg(test)]
pub(crate) fn test_store() -> Connection {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    conn.pragma_update(None, "foreign_keys", "ON")
        .expect("enable foreign keys");
    migrations::migrate(&mut conn).expect("migrate");
    conn
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, open_existing, open_store, write_transaction};
    use crate::db::migrations;
    use crate::error::EngineError;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("zoo.sqlite3");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_store_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open store");

        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn open_existing_rejects_missing_file() {
        let (_dir, path) = temp_db_path();
        let err = open_existing(&path).expect_err("missing store");
        assert!(err.to_string().contains("E1001"), "{err}");
    }

    #[test]
    fn failed_work_rolls_back() {
        let (_dir, path) = temp_db_path();
        let mut conn = open_store(&path).expect("open store");

        let result: Result<(), EngineError> = write_transaction(&mut conn, |tx| {
            tx.execute("INSERT INTO phyla (phylum_id, name) VALUES (1, 'Chordata')", [])?;
            Err(EngineError::SpecimenNotFound(42))
        });
        assert!(matches!(result, Err(EngineError::SpecimenNotFound(42))));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM phyla", [], |row| row.get(0))
            .expect("count phyla");
        assert_eq!(count, 0);
    }
}
