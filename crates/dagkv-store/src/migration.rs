//! SQLite schema versioning.
//!
//! Each schema version has one step that moves the database from version
//! N-1 to N. `schema_migrations` records the steps already applied, so
//! opening an up-to-date file does nothing.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the schema of `conn` up to [`CURRENT_VERSION`].
///
/// Safe to call on every open. All pending steps run in one transaction.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Version bookkeeping lives next to the data
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // 0 when nothing has been applied yet
    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            applied, CURRENT_VERSION
        )));
    }
    if applied == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for version in (applied + 1)..=CURRENT_VERSION {
        tracing::debug!(version, "applying schema migration");
        apply_migration(&tx, version)?;

        // Record each step with the local time it ran
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_millis()],
        )?;
    }
    tx.commit()?;

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => create_blocks_table(conn),
        _ => Err(StoreError::Migration(format!(
            "no migration step for schema v{}",
            version
        ))),
    }
}

/// v1: a single content-addressed block table.
fn create_blocks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Immutable: a row is never updated once written
        CREATE TABLE blocks (
            cid BLOB PRIMARY KEY,          -- 32 bytes, Blake3 hash of bytes
            bytes BLOB NOT NULL,           -- canonical block bytes
            size INTEGER NOT NULL,         -- length of bytes
            stored_at INTEGER NOT NULL     -- local timestamp of first write
        );
        "#,
    )?;

    Ok(())
}

/// Unix time in milliseconds; 0 if the clock is before the epoch.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
