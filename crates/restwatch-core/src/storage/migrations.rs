//! Ledger schema migrations.
//!
//! Migrations are versioned and applied automatically when opening the
//! ledger. The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version, assuming 0");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: initial schema.
///
/// Creates the break log, per-day aggregates, and application sessions.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS breaks (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at       TEXT NOT NULL,
            completed_at     TEXT,
            was_completed    INTEGER NOT NULL DEFAULT 0,
            was_skipped      INTEGER NOT NULL DEFAULT 0,
            duration_seconds INTEGER
        );

        CREATE TABLE IF NOT EXISTS daily_stats (
            date              TEXT PRIMARY KEY,
            breaks_required   INTEGER NOT NULL DEFAULT 0,
            breaks_completed  INTEGER NOT NULL DEFAULT 0,
            breaks_skipped    INTEGER NOT NULL DEFAULT 0,
            total_work_minutes INTEGER NOT NULL DEFAULT 0,
            compliance_rate   REAL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at              TEXT NOT NULL,
            ended_at                TEXT,
            paused_duration_seconds INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_breaks_started_at ON breaks(started_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);",
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}
