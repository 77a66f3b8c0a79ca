//! Database migrations
//!
//! Schema: accounts (ordered, keyed by did) and settings (current account pointer)

use crate::error::StorageError;
use crate::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    tracing::info!(
        from = current_version,
        to = SCHEMA_VERSION,
        "Migrating database schema"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Stored schema version; 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    // One row per identity the device has authenticated. `position` keeps
    // the account list in the order the user added accounts.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            did TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            service TEXT NOT NULL,
            identifier TEXT NOT NULL,
            handle TEXT NOT NULL,
            email TEXT,
            email_confirmed INTEGER NOT NULL DEFAULT 0,
            email_auth_factor INTEGER NOT NULL DEFAULT 0,
            access_token TEXT,
            refresh_token TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_accounts_position ON accounts(position);
    "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
    )?;

    Ok(())
}
