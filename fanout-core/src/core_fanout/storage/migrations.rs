//! Database migrations for destinations and broadcast batches
//!
//! Each migration is applied atomically and tracked in the
//! `fanout_schema_version` table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use crate::core_fanout::errors::StoreResult;
use crate::core_fanout::types::now_millis;

/// Current schema version for core_fanout
pub const CURRENT_FANOUT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Destinations and broadcast batches",
            up_sql: r#"
                -- Registered destination channels
                CREATE TABLE IF NOT EXISTS destinations (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    destination_id INTEGER NOT NULL UNIQUE,
                    registered_at INTEGER NOT NULL
                );

                -- One row per broadcast call
                CREATE TABLE IF NOT EXISTS batches (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    batch_id TEXT NOT NULL UNIQUE,
                    origin_chat_id INTEGER NOT NULL,
                    origin_message_id INTEGER NOT NULL,
                    state TEXT NOT NULL CHECK(state IN ('Broadcasting', 'Active', 'Retracting')),
                    state_since INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_batches_origin
                    ON batches(origin_chat_id, origin_message_id);

                -- One row per successful copy
                CREATE TABLE IF NOT EXISTS batch_members (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    batch_id TEXT NOT NULL,
                    destination_id INTEGER NOT NULL,
                    remote_message_id INTEGER NOT NULL,
                    FOREIGN KEY (batch_id) REFERENCES batches(batch_id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_batch_members_batch ON batch_members(batch_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Remember purged batch ids",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS retired_batch_ids (
                    batch_id TEXT PRIMARY KEY,
                    retired_at INTEGER NOT NULL
                );
            "#,
        },
    ]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> StoreResult<i32> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fanout_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM fanout_schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> StoreResult<()> {
    let current_version = get_current_version(pool)?;

    let pending_migrations: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending_migrations.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;

    for migration in pending_migrations {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO fanout_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now_millis() as i64],
        )?;

        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
