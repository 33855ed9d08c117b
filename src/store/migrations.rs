//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                token TEXT NOT NULL UNIQUE,
                forward_email TEXT,
                verified_email TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_users_token ON users(token);

            CREATE TABLE IF NOT EXISTS email_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                question_package TEXT NOT NULL,
                question_extracted_body TEXT NOT NULL,
                question_sender TEXT NOT NULL,
                question_received_at TEXT NOT NULL,
                suggested_results TEXT,
                suggested_sender TEXT,
                suggested_at TEXT,
                final_saved_reply_id TEXT,
                final_sender TEXT,
                final_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_email_events_user ON email_events(user_id);
        "#,
    },
    Migration {
        version: 2,
        name: "webhook_deliveries",
        sql: r#"
            CREATE TABLE IF NOT EXISTS webhook_deliveries (
                token TEXT PRIMARY KEY,
                received_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let applied = applied_version(conn).await?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    let mut version = applied;
    for migration in pending {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        let fail = |e: libsql::Error| {
            DatabaseError::Migration(format!(
                "V{} ({}): {e}",
                migration.version, migration.name
            ))
        };
        conn.execute_batch(migration.sql).await.map_err(fail)?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(fail)?;
        version = migration.version;
    }

    tracing::debug!(version, "Database schema up to date");
    Ok(())
}

/// Highest applied version; 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let fail = |e: libsql::Error| DatabaseError::Migration(format!("reading schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(fail)?;
    match rows.next().await.map_err(fail)? {
        Some(row) => row.get::<i64>(0).map_err(fail),
        None => Ok(0),
    }
}
