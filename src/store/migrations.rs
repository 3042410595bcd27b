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
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "module_workflow_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS modules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            icon TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            packages TEXT NOT NULL DEFAULT '[]',
            documentation TEXT,
            setup_instructions TEXT,
            priority INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_modules_priority ON modules(priority);

        CREATE TABLE IF NOT EXISTS env_var_requirements (
            id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            example TEXT NOT NULL DEFAULT '',
            required INTEGER NOT NULL DEFAULT 0,
            public INTEGER NOT NULL DEFAULT 0,
            oauth_provider TEXT,
            oauth_scopes TEXT,
            UNIQUE (module_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_requirements_module ON env_var_requirements(module_id);

        CREATE TABLE IF NOT EXISTS module_configurations (
            user_id TEXT NOT NULL,
            requirement_id TEXT NOT NULL REFERENCES env_var_requirements(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, requirement_id)
        );
        CREATE INDEX IF NOT EXISTS idx_configurations_user ON module_configurations(user_id);

        CREATE TABLE IF NOT EXISTS chat_modules (
            chat_id TEXT NOT NULL,
            module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            enabled INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (chat_id, module_id)
        );
        CREATE INDEX IF NOT EXISTS idx_chat_modules_chat ON chat_modules(chat_id);

        CREATE TABLE IF NOT EXISTS module_requests (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL,
            module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            tool_call_id TEXT NOT NULL UNIQUE,
            reason TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT 'pending',
            config_values TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_requests_chat ON module_requests(chat_id);
        CREATE INDEX IF NOT EXISTS idx_requests_state ON module_requests(state);
        CREATE INDEX IF NOT EXISTS idx_requests_tool_call ON module_requests(tool_call_id);
    "#,
}];

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

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!("Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
