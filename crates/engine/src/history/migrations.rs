use chrono::Utc;
use libsql::Connection;
use tracing::info;

use crate::error::HistoryError;

/// Increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Bring the history schema up to date
pub async fn run_migrations(conn: &Connection) -> Result<(), HistoryError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;
    if current_version >= SCHEMA_VERSION {
        info!("History schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Running history migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Create check_results").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Index check_results by site and monitor").await?;
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, HistoryError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<i32>>(0)?.unwrap_or(0)),
        None => Ok(0),
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), HistoryError> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
        libsql::params![version, Utc::now().timestamp(), description],
    )
    .await?;

    info!("Applied history migration v{}: {}", version, description);
    Ok(())
}

/// `seq` gives a total append order independent of wall-clock timestamps
async fn run_migration_v1(conn: &Connection) -> Result<(), HistoryError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS check_results (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            site_id TEXT NOT NULL,
            monitor_id TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            latency_ms INTEGER NOT NULL,
            error_kind TEXT,
            detail TEXT NOT NULL
        )",
        (),
    )
    .await?;
    Ok(())
}

async fn run_migration_v2(conn: &Connection) -> Result<(), HistoryError> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_check_results_site ON check_results(site_id, seq)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_check_results_monitor ON check_results(site_id, monitor_id, seq)",
        (),
    )
    .await?;
    Ok(())
}
