use async_trait::async_trait;
use chrono::DateTime;
use deadpool::managed::Object;
use libsql::{Row, params};
use uuid::Uuid;

use super::HistoryStore;
use super::migrations::run_migrations;
use crate::error::{ErrorKind, HistoryError};
use crate::models::{CheckResult, MonitorKey, Outcome};
use crate::pool::{self, LibsqlManager, LibsqlPool};

const RESULT_COLUMNS: &str = "id, site_id, monitor_id, timestamp_ms, outcome, latency_ms, error_kind, detail";

/// History persisted to a libsql database
pub struct LibsqlHistory {
    pool: LibsqlPool,
}

impl LibsqlHistory {
    /// Open a local database file, creating and migrating it as needed
    pub async fn open(path: &str, max_connections: usize) -> Result<Self, HistoryError> {
        let pool = pool::open_local(path, max_connections).await?;
        let history = Self::new_from_pool(pool);

        let conn = history.get_conn().await?;
        run_migrations(&conn).await?;
        drop(conn);

        Ok(history)
    }

    /// Wrap an existing pool; the schema must already be migrated
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<Object<LibsqlManager>, HistoryError> {
        Ok(self.pool.get().await?)
    }
}

fn decode(row: &Row) -> Result<CheckResult, HistoryError> {
    let id: String = row.get(0)?;
    let timestamp_ms: i64 = row.get(3)?;
    let outcome: String = row.get(4)?;
    let error_kind: Option<String> = row.get(6)?;

    Ok(CheckResult {
        id: Uuid::parse_str(&id).map_err(|e| HistoryError::Corrupt(format!("id {id}: {e}")))?,
        timestamp: DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| HistoryError::Corrupt(format!("timestamp {timestamp_ms} out of range")))?,
        site_id: row.get(1)?,
        monitor_id: row.get(2)?,
        outcome: Outcome::parse(&outcome).ok_or_else(|| HistoryError::Corrupt(format!("outcome {outcome}")))?,
        latency_ms: row.get::<i64>(5)?.max(0) as u64,
        error_kind: error_kind.as_deref().map(ErrorKind::parse),
        detail: row.get(7)?,
    })
}

#[async_trait]
impl HistoryStore for LibsqlHistory {
    async fn append(&self, result: &CheckResult) -> Result<(), HistoryError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO check_results (id, site_id, monitor_id, timestamp_ms, outcome, latency_ms, error_kind, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.id.to_string(),
                result.site_id.clone(),
                result.monitor_id.clone(),
                result.timestamp.timestamp_millis(),
                result.outcome.as_str(),
                result.latency_ms as i64,
                result.error_kind.map(|k| k.as_str().to_string()),
                result.detail.clone()
            ],
        )
        .await?;
        Ok(())
    }

    async fn list(&self, key: &MonitorKey, limit: usize) -> Result<Vec<CheckResult>, HistoryError> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM check_results
             WHERE site_id = ?1 AND monitor_id = ?2
             ORDER BY seq DESC LIMIT ?3"
        );
        let mut rows = conn
            .query(&sql, params![key.site.clone(), key.monitor.clone(), limit as i64])
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(decode(&row)?);
        }
        Ok(results)
    }

    async fn count_for_site(&self, site: &str) -> Result<usize, HistoryError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM check_results WHERE site_id = ?1", params![site])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?.max(0) as usize),
            None => Ok(0),
        }
    }

    async fn evict_over_limit(&self, site: &str, keep: usize) -> Result<usize, HistoryError> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM check_results
                 WHERE site_id = ?1 AND seq NOT IN (
                     SELECT seq FROM check_results WHERE site_id = ?1 ORDER BY seq DESC LIMIT ?2
                 )",
                params![site, keep as i64],
            )
            .await?;
        Ok(deleted as usize)
    }

    async fn remove_monitor(&self, key: &MonitorKey) -> Result<usize, HistoryError> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM check_results WHERE site_id = ?1 AND monitor_id = ?2",
                params![key.site.clone(), key.monitor.clone()],
            )
            .await?;
        Ok(deleted as usize)
    }

    async fn sites(&self) -> Result<Vec<String>, HistoryError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT DISTINCT site_id FROM check_results ORDER BY site_id", ())
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(row.get::<String>(0)?);
        }
        Ok(sites)
    }
}
