use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use osb_schemas::{BreakerState, SyncLog};

use crate::connections::parse_ts;

/// Fields the Worker supplies when appending one cycle's observability
/// record. `id`/`started_at` are assigned by the caller
/// before the cycle begins so the log is append-only even for a cycle that
/// errors partway through — no partial SyncLog is ever persisted.
#[derive(Debug, Clone)]
pub struct NewSyncLog {
    pub connection_id: String,
    pub started_at: chrono::DateTime<Utc>,
    pub orders_found: i32,
    pub orders_sent: i32,
    pub orders_failed: i32,
    pub orders_skipped_by_ledger: i32,
    pub duration_ms: i64,
    pub error_summary: Option<String>,
    pub breaker_state_on_entry: BreakerState,
    pub breaker_state_on_exit: BreakerState,
}

pub async fn append(pool: &SqlitePool, log: &NewSyncLog) -> Result<i64> {
    let result = sqlx::query(
        r#"
        insert into sync_logs (
            connection_id, started_at, orders_found, orders_sent, orders_failed,
            orders_skipped_by_ledger, duration_ms, error_summary,
            breaker_state_on_entry, breaker_state_on_exit
        ) values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&log.connection_id)
    .bind(log.started_at.to_rfc3339())
    .bind(log.orders_found)
    .bind(log.orders_sent)
    .bind(log.orders_failed)
    .bind(log.orders_skipped_by_ledger)
    .bind(log.duration_ms)
    .bind(&log.error_summary)
    .bind(log.breaker_state_on_entry.as_db_str())
    .bind(log.breaker_state_on_exit.as_db_str())
    .execute(pool)
    .await
    .context("append sync log failed")?;

    Ok(result.last_insert_rowid())
}

pub async fn list_by_connection(
    pool: &SqlitePool,
    connection_id: &str,
    limit: i64,
) -> Result<Vec<SyncLog>> {
    let rows = sqlx::query(
        "select * from sync_logs where connection_id = ?1 order by started_at desc limit ?2",
    )
    .bind(connection_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_by_connection query failed")?;

    rows.iter()
        .map(|row| {
            let entry_str: String = row.try_get("breaker_state_on_entry")?;
            let exit_str: String = row.try_get("breaker_state_on_exit")?;
            Ok(SyncLog {
                id: row.try_get("id")?,
                connection_id: row.try_get("connection_id")?,
                started_at: parse_ts(row, "started_at")?,
                orders_found: row.try_get("orders_found")?,
                orders_sent: row.try_get("orders_sent")?,
                orders_failed: row.try_get("orders_failed")?,
                orders_skipped_by_ledger: row.try_get("orders_skipped_by_ledger")?,
                duration_ms: row.try_get("duration_ms")?,
                error_summary: row.try_get("error_summary")?,
                breaker_state_on_entry: BreakerState::from_db_str(&entry_str)
                    .context("unknown breaker_state_on_entry")?,
                breaker_state_on_exit: BreakerState::from_db_str(&exit_str)
                    .context("unknown breaker_state_on_exit")?,
            })
        })
        .collect()
}
