use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use osb_schemas::{Envelope, RetryItem, RetryStatus};

use crate::connections::{parse_opt_ts, parse_ts};

/// `enqueue`. Rejects a duplicate `(connection, order)` while a row
/// is still PENDING via the partial unique index; the insert is silently
/// dropped rather than erroring, mirroring the ledger's conflict-ignore
/// style, since the only caller (Worker step 7) only reaches this path after
/// the ledger dedupe has already ruled the order out as a repeat.
#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    pool: &SqlitePool,
    connection_id: &str,
    upstream_order_id: i64,
    write_date: DateTime<Utc>,
    external_id: &str,
    envelope: &Envelope,
    last_error: &str,
) -> Result<()> {
    let now = Utc::now();
    let next_retry_at = now + Duration::seconds(30);
    let envelope_json = serde_json::to_string(envelope).context("serialize envelope")?;

    sqlx::query(
        r#"
        insert or ignore into retry_items (
            connection_id, upstream_order_id, write_date, external_id, envelope_json,
            attempt_count, max_attempts, next_retry_at, last_error, status,
            created_at, updated_at
        ) values (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, 'PENDING', ?9, ?9)
        "#,
    )
    .bind(connection_id)
    .bind(upstream_order_id)
    .bind(write_date.to_rfc3339())
    .bind(external_id)
    .bind(envelope_json)
    .bind(RetryItem::DEFAULT_MAX_ATTEMPTS)
    .bind(next_retry_at.to_rfc3339())
    .bind(last_error)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .context("enqueue retry item failed")?;

    Ok(())
}

/// `due-items`: PENDING and `next_retry_at <= now`, ascending.
pub async fn due_items(
    pool: &SqlitePool,
    connection_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<RetryItem>> {
    let rows = sqlx::query(
        "select * from retry_items where connection_id = ?1 and status = 'PENDING' \
         and next_retry_at <= ?2 order by next_retry_at asc",
    )
    .bind(connection_id)
    .bind(now.to_rfc3339())
    .fetch_all(pool)
    .await
    .context("due_items query failed")?;

    rows.iter().map(row_to_retry_item).collect()
}

/// `update-after-attempt` failure path: increment
/// `attempt_count`, apply the backoff schedule, and flip to FAILED once
/// attempts reach `max_attempts`.
pub async fn record_failure(pool: &SqlitePool, id: i64, error: &str) -> Result<RetryStatus> {
    let row = sqlx::query("select attempt_count, max_attempts from retry_items where id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("record_failure lookup failed")?;
    let attempt_count: i32 = row.try_get("attempt_count")?;
    let max_attempts: i32 = row.try_get("max_attempts")?;

    let new_attempt = attempt_count + 1;
    let status = if new_attempt >= max_attempts {
        RetryStatus::Failed
    } else {
        RetryStatus::Pending
    };
    let next_retry_at = Utc::now() + Duration::seconds(RetryItem::backoff_secs_for_attempt(new_attempt));

    sqlx::query(
        "update retry_items set attempt_count = ?1, next_retry_at = ?2, last_error = ?3, \
         status = ?4, updated_at = ?5 where id = ?6",
    )
    .bind(new_attempt)
    .bind(next_retry_at.to_rfc3339())
    .bind(error)
    .bind(status.as_db_str())
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .context("record_failure update failed")?;

    Ok(status)
}

pub async fn mark_success(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("update retry_items set status = 'SUCCESS', updated_at = ?1 where id = ?2")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await
        .context("mark_success failed")?;
    Ok(())
}

pub async fn discard(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("update retry_items set status = 'DISCARDED', updated_at = ?1 where id = ?2")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await
        .context("discard failed")?;
    Ok(())
}

pub async fn list_by_connection(
    pool: &SqlitePool,
    connection_id: &str,
    limit: i64,
) -> Result<Vec<RetryItem>> {
    let rows = sqlx::query(
        "select * from retry_items where connection_id = ?1 order by updated_at desc limit ?2",
    )
    .bind(connection_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_by_connection query failed")?;

    rows.iter().map(row_to_retry_item).collect()
}

fn row_to_retry_item(row: &sqlx::sqlite::SqliteRow) -> Result<RetryItem> {
    let envelope_json: String = row.try_get("envelope_json")?;
    let status_str: String = row.try_get("status")?;

    Ok(RetryItem {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        upstream_order_id: row.try_get("upstream_order_id")?,
        write_date: parse_ts(row, "write_date")?,
        external_id: row.try_get("external_id")?,
        envelope: serde_json::from_str(&envelope_json).context("decode retry item envelope")?,
        attempt_count: row.try_get("attempt_count")?,
        max_attempts: row.try_get("max_attempts")?,
        next_retry_at: parse_ts(row, "next_retry_at")?,
        last_error: parse_opt_string(row, "last_error")?,
        status: RetryStatus::from_db_str(&status_str)
            .with_context(|| format!("unknown retry status {status_str:?}"))?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn parse_opt_string(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Option<String>> {
    Ok(row.try_get(col)?)
}
