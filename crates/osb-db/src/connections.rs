use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use osb_schemas::{BreakerState, Connection, NewConnection};

use crate::crypto::Encryptor;

pub async fn list_active(pool: &SqlitePool, enc: &Encryptor) -> Result<Vec<Connection>> {
    let rows = sqlx::query("select * from connections where active = 1 order by created_at")
        .fetch_all(pool)
        .await
        .context("list_active query failed")?;
    rows.iter().map(|r| row_to_connection(r, enc)).collect()
}

pub async fn list_all(pool: &SqlitePool, enc: &Encryptor) -> Result<Vec<Connection>> {
    let rows = sqlx::query("select * from connections order by created_at")
        .fetch_all(pool)
        .await
        .context("list_all query failed")?;
    rows.iter().map(|r| row_to_connection(r, enc)).collect()
}

pub async fn get_by_id(
    pool: &SqlitePool,
    enc: &Encryptor,
    id: &str,
) -> Result<Option<Connection>> {
    let row = sqlx::query("select * from connections where id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get_by_id query failed")?;
    row.map(|r| row_to_connection(&r, enc)).transpose()
}

pub async fn create(
    pool: &SqlitePool,
    enc: &Encryptor,
    new: &NewConnection,
) -> Result<Connection> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let poll_interval = new
        .poll_interval_secs
        .unwrap_or(Connection::DEFAULT_POLL_INTERVAL_SECS);
    let api_key_encrypted = enc.encrypt(&new.api_key).context("encrypt api_key")?;
    let webhook_secret_encrypted = enc
        .encrypt(&new.webhook_secret)
        .context("encrypt webhook_secret")?;

    sqlx::query(
        r#"
        insert into connections (
            id, name, upstream_base_url, upstream_db, upstream_username,
            api_key_encrypted, session_id, webhook_url, webhook_secret_encrypted,
            downstream_store_id, downstream_client_id, poll_interval_secs, active,
            last_sync_at, breaker_state, breaker_failure_count,
            breaker_half_open_successes, breaker_earliest_retry_at,
            created_at, updated_at
        ) values (
            ?1, ?2, ?3, ?4, ?5, ?6, null, ?7, ?8, ?9, ?10, ?11, 1,
            null, 'CLOSED', 0, 0, null, ?12, ?12
        )
        "#,
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.upstream_base_url)
    .bind(&new.upstream_db)
    .bind(&new.upstream_username)
    .bind(api_key_encrypted)
    .bind(&new.webhook_url)
    .bind(webhook_secret_encrypted)
    .bind(&new.downstream_store_id)
    .bind(&new.downstream_client_id)
    .bind(poll_interval)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .context("create connection failed")?;

    get_by_id(pool, enc, &id)
        .await?
        .context("connection vanished immediately after insert")
}

/// Operator edit: replaces the mutable connection
/// fields in place. Breaker/cursor/session state is untouched.
pub async fn update(
    pool: &SqlitePool,
    enc: &Encryptor,
    id: &str,
    new: &NewConnection,
) -> Result<Connection> {
    let poll_interval = new
        .poll_interval_secs
        .unwrap_or(Connection::DEFAULT_POLL_INTERVAL_SECS);
    let api_key_encrypted = enc.encrypt(&new.api_key).context("encrypt api_key")?;
    let webhook_secret_encrypted = enc
        .encrypt(&new.webhook_secret)
        .context("encrypt webhook_secret")?;

    sqlx::query(
        r#"
        update connections set
            name = ?1,
            upstream_base_url = ?2,
            upstream_db = ?3,
            upstream_username = ?4,
            api_key_encrypted = ?5,
            webhook_url = ?6,
            webhook_secret_encrypted = ?7,
            downstream_store_id = ?8,
            downstream_client_id = ?9,
            poll_interval_secs = ?10,
            updated_at = ?11
        where id = ?12
        "#,
    )
    .bind(&new.name)
    .bind(&new.upstream_base_url)
    .bind(&new.upstream_db)
    .bind(&new.upstream_username)
    .bind(api_key_encrypted)
    .bind(&new.webhook_url)
    .bind(webhook_secret_encrypted)
    .bind(&new.downstream_store_id)
    .bind(&new.downstream_client_id)
    .bind(poll_interval)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .context("update connection failed")?;

    get_by_id(pool, enc, id)
        .await?
        .context("connection vanished immediately after update")
}

pub async fn update_active(pool: &SqlitePool, id: &str, active: bool) -> Result<()> {
    sqlx::query("update connections set active = ?1, updated_at = ?2 where id = ?3")
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await
        .context("update_active failed")?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<()> {
    // Cascade to dependent rows on delete.
    let mut tx = pool.begin().await.context("begin delete tx")?;
    sqlx::query("delete from sent_orders where connection_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("cascade delete sent_orders failed")?;
    sqlx::query("delete from retry_items where connection_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("cascade delete retry_items failed")?;
    sqlx::query("delete from sync_logs where connection_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("cascade delete sync_logs failed")?;
    sqlx::query("delete from connections where id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("delete connection failed")?;
    tx.commit().await.context("commit delete tx")?;
    Ok(())
}

/// Worker step 8 / breaker transitions: persist the cursor and/or breaker
/// fields in one statement so a crash between the two can't desynchronize
/// them. `last_sync_at` monotonicity is enforced here: a
/// caller passing a value older than the stored one is a no-op for that
/// column.
pub async fn update_breaker_and_cursor(
    pool: &SqlitePool,
    id: &str,
    last_sync_at: Option<DateTime<Utc>>,
    breaker_state: BreakerState,
    failure_count: i64,
    half_open_successes: i64,
    earliest_retry_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let last_sync_str = last_sync_at.map(|t| t.to_rfc3339());
    let earliest_retry_str = earliest_retry_at.map(|t| t.to_rfc3339());

    sqlx::query(
        r#"
        update connections set
            last_sync_at = case
                when ?1 is null then last_sync_at
                when last_sync_at is null then ?1
                when ?1 > last_sync_at then ?1
                else last_sync_at
            end,
            breaker_state = ?2,
            breaker_failure_count = ?3,
            breaker_half_open_successes = ?4,
            breaker_earliest_retry_at = ?5,
            updated_at = ?6
        where id = ?7
        "#,
    )
    .bind(last_sync_str)
    .bind(breaker_state.as_db_str())
    .bind(failure_count)
    .bind(half_open_successes)
    .bind(earliest_retry_str)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("update_breaker_and_cursor failed")?;

    Ok(())
}

pub async fn update_session_id(pool: &SqlitePool, id: &str, session_id: Option<i64>) -> Result<()> {
    sqlx::query("update connections set session_id = ?1, updated_at = ?2 where id = ?3")
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await
        .context("update_session_id failed")?;
    Ok(())
}

pub async fn reset_breaker(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update connections set
            breaker_state = 'CLOSED',
            breaker_failure_count = 0,
            breaker_half_open_successes = 0,
            breaker_earliest_retry_at = null,
            updated_at = ?1
        where id = ?2
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .context("reset_breaker failed")?;
    Ok(())
}

fn row_to_connection(row: &sqlx::sqlite::SqliteRow, enc: &Encryptor) -> Result<Connection> {
    let api_key_encrypted: String = row.try_get("api_key_encrypted")?;
    let webhook_secret_encrypted: String = row.try_get("webhook_secret_encrypted")?;
    let breaker_state_str: String = row.try_get("breaker_state")?;

    Ok(Connection {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        upstream_base_url: row.try_get("upstream_base_url")?,
        upstream_db: row.try_get("upstream_db")?,
        upstream_username: row.try_get("upstream_username")?,
        api_key: enc
            .decrypt(&api_key_encrypted)
            .context("decrypting api_key")?,
        session_id: row.try_get("session_id")?,
        webhook_url: row.try_get("webhook_url")?,
        webhook_secret: enc
            .decrypt(&webhook_secret_encrypted)
            .context("decrypting webhook_secret")?,
        downstream_store_id: row.try_get("downstream_store_id")?,
        downstream_client_id: row.try_get("downstream_client_id")?,
        poll_interval_secs: row.try_get("poll_interval_secs")?,
        active: row.try_get("active")?,
        last_sync_at: parse_opt_ts(row, "last_sync_at")?,
        breaker_state: BreakerState::from_db_str(&breaker_state_str)
            .with_context(|| format!("unknown breaker_state {breaker_state_str:?}"))?,
        breaker_failure_count: row.try_get("breaker_failure_count")?,
        breaker_half_open_successes: row.try_get("breaker_half_open_successes")?,
        breaker_earliest_retry_at: parse_opt_ts(row, "breaker_earliest_retry_at")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

pub(crate) fn parse_ts(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let s: String = row.try_get(col)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("column {col} is not a valid RFC3339 timestamp: {s}"))
}

pub(crate) fn parse_opt_ts(
    row: &sqlx::sqlite::SqliteRow,
    col: &str,
) -> Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.try_get(col)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("column {col} is not a valid RFC3339 timestamp: {s}"))
    })
    .transpose()
}
