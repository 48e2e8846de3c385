use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use osb_schemas::SentOrder;

/// `was_sent`: has this order already been delivered for this connection.
pub async fn was_sent(
    pool: &SqlitePool,
    connection_id: &str,
    upstream_order_id: i64,
    write_date: DateTime<Utc>,
) -> Result<bool> {
    let row = sqlx::query(
        "select 1 as present from sent_orders \
         where connection_id = ?1 and upstream_order_id = ?2 and write_date = ?3",
    )
    .bind(connection_id)
    .bind(upstream_order_id)
    .bind(write_date.to_rfc3339())
    .fetch_optional(pool)
    .await
    .context("was_sent query failed")?;

    Ok(row.is_some())
}

/// `mark_sent` — conflict-ignore semantics: a
/// concurrent insert of the same triple is silently absorbed, never an error.
pub async fn mark_sent(
    pool: &SqlitePool,
    connection_id: &str,
    upstream_order_id: i64,
    write_date: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "insert or ignore into sent_orders (connection_id, upstream_order_id, write_date, sent_at) \
         values (?1, ?2, ?3, ?4)",
    )
    .bind(connection_id)
    .bind(upstream_order_id)
    .bind(write_date.to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .context("mark_sent insert failed")?;

    Ok(())
}

/// `trim_to_limit`. Keeps only the most recent `limit` rows by
/// `sent_at` for this connection, deleting the rest.
pub async fn trim_to_limit(pool: &SqlitePool, connection_id: &str, limit: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        delete from sent_orders
        where connection_id = ?1
          and rowid not in (
              select rowid from sent_orders
              where connection_id = ?1
              order by sent_at desc, rowid desc
              limit ?2
          )
        "#,
    )
    .bind(connection_id)
    .bind(limit)
    .execute(pool)
    .await
    .context("trim_to_limit delete failed")?;

    Ok(result.rows_affected())
}

pub async fn count_for_connection(pool: &SqlitePool, connection_id: &str) -> Result<i64> {
    let row = sqlx::query("select count(*) as n from sent_orders where connection_id = ?1")
        .bind(connection_id)
        .fetch_one(pool)
        .await
        .context("count_for_connection failed")?;
    Ok(row.try_get("n")?)
}

pub async fn list_recent(
    pool: &SqlitePool,
    connection_id: &str,
    limit: i64,
) -> Result<Vec<SentOrder>> {
    let rows = sqlx::query(
        "select * from sent_orders where connection_id = ?1 order by sent_at desc limit ?2",
    )
    .bind(connection_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_recent query failed")?;

    rows.iter()
        .map(|row| {
            Ok(SentOrder {
                connection_id: row.try_get("connection_id")?,
                upstream_order_id: row.try_get("upstream_order_id")?,
                write_date: crate::connections::parse_ts(row, "write_date")?,
                sent_at: crate::connections::parse_ts(row, "sent_at")?,
            })
        })
        .collect()
}
