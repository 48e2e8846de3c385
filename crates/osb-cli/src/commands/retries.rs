//! Retry queue inspection + manual retry/discard.

use anyhow::{Context, Result};

use osb_db::Store;
use osb_dispatcher::Dispatcher;

use super::{build_upstream_client, require_connection};

pub async fn list(store: &Store, connection_id: String, limit: i64) -> Result<()> {
    require_connection(store, &connection_id).await?;
    let items = store.list_retries_by_connection(&connection_id, limit).await?;
    for item in &items {
        println!(
            "id={} order_id={} attempt={}/{} status={:?} next_retry_at={} last_error={}",
            item.id,
            item.upstream_order_id,
            item.attempt_count,
            item.max_attempts,
            item.status,
            item.next_retry_at.to_rfc3339(),
            item.last_error.as_deref().unwrap_or("-"),
        );
    }
    if items.is_empty() {
        eprintln!("no retry items for connection {connection_id}");
    }
    Ok(())
}

/// `retry-now` — force one retry item to attempt delivery immediately,
/// bypassing its `next_retry_at` backoff.
pub async fn retry_now(store: &Store, connection_id: String, retry_id: i64) -> Result<()> {
    let connection = require_connection(store, &connection_id).await?;
    let items = store
        .list_retries_by_connection(&connection_id, 10_000)
        .await?;
    let item = items
        .into_iter()
        .find(|i| i.id == retry_id)
        .with_context(|| format!("no retry item {retry_id} for connection {connection_id}"))?;

    // Ensure a session is cached for the connection's client before dispatch
    // — not strictly required (the dispatcher never touches the upstream),
    // but keeps this path symmetric with a scheduled retry sweep.
    let _ = build_upstream_client(&connection);

    let dispatcher = Dispatcher::new();
    match dispatcher
        .dispatch(
            &connection.webhook_url,
            &connection.webhook_secret,
            &connection.id,
            &item.envelope,
        )
        .await
    {
        Ok(()) => {
            store
                .mark_sent(&connection.id, item.upstream_order_id, item.write_date)
                .await?;
            store.mark_retry_success(item.id).await?;
            println!("retry_id={retry_id} ok=true");
            Ok(())
        }
        Err(e) => {
            store.record_retry_failure(item.id, &e.to_string()).await?;
            eprintln!("retry_id={retry_id} ok=false error={e}");
            anyhow::bail!("manual retry dispatch failed for item {retry_id}: {e}")
        }
    }
}

pub async fn discard(store: &Store, connection_id: String, retry_id: i64) -> Result<()> {
    require_connection(store, &connection_id).await?;
    store.discard_retry(retry_id).await?;
    println!("retry_id={retry_id}");
    Ok(())
}
