//! Sync log tail.

use anyhow::Result;

use osb_db::Store;

use super::require_connection;

pub async fn tail(store: &Store, connection_id: String, limit: i64) -> Result<()> {
    require_connection(store, &connection_id).await?;
    let logs = store.list_sync_logs(&connection_id, limit).await?;
    for log in &logs {
        println!(
            "id={} started_at={} duration_ms={} found={} sent={} failed={} skipped={} breaker={:?}->{:?} error={}",
            log.id,
            log.started_at.to_rfc3339(),
            log.duration_ms,
            log.orders_found,
            log.orders_sent,
            log.orders_failed,
            log.orders_skipped_by_ledger,
            log.breaker_state_on_entry,
            log.breaker_state_on_exit,
            log.error_summary.as_deref().unwrap_or("-"),
        );
    }
    if logs.is_empty() {
        eprintln!("no sync logs for connection {connection_id}");
    }
    Ok(())
}
