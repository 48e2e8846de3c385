//! Connection CRUD + test-connection.

use anyhow::Result;

use osb_db::Store;
use osb_schemas::NewConnection;

use super::{build_upstream_client, require_connection};

#[allow(clippy::too_many_arguments)]
pub async fn add(
    store: &Store,
    name: String,
    upstream_base_url: String,
    upstream_db: String,
    upstream_username: String,
    api_key: String,
    webhook_url: String,
    webhook_secret: String,
    downstream_store_id: String,
    downstream_client_id: String,
    poll_interval_secs: Option<i64>,
) -> Result<()> {
    let new = NewConnection {
        name,
        upstream_base_url,
        upstream_db,
        upstream_username,
        api_key,
        webhook_url,
        webhook_secret,
        downstream_store_id,
        downstream_client_id,
        poll_interval_secs,
    };
    let conn = store.create_connection(&new).await?;
    println!("connection_id={}", conn.id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn edit(
    store: &Store,
    id: String,
    name: String,
    upstream_base_url: String,
    upstream_db: String,
    upstream_username: String,
    api_key: String,
    webhook_url: String,
    webhook_secret: String,
    downstream_store_id: String,
    downstream_client_id: String,
    poll_interval_secs: Option<i64>,
) -> Result<()> {
    let new = NewConnection {
        name,
        upstream_base_url,
        upstream_db,
        upstream_username,
        api_key,
        webhook_url,
        webhook_secret,
        downstream_store_id,
        downstream_client_id,
        poll_interval_secs,
    };
    let conn = store.update_connection(&id, &new).await?;
    println!("connection_id={}", conn.id);
    Ok(())
}

pub async fn delete(store: &Store, id: String) -> Result<()> {
    require_connection(store, &id).await?;
    store.delete_connection(&id).await?;
    println!("connection_id={id}");
    Ok(())
}

pub async fn set_active(store: &Store, id: String, active: bool) -> Result<()> {
    require_connection(store, &id).await?;
    store.set_connection_active(&id, active).await?;
    println!("connection_id={id}");
    Ok(())
}

pub async fn list(store: &Store) -> Result<()> {
    let connections = store.list_all_connections().await?;
    for c in &connections {
        println!(
            "id={} name={:?} active={} breaker={:?} last_sync_at={} poll_interval_secs={}",
            c.id,
            c.name,
            c.active,
            c.breaker_state,
            c.last_sync_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "null".to_string()),
            c.poll_interval_secs,
        );
    }
    if connections.is_empty() {
        eprintln!("no connections configured");
    }
    Ok(())
}

/// `test-connection` — exercise `authenticate()` against the live upstream
/// without touching any durable state, so an operator can validate
/// credentials before activating a connection.
pub async fn test_connection(store: &Store, id: String) -> Result<()> {
    let connection = require_connection(store, &id).await?;
    let client = build_upstream_client(&connection);
    match client.authenticate().await {
        Ok(session_id) => {
            println!("connection_id={id} ok=true session_id={session_id}");
            Ok(())
        }
        Err(e) => {
            eprintln!("connection_id={id} ok=false error={e}");
            anyhow::bail!("test-connection failed for {id}: {e}")
        }
    }
}

pub async fn reset_breaker(store: &Store, id: String) -> Result<()> {
    require_connection(store, &id).await?;
    store.reset_breaker(&id).await?;
    println!("connection_id={id}");
    Ok(())
}
