//! Command handler modules for osb-cli.
//!
//! Shared utilities used by multiple command paths live here. Command
//! specific logic lives in the submodules. Every mutating subcommand
//! prints the affected row id(s) as its sole stdout payload on success
//! so it composes in shell scripts; human readable explanation goes to
//! stderr.

pub mod connections;
pub mod logs;
pub mod resend;
pub mod retries;

use anyhow::{Context, Result};

use osb_db::{Encryptor, Store};

/// Open the Store the same way the daemon does: resolve `POLLER_DB_PATH`
/// and `POLLER_ENCRYPTION_KEY`, create the pool, and run migrations so the
/// CLI works against a fresh database with no separate bootstrap step.
pub async fn open_store() -> Result<Store> {
    let enc = Encryptor::from_env().context("load credential encryption key")?;
    let pool = osb_db::connect_from_env()
        .await
        .context("open store database")?;
    osb_db::migrate(&pool).await.context("run store migrations")?;
    Ok(Store::new(pool, enc))
}

/// Resolve a connection id or fail with a message suitable for stderr.
pub async fn require_connection(
    store: &Store,
    id: &str,
) -> Result<osb_schemas::Connection> {
    store
        .get_connection(id)
        .await
        .context("load connection")?
        .with_context(|| format!("no such connection: {id}"))
}

pub fn build_upstream_client(connection: &osb_schemas::Connection) -> osb_upstream::UpstreamClient {
    osb_upstream::UpstreamClient::new(
        connection.upstream_base_url.clone(),
        connection.upstream_db.clone(),
        connection.upstream_username.clone(),
        connection.api_key.clone(),
    )
}
