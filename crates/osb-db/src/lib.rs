//! The Store facade over the connections/ledger/retry/synclog submodules.
//!
//! Durable state for connections, the delivery ledger, the retry queue, and
//! sync logs, behind a single-file SQLite database opened in WAL mode so
//! readers (CLI list/tail commands) never block the single writer.
//!
//! All other components depend on this crate for persistence; none of them
//! touch `sqlx` directly. Credential fields are decrypted at the boundary
//! here (`crypto`) so every caller downstream of `Store` sees cleartext,
//! per the Store's own contract.

mod connections;
mod crypto;
mod ledger;
mod retry;
mod synclog;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use crypto::{Encryptor, ENV_ENCRYPTION_KEY};
pub use synclog::NewSyncLog;

use osb_schemas::{
    BreakerState, Connection, Envelope, NewConnection, RetryItem, RetryStatus, SentOrder, SyncLog,
};

pub const ENV_DB_PATH: &str = "POLLER_DB_PATH";
pub const DEFAULT_DB_PATH: &str = "data/poller.db";
/// Ledger cap enforced after every cycle.
pub const LEDGER_LIMIT: i64 = 30;

/// Open the SQLite pool named by `POLLER_DB_PATH` (default `data/poller.db`),
/// creating the file and its parent directory if missing, with
/// `journal_mode=WAL` / `synchronous=NORMAL` ("write-ahead-style
/// journaling").
pub async fn connect_from_env() -> Result<SqlitePool> {
    let path = std::env::var(ENV_DB_PATH).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    connect(&path).await
}

pub async fn connect(path: &str) -> Result<SqlitePool> {
    if path != ":memory:" {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db parent dir for {path}"))?;
            }
        }
    }

    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .with_context(|| format!("invalid db path {path}"))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .with_context(|| format!("failed to open sqlite db at {path}"))?;

    Ok(pool)
}

/// Run embedded SQLx migrations. Idempotent — safe to call on every boot
/// (CLI and daemon both do).
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test/CLI helper: open an in-memory db, apply migrations, hand back a
/// ready pool.
pub async fn testkit_db_pool() -> Result<SqlitePool> {
    let pool = connect(":memory:").await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// The Store, as a handle shared by the Scheduler/Worker/CLI. Cheap
/// to clone — `SqlitePool` is itself a connection-pool handle.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    enc: Encryptor,
}

impl Store {
    pub fn new(pool: SqlitePool, enc: Encryptor) -> Self {
        Store { pool, enc }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Connection --

    pub async fn list_active_connections(&self) -> Result<Vec<Connection>> {
        connections::list_active(&self.pool, &self.enc).await
    }

    pub async fn list_all_connections(&self) -> Result<Vec<Connection>> {
        connections::list_all(&self.pool, &self.enc).await
    }

    pub async fn get_connection(&self, id: &str) -> Result<Option<Connection>> {
        connections::get_by_id(&self.pool, &self.enc, id).await
    }

    pub async fn create_connection(&self, new: &NewConnection) -> Result<Connection> {
        connections::create(&self.pool, &self.enc, new).await
    }

    pub async fn update_connection(&self, id: &str, new: &NewConnection) -> Result<Connection> {
        connections::update(&self.pool, &self.enc, id, new).await
    }

    pub async fn set_connection_active(&self, id: &str, active: bool) -> Result<()> {
        connections::update_active(&self.pool, id, active).await
    }

    pub async fn delete_connection(&self, id: &str) -> Result<()> {
        connections::delete(&self.pool, id).await
    }

    pub async fn update_session_id(&self, id: &str, session_id: Option<i64>) -> Result<()> {
        connections::update_session_id(&self.pool, id, session_id).await
    }

    pub async fn reset_breaker(&self, id: &str) -> Result<()> {
        connections::reset_breaker(&self.pool, id).await
    }

    /// Persist the Worker's cursor advance and the breaker's
    /// post-cycle state together.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_breaker_and_cursor(
        &self,
        id: &str,
        last_sync_at: Option<DateTime<Utc>>,
        breaker_state: BreakerState,
        failure_count: i64,
        half_open_successes: i64,
        earliest_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        connections::update_breaker_and_cursor(
            &self.pool,
            id,
            last_sync_at,
            breaker_state,
            failure_count,
            half_open_successes,
            earliest_retry_at,
        )
        .await
    }

    // -- Ledger --

    pub async fn was_sent(
        &self,
        connection_id: &str,
        upstream_order_id: i64,
        write_date: DateTime<Utc>,
    ) -> Result<bool> {
        ledger::was_sent(&self.pool, connection_id, upstream_order_id, write_date).await
    }

    pub async fn mark_sent(
        &self,
        connection_id: &str,
        upstream_order_id: i64,
        write_date: DateTime<Utc>,
    ) -> Result<()> {
        ledger::mark_sent(&self.pool, connection_id, upstream_order_id, write_date).await
    }

    pub async fn trim_ledger_to_limit(&self, connection_id: &str, limit: i64) -> Result<u64> {
        ledger::trim_to_limit(&self.pool, connection_id, limit).await
    }

    pub async fn ledger_count(&self, connection_id: &str) -> Result<i64> {
        ledger::count_for_connection(&self.pool, connection_id).await
    }

    pub async fn recent_ledger_entries(
        &self,
        connection_id: &str,
        limit: i64,
    ) -> Result<Vec<SentOrder>> {
        ledger::list_recent(&self.pool, connection_id, limit).await
    }

    // -- Retry queue --

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue_retry(
        &self,
        connection_id: &str,
        upstream_order_id: i64,
        write_date: DateTime<Utc>,
        external_id: &str,
        envelope: &Envelope,
        last_error: &str,
    ) -> Result<()> {
        retry::enqueue(
            &self.pool,
            connection_id,
            upstream_order_id,
            write_date,
            external_id,
            envelope,
            last_error,
        )
        .await
    }

    pub async fn due_retry_items(
        &self,
        connection_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetryItem>> {
        retry::due_items(&self.pool, connection_id, now).await
    }

    pub async fn record_retry_failure(&self, id: i64, error: &str) -> Result<RetryStatus> {
        retry::record_failure(&self.pool, id, error).await
    }

    pub async fn mark_retry_success(&self, id: i64) -> Result<()> {
        retry::mark_success(&self.pool, id).await
    }

    pub async fn discard_retry(&self, id: i64) -> Result<()> {
        retry::discard(&self.pool, id).await
    }

    pub async fn list_retries_by_connection(
        &self,
        connection_id: &str,
        limit: i64,
    ) -> Result<Vec<RetryItem>> {
        retry::list_by_connection(&self.pool, connection_id, limit).await
    }

    // -- Sync logs --

    pub async fn append_sync_log(&self, log: &NewSyncLog) -> Result<i64> {
        synclog::append(&self.pool, log).await
    }

    pub async fn list_sync_logs(&self, connection_id: &str, limit: i64) -> Result<Vec<SyncLog>> {
        synclog::list_by_connection(&self.pool, connection_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osb_schemas::BreakerState;

    async fn test_store() -> Store {
        let pool = testkit_db_pool().await.unwrap();
        let enc = Encryptor::from_base64_key("MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=").unwrap();
        Store::new(pool, enc)
    }

    fn sample_connection() -> NewConnection {
        NewConnection {
            name: "Acme".to_string(),
            upstream_base_url: "https://acme.example.com/jsonrpc".to_string(),
            upstream_db: "acme-prod".to_string(),
            upstream_username: "integration@acme.example.com".to_string(),
            api_key: "sk-live-abc123".to_string(),
            webhook_url: "https://hooks.example.com/acme".to_string(),
            webhook_secret: "shh-its-a-secret".to_string(),
            downstream_store_id: "store-1".to_string(),
            downstream_client_id: "client-1".to_string(),
            poll_interval_secs: None,
        }
    }

    #[tokio::test]
    async fn create_and_round_trip_credentials() {
        let store = test_store().await;
        let conn = store.create_connection(&sample_connection()).await.unwrap();
        assert_eq!(conn.api_key, "sk-live-abc123");
        assert_eq!(conn.webhook_secret, "shh-its-a-secret");
        assert_eq!(
            conn.poll_interval_secs,
            Connection::DEFAULT_POLL_INTERVAL_SECS
        );
        assert_eq!(conn.breaker_state, BreakerState::Closed);
        assert!(conn.last_sync_at.is_none());

        let fetched = store.get_connection(&conn.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, conn.id);
    }

    #[tokio::test]
    async fn inactive_connections_excluded_from_list_active() {
        let store = test_store().await;
        let conn = store.create_connection(&sample_connection()).await.unwrap();
        store.set_connection_active(&conn.id, false).await.unwrap();
        assert!(store.list_active_connections().await.unwrap().is_empty());
        assert_eq!(store.list_all_connections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_mark_is_idempotent_and_trims_fifo() {
        let store = test_store().await;
        let conn = store.create_connection(&sample_connection()).await.unwrap();
        let base = Utc::now();

        for i in 0..35 {
            let wd = base + chrono::Duration::seconds(i);
            store.mark_sent(&conn.id, i, wd).await.unwrap();
        }
        // Duplicate mark is a no-op, not an error.
        store.mark_sent(&conn.id, 0, base).await.unwrap();

        assert_eq!(store.ledger_count(&conn.id).await.unwrap(), 35);
        store
            .trim_ledger_to_limit(&conn.id, LEDGER_LIMIT)
            .await
            .unwrap();
        assert_eq!(store.ledger_count(&conn.id).await.unwrap(), LEDGER_LIMIT);
    }

    #[tokio::test]
    async fn retry_enqueue_is_unique_while_pending() {
        let store = test_store().await;
        let conn = store.create_connection(&sample_connection()).await.unwrap();
        let envelope = sample_envelope(&conn.id);

        let wd = Utc::now();
        store
            .enqueue_retry(&conn.id, 42, wd, "upstream_db_42", &envelope, "first failure")
            .await
            .unwrap();
        store
            .enqueue_retry(&conn.id, 42, wd, "upstream_db_42", &envelope, "second failure")
            .await
            .unwrap();

        let items = store
            .list_retries_by_connection(&conn.id, 10)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].last_error.as_deref(), Some("first failure"));
    }

    #[tokio::test]
    async fn retry_backoff_advances_and_exhausts() {
        let store = test_store().await;
        let conn = store.create_connection(&sample_connection()).await.unwrap();
        let envelope = sample_envelope(&conn.id);

        store
            .enqueue_retry(&conn.id, 7, Utc::now(), "upstream_db_7", &envelope, "e0")
            .await
            .unwrap();
        let item = store
            .list_retries_by_connection(&conn.id, 1)
            .await
            .unwrap()
            .remove(0);

        let mut id = item.id;
        for attempt in 2..=5 {
            let status = store
                .record_retry_failure(id, "still failing")
                .await
                .unwrap();
            let refreshed = store
                .list_retries_by_connection(&conn.id, 1)
                .await
                .unwrap()
                .remove(0);
            id = refreshed.id;
            if attempt < 5 {
                assert_eq!(status, RetryStatus::Pending);
            } else {
                assert_eq!(status, RetryStatus::Failed);
            }
        }
    }

    fn sample_envelope(connection_id: &str) -> Envelope {
        use osb_schemas::{
            Customer, EnvelopeOrder, EnvelopeSource, PlatformAttributes, ShippingAddress,
        };
        Envelope {
            event: Envelope::EVENT_ORDER_CONFIRMED.to_string(),
            external_id: "upstream_db_42".to_string(),
            source: EnvelopeSource {
                platform: "UPSTREAM".to_string(),
                connection_id: connection_id.to_string(),
                store_id: "store-1".to_string(),
                client_id: "client-1".to_string(),
            },
            order: EnvelopeOrder {
                platform_order_id: "42".to_string(),
                platform_order_number: "S00042".to_string(),
                date_order: "2025-01-15T10:30:00Z".to_string(),
                financial_status: "sale".to_string(),
                note: None,
                client_order_ref: None,
                amount_total: serde_json::json!(123.45),
                tags: Vec::new(),
                platform_attributes: PlatformAttributes {
                    upstream_state: "sale".to_string(),
                    client_order_ref: None,
                },
            },
            customer: Customer {
                name: "Jane".to_string(),
                phone: "555".to_string(),
                email: "jane@example.com".to_string(),
                orders_count: 1,
            },
            shipping_address: ShippingAddress {
                name: "Jane".to_string(),
                address1: "".to_string(),
                address2: "".to_string(),
                city: "".to_string(),
                province: "".to_string(),
                zip: "".to_string(),
                country: "".to_string(),
                phone: "".to_string(),
            },
            items: Vec::new(),
        }
    }
}
