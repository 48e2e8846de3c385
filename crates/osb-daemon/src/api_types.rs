//! Request and response types for all osb-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use osb_schemas::{BreakerState, Connection, RetryItem, SyncLog};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// /v1/connections
// ---------------------------------------------------------------------------

/// One connection as surfaced to an operator: Store fields plus whatever
/// the Scheduler currently knows about its supervised task. Credential
/// fields (`api_key`, `webhook_secret`) are never included here — the
/// daemon's HTTP surface is read-only observability, not a credential
/// export path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    pub upstream_base_url: String,
    pub upstream_db: String,
    pub webhook_url: String,
    pub downstream_store_id: String,
    pub downstream_client_id: String,
    pub poll_interval_secs: i64,
    pub active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub breaker_state: BreakerState,
    pub breaker_failure_count: i64,
    pub task_restarts: u32,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
}

impl ConnectionSummary {
    pub fn from_connection(
        c: &Connection,
        restarts: u32,
        last_cycle_started_at: Option<DateTime<Utc>>,
    ) -> Self {
        ConnectionSummary {
            id: c.id.clone(),
            name: c.name.clone(),
            upstream_base_url: c.upstream_base_url.clone(),
            upstream_db: c.upstream_db.clone(),
            webhook_url: c.webhook_url.clone(),
            downstream_store_id: c.downstream_store_id.clone(),
            downstream_client_id: c.downstream_client_id.clone(),
            poll_interval_secs: c.poll_interval_secs,
            active: c.active,
            last_sync_at: c.last_sync_at,
            breaker_state: c.breaker_state,
            breaker_failure_count: c.breaker_failure_count,
            task_restarts: restarts,
            last_cycle_started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionListResponse {
    pub connections: Vec<ConnectionSummary>,
}

// ---------------------------------------------------------------------------
// /v1/connections/:id/sync-logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogListResponse {
    pub connection_id: String,
    pub logs: Vec<SyncLog>,
}

// ---------------------------------------------------------------------------
// /v1/connections/:id/retries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryListResponse {
    pub connection_id: String,
    pub items: Vec<RetryItem>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Response body for any route that fails with a 4xx/5xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
