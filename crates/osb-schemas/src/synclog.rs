use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BreakerState;

/// Append-only observability record for one worker cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub connection_id: String,
    pub started_at: DateTime<Utc>,
    pub orders_found: i32,
    pub orders_sent: i32,
    pub orders_failed: i32,
    pub orders_skipped_by_ledger: i32,
    pub duration_ms: i64,
    pub error_summary: Option<String>,
    pub breaker_state_on_entry: BreakerState,
    pub breaker_state_on_exit: BreakerState,
}
