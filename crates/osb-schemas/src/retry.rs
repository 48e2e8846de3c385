use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Envelope;

/// Lifecycle of a durable retry item.
///
/// `Pending` is the only status the sweep in Worker step 10 acts on;
/// `Success`, `Failed`, and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStatus {
    Pending,
    Success,
    Failed,
    Discarded,
}

impl RetryStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RetryStatus::Pending => "PENDING",
            RetryStatus::Success => "SUCCESS",
            RetryStatus::Failed => "FAILED",
            RetryStatus::Discarded => "DISCARDED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RetryStatus::Pending),
            "SUCCESS" => Some(RetryStatus::Success),
            "FAILED" => Some(RetryStatus::Failed),
            "DISCARDED" => Some(RetryStatus::Discarded),
            _ => None,
        }
    }
}

/// A durably queued envelope whose downstream delivery failed at least once.
///
/// `(connection_id, upstream_order_id)` is unique while `status == Pending`
/// — enforced by the Store via a partial unique index, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryItem {
    pub id: i64,
    pub connection_id: String,
    pub upstream_order_id: i64,
    /// Carried through from the candidate that failed to dispatch, so a
    /// retry success can mark the ledger with the same `(conn, id,
    /// write_date)` key the fresh-dispatch path would have used.
    pub write_date: DateTime<Utc>,
    pub external_id: String,
    pub envelope: Envelope,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub status: RetryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetryItem {
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

    /// Backoff schedule: 30, 60, 120, 240, 600, 600, … seconds, capped at 600.
    ///
    /// `attempt_count` is the count *after* the failure that is scheduling
    /// this delay (i.e. the value stored on the row once the update commits).
    pub fn backoff_secs_for_attempt(attempt_count: i32) -> i64 {
        let exp = attempt_count.saturating_sub(1).max(0);
        let secs = 30i64.saturating_mul(1i64 << exp.min(62));
        secs.min(600)
    }

    pub fn external_id_for(upstream_db: &str, upstream_order_id: i64) -> String {
        format!("upstream_{upstream_db}_{upstream_order_id}")
    }
}
