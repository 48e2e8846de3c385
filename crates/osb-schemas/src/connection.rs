use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-connection circuit breaker state, persisted on the `connections` row.
///
/// See the breaker transition table in `osb-breaker` for the state machine
/// that drives this value; this crate only defines the wire/storage shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CLOSED" => Some(BreakerState::Closed),
            "OPEN" => Some(BreakerState::Open),
            "HALF_OPEN" => Some(BreakerState::HalfOpen),
            _ => None,
        }
    }
}

/// One configured upstream tenant.
///
/// `api_key` and `webhook_secret` are cleartext here by contract: encryption
/// at rest is a Store-internal adapter applied only at the `osb-db`
/// read/write seam, never visible to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,

    pub upstream_base_url: String,
    pub upstream_db: String,
    pub upstream_username: String,
    pub api_key: String,
    pub session_id: Option<i64>,

    pub webhook_url: String,
    pub webhook_secret: String,
    pub downstream_store_id: String,
    pub downstream_client_id: String,

    pub poll_interval_secs: i64,
    pub active: bool,

    pub last_sync_at: Option<DateTime<Utc>>,

    pub breaker_state: BreakerState,
    pub breaker_failure_count: i64,
    pub breaker_half_open_successes: i64,
    pub breaker_earliest_retry_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Default poll cadence when an operator does not specify one.
    pub const DEFAULT_POLL_INTERVAL_SECS: i64 = 60;
}

/// Fields an operator supplies when creating a connection; everything else
/// (id, audit timestamps, breaker state) is assigned by the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub name: String,
    pub upstream_base_url: String,
    pub upstream_db: String,
    pub upstream_username: String,
    pub api_key: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub downstream_store_id: String,
    pub downstream_client_id: String,
    pub poll_interval_secs: Option<i64>,
}
