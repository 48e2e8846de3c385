//! Shared runtime state for osb-daemon.
//!
//! All types here are `Clone`-able (via `Arc`) or trivially copyable.
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself beyond the heartbeat ticker.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use osb_db::Store;

use crate::scheduler::RuntimeRegistry;

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE
/// events on `/v1/stream`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Durable state handle — every route reads through this, never `sqlx`
    /// directly.
    pub store: Store,
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Per-connection liveness, written by the Scheduler's supervised
    /// tasks, read by `/v1/connections`.
    pub runtime: RuntimeRegistry,
}

impl AppState {
    pub fn new(store: Store, runtime: RuntimeRegistry) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            store,
            bus,
            build: BuildInfo {
                service: "osb-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            runtime,
        }
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval` — a
/// lightweight liveness signal for `/v1/stream` subscribers.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
