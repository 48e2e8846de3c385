//! Scheduler: supervises one task per active connection, restarting faulted ones.
//!
//! One supervised task per active connection. A task that panics or
//! otherwise resolves unexpectedly is restarted by the supervisor after an
//! exponential backoff (30s, doubling, capped at 300s); this counter is
//! independent of the breaker's own failure counter, which lives entirely
//! inside the Worker/Store and tracks upstream health rather than process
//! health.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use osb_db::Store;
use osb_dispatcher::Dispatcher;
use osb_upstream::UpstreamClient;

use crate::state::BusMsg;
use crate::worker;

pub const SUPERVISOR_BACKOFF_BASE_SECS: u64 = 30;
pub const SUPERVISOR_BACKOFF_CAP_SECS: u64 = 300;

/// Liveness info the `/v1/connections` routes surface for one task.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionRuntimeStatus {
    pub connection_id: String,
    pub name: String,
    pub restarts: u32,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
}

pub type RuntimeRegistry = Arc<RwLock<HashMap<String, ConnectionRuntimeStatus>>>;

/// Spawn one supervised task per currently-active connection
/// "Control flow"). Called once at daemon startup. `shutdown` is a single
/// token shared by every connection; cancelling it tells every task to
/// stop at its next between-cycle checkpoint instead of restarting.
pub async fn spawn_all(
    store: Store,
    bus: broadcast::Sender<BusMsg>,
    registry: RuntimeRegistry,
    shutdown: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let connections = store.list_active_connections().await?;
    let mut handles = Vec::with_capacity(connections.len());
    for connection in connections {
        let connection_id = connection.id.clone();
        let name = connection.name.clone();
        registry.write().await.insert(
            connection_id.clone(),
            ConnectionRuntimeStatus {
                connection_id: connection_id.clone(),
                name,
                restarts: 0,
                last_cycle_started_at: None,
            },
        );
        handles.push(tokio::spawn(supervise(
            store.clone(),
            bus.clone(),
            registry.clone(),
            connection_id,
            shutdown.clone(),
        )));
    }
    Ok(handles)
}

/// Supervisor loop for one connection id: spawn the task body, and if it
/// ever resolves (return or panic), restart it after backoff. Exits for
/// good only when the task body reports the connection gone, deactivated,
/// or the shared `shutdown` token fired — none of those are faults, so
/// none of them go through the backoff/restart path.
async fn supervise(
    store: Store,
    bus: broadcast::Sender<BusMsg>,
    registry: RuntimeRegistry,
    connection_id: String,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        let task_store = store.clone();
        let task_bus = bus.clone();
        let task_registry = registry.clone();
        let task_connection_id = connection_id.clone();
        let task_shutdown = shutdown.clone();

        let handle = tokio::spawn(async move {
            run_task_body(task_store, task_bus, task_registry, task_connection_id, task_shutdown)
                .await
        });

        match handle.await {
            Ok(TaskExit::ConnectionGone) | Ok(TaskExit::Deactivated) | Ok(TaskExit::ShutDown) => {
                info!(connection_id = %connection_id, "connection task stopped");
                registry.write().await.remove(&connection_id);
                return;
            }
            Ok(TaskExit::Faulted(reason)) => {
                attempt += 1;
                restart_after_backoff(&bus, &registry, &connection_id, attempt, &reason).await;
            }
            Err(join_err) => {
                attempt += 1;
                let reason = if join_err.is_panic() {
                    "task panicked".to_string()
                } else {
                    "task cancelled".to_string()
                };
                restart_after_backoff(&bus, &registry, &connection_id, attempt, &reason).await;
            }
        }
    }
}

async fn restart_after_backoff(
    bus: &broadcast::Sender<BusMsg>,
    registry: &RuntimeRegistry,
    connection_id: &str,
    attempt: u32,
    reason: &str,
) {
    let delay = backoff_for_attempt(attempt);
    warn!(
        connection_id,
        attempt,
        delay_secs = delay.as_secs(),
        reason,
        "connection task restarting after backoff"
    );
    if let Some(status) = registry.write().await.get_mut(connection_id) {
        status.restarts = attempt;
    }
    let _ = bus.send(BusMsg::LogLine {
        level: "warn".to_string(),
        msg: format!(
            "connection {connection_id} task restarted (attempt {attempt}, {reason}) after {}s",
            delay.as_secs()
        ),
    });
    tokio::time::sleep(delay).await;
}

enum TaskExit {
    ConnectionGone,
    Deactivated,
    /// The shared shutdown token fired; observed at a between-cycle
    /// checkpoint, never mid-`run_cycle`.
    ShutDown,
    Faulted(String),
}

async fn run_task_body(
    store: Store,
    bus: broadcast::Sender<BusMsg>,
    registry: RuntimeRegistry,
    connection_id: String,
    shutdown: CancellationToken,
) -> TaskExit {
    let connection = match store.get_connection(&connection_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return TaskExit::ConnectionGone,
        Err(e) => return TaskExit::Faulted(format!("load connection failed: {e}")),
    };

    let upstream = UpstreamClient::new(
        connection.upstream_base_url.clone(),
        connection.upstream_db.clone(),
        connection.upstream_username.clone(),
        connection.api_key.clone(),
    );
    let dispatcher = Dispatcher::new();

    loop {
        // Checkpoint 1: before doing anything else in a fresh iteration.
        if shutdown.is_cancelled() {
            return TaskExit::ShutDown;
        }

        let connection = match store.get_connection(&connection_id).await {
            Ok(Some(c)) => c,
            Ok(None) => return TaskExit::ConnectionGone,
            Err(e) => return TaskExit::Faulted(format!("reload connection failed: {e}")),
        };
        if !connection.active {
            return TaskExit::Deactivated;
        }

        if let Some(status) = registry.write().await.get_mut(&connection_id) {
            status.last_cycle_started_at = Some(Utc::now());
        }

        // The cycle itself runs to completion once started — §5 "a task
        // that is mid-cycle completes its in-flight HTTP call…then exits
        // at the next suspension point" — so `shutdown` is never polled
        // inside `run_cycle`, only before and after it.
        if let Err(e) = worker::run_cycle(&store, &upstream, &dispatcher, &connection).await {
            let _ = bus.send(BusMsg::LogLine {
                level: "error".to_string(),
                msg: format!("connection {connection_id} cycle error: {e}"),
            });
            return TaskExit::Faulted(format!("worker cycle failed: {e}"));
        }

        // Checkpoint 2: the cadence sleep is the task's main suspension
        // point, so race it against shutdown instead of sleeping it out.
        let cadence = Duration::from_secs(connection.poll_interval_secs.max(1) as u64);
        tokio::select! {
            _ = tokio::time::sleep(cadence) => {}
            _ = shutdown.cancelled() => return TaskExit::ShutDown,
        }
    }
}

pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let secs = SUPERVISOR_BACKOFF_BASE_SECS.saturating_mul(1u64 << exp);
    Duration::from_secs(secs.min(SUPERVISOR_BACKOFF_CAP_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(30));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(120));
        assert_eq!(backoff_for_attempt(4), Duration::from_secs(240));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(300));
        assert_eq!(backoff_for_attempt(6), Duration::from_secs(300));
        assert_eq!(backoff_for_attempt(100), Duration::from_secs(300));
    }
}
