//! Axum router and all HTTP handlers for osb-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    api_types::{
        ConnectionListResponse, ConnectionSummary, ErrorResponse, HealthResponse,
        RetryListResponse, SyncLogListResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/connections", get(list_connections))
        .route("/v1/connections/:id", get(get_connection))
        .route("/v1/connections/:id/sync-logs", get(list_sync_logs))
        .route("/v1/connections/:id/retries", get(list_retries))
        .route("/v1/connections/:id/retries/:retry_id/retry-now", post(retry_now))
        .route("/v1/connections/:id/retries/:retry_id/discard", post(discard_retry))
        .route("/v1/connections/:id/breaker/reset", post(reset_breaker))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: state.build.service,
        version: state.build.version,
        uptime_secs: uptime_secs(),
    })
}

// ---------------------------------------------------------------------------
// /v1/stream — SSE heartbeat/log feed
// ---------------------------------------------------------------------------

async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(msg) => match serde_json::to_string(&msg) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(_) => None,
        },
        Err(_lagged) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// /v1/connections
// ---------------------------------------------------------------------------

async fn list_connections(State(state): State<Arc<AppState>>) -> Response {
    let connections = match state.store.list_all_connections().await {
        Ok(c) => c,
        Err(e) => return internal_error(e),
    };

    let runtime = state.runtime.read().await;
    let summaries = connections
        .iter()
        .map(|c| {
            let status = runtime.get(&c.id);
            ConnectionSummary::from_connection(
                c,
                status.map(|s| s.restarts).unwrap_or(0),
                status.and_then(|s| s.last_cycle_started_at),
            )
        })
        .collect();

    Json(ConnectionListResponse {
        connections: summaries,
    })
    .into_response()
}

async fn get_connection(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let connection = match state.store.get_connection(&id).await {
        Ok(Some(c)) => c,
        Ok(None) => return not_found(&id),
        Err(e) => return internal_error(e),
    };

    let runtime = state.runtime.read().await;
    let status = runtime.get(&id);
    Json(ConnectionSummary::from_connection(
        &connection,
        status.map(|s| s.restarts).unwrap_or(0),
        status.and_then(|s| s.last_cycle_started_at),
    ))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

const DEFAULT_LIST_LIMIT: i64 = 50;

async fn list_sync_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Response {
    match state
        .store
        .list_sync_logs(&id, q.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
    {
        Ok(logs) => Json(SyncLogListResponse {
            connection_id: id,
            logs,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn list_retries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Response {
    match state
        .store
        .list_retries_by_connection(&id, q.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await
    {
        Ok(items) => Json(RetryListResponse {
            connection_id: id,
            items,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Manually force one retry item to attempt delivery right now, bypassing
/// its `next_retry_at` backoff — the operator's "retry now" action.
async fn retry_now(
    State(state): State<Arc<AppState>>,
    Path((conn_id, retry_id)): Path<(String, i64)>,
) -> Response {
    let connection = match state.store.get_connection(&conn_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return not_found(&conn_id),
        Err(e) => return internal_error(e),
    };
    let items = match state.store.list_retries_by_connection(&conn_id, 1000).await {
        Ok(i) => i,
        Err(e) => return internal_error(e),
    };
    let Some(item) = items.into_iter().find(|i| i.id == retry_id) else {
        return not_found(&retry_id.to_string());
    };

    let dispatcher = osb_dispatcher::Dispatcher::new();
    match dispatcher
        .dispatch(&connection.webhook_url, &connection.webhook_secret, &connection.id, &item.envelope)
        .await
    {
        Ok(()) => {
            if let Err(e) = state
                .store
                .mark_sent(&connection.id, item.upstream_order_id, item.write_date)
                .await
            {
                return internal_error(e);
            }
            if let Err(e) = state.store.mark_retry_success(item.id).await {
                return internal_error(e);
            }
            StatusCode::OK.into_response()
        }
        Err(e) => match state.store.record_retry_failure(item.id, &e.to_string()).await {
            Ok(_) => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("manual retry dispatch failed: {e}"),
                }),
            )
                .into_response(),
            Err(e) => internal_error(e),
        },
    }
}

async fn discard_retry(
    State(state): State<Arc<AppState>>,
    Path((_conn_id, retry_id)): Path<(String, i64)>,
) -> Response {
    match state.store.discard_retry(retry_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e),
    }
}

async fn reset_breaker(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.get_connection(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(&id),
        Err(e) => return internal_error(e),
    }
    match state.store.reset_breaker(&id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no such connection or retry item: {id}"),
        }),
    )
        .into_response()
}

fn internal_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
