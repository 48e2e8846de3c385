//! osb-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, opens the Store,
//! spawns the Scheduler's per-connection tasks, wires middleware, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state types live in `state.rs`.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use osb_daemon::{routes, scheduler, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let secrets = osb_config::secrets::resolve_secrets();
    init_tracing(&secrets.log_level);

    // Fatal startup: a missing/invalid POLLER_ENCRYPTION_KEY must
    // exit the process non-zero before any connection task is spawned.
    let enc = osb_db::Encryptor::from_env().context("load credential encryption key")?;
    let pool = osb_db::connect_from_env()
        .await
        .context("open store database")?;
    osb_db::migrate(&pool).await.context("run store migrations")?;
    let store = osb_db::Store::new(pool, enc);

    let runtime: scheduler::RuntimeRegistry = Arc::new(RwLock::new(HashMap::new()));
    let shared = Arc::new(state::AppState::new(store.clone(), runtime.clone()));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let shutdown = CancellationToken::new();
    let task_handles = scheduler::spawn_all(store, shared.bus.clone(), runtime, shutdown.clone())
        .await
        .context("spawn connection tasks")?;
    info!(connections = task_handles.len(), "scheduler started");

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("osb-daemon listening on http://{}", addr);

    let server = axum::serve(tokio::net::TcpListener::bind(addr).await?, app);

    tokio::select! {
        result = server => {
            result.context("server crashed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, cancelling connection tasks");
        }
    }

    // Cancellation and shutdown: fire the shared token so every
    // per-connection task observes it at its next between-cycle
    // checkpoint; a task mid-cycle completes its in-flight HTTP call
    // (bounded by its own 30s timeout) before exiting there rather than
    // being hard-aborted out from under it. Join every supervisor handle
    // so the process doesn't exit before its tasks actually stop.
    shutdown.cancel();
    for handle in task_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "connection task join failed during shutdown");
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let default_level = default_level.to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("OSB_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
