use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::RwLock;
use tower::ServiceExt;

use osb_daemon::routes::build_router;
use osb_daemon::state::AppState;
use osb_schemas::NewConnection;
use osb_testkit::temp_store;

fn new_connection(name: &str) -> NewConnection {
    NewConnection {
        name: name.to_string(),
        upstream_base_url: "https://upstream.example.com/jsonrpc".to_string(),
        upstream_db: "acme-prod".to_string(),
        upstream_username: "integration@acme.example.com".to_string(),
        api_key: "sk-live-abc123".to_string(),
        webhook_url: "https://hooks.example.com/acme".to_string(),
        webhook_secret: "shh".to_string(),
        downstream_store_id: "store-1".to_string(),
        downstream_client_id: "client-1".to_string(),
        poll_interval_secs: None,
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let fixture = temp_store().await.unwrap();
    let runtime = Arc::new(RwLock::new(HashMap::new()));
    let state = Arc::new(AppState::new(fixture.store, runtime));
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "osb-daemon");
}

#[tokio::test]
async fn list_connections_reflects_the_store() {
    let fixture = temp_store().await.unwrap();
    fixture
        .store
        .create_connection(&new_connection("Acme"))
        .await
        .unwrap();
    let runtime = Arc::new(RwLock::new(HashMap::new()));
    let state = Arc::new(AppState::new(fixture.store, runtime));
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/connections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["connections"].as_array().unwrap().len(), 1);
    assert_eq!(json["connections"][0]["name"], "Acme");
}

#[tokio::test]
async fn get_connection_404s_for_an_unknown_id() {
    let fixture = temp_store().await.unwrap();
    let runtime = Arc::new(RwLock::new(HashMap::new()));
    let state = Arc::new(AppState::new(fixture.store, runtime));
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/connections/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
