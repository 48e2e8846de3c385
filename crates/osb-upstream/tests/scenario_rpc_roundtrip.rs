use httpmock::prelude::*;
use osb_upstream::{UpstreamClient, UpstreamError};
use serde_json::json;

fn client(server: &MockServer) -> UpstreamClient {
    UpstreamClient::new(
        server.url("/jsonrpc"),
        "mydb".to_string(),
        "me@example.com".to_string(),
        "api-key-123".to_string(),
    )
}

#[tokio::test]
async fn authenticate_caches_session_id() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });

    let c = client(&server);
    let uid = c.authenticate().await.expect("authenticate");
    assert_eq!(uid, 7);
    assert_eq!(c.cached_session().await, Some(7));
    mock.assert();
}

#[tokio::test]
async fn search_read_authenticates_first_then_calls_execute_kw() {
    let server = MockServer::start();
    let auth = server.mock(|when, then| {
        when.method(POST).path("/jsonrpc").json_body_partial(
            r#"{"params": {"service": "common", "method": "authenticate"}}"#,
        );
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    let search = server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": [{"id": 1, "name": "SO001"}],
        }));
    });

    let c = client(&server);
    let rows = c
        .search_read("sale.order", json!([]), &["id", "name"], None, Some(50))
        .await
        .expect("search_read");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "SO001");
    auth.assert();
    search.assert();
}

#[tokio::test]
async fn read_with_empty_ids_skips_the_call() {
    let server = MockServer::start();
    let never = server.mock(|when, then| {
        when.method(POST).path("/jsonrpc");
        then.status(500);
    });

    let c = client(&server);
    let rows = c.read("res.partner", &[], &["id"]).await.expect("read");
    assert!(rows.is_empty());
    never.assert_hits(0);
}

#[tokio::test]
async fn expired_session_triggers_one_transparent_reauth_retry() {
    let server = MockServer::start();

    // First authenticate call (the initial ensure_session).
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });

    // execute_kw fails with an Odoo session error the first time.
    let stale = server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": 100, "message": "Session expired"},
        }));
    });

    let c = client(&server);
    let first = c.search_read("sale.order", json!([]), &["id"], None, None).await;
    assert!(matches!(first, Err(UpstreamError::Auth(_))));
    // The retry re-authenticated once before giving up: two execute_kw hits.
    stale.assert_hits(2);
}

#[tokio::test]
async fn reauth_retry_replays_the_original_search_domain() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    // First execute_kw fails with a stale session; the retry must carry the
    // same domain, not an empty one that would match every row.
    let stale = server.mock(|when, then| {
        when.method(POST).path("/jsonrpc").json_body_partial(
            r#"{"params": {"service": "object", "method": "execute_kw",
                "args": ["mydb", 7, "api-key-123", "sale.order", "search_read",
                         [[["state", "in", ["sale", "done"]]]], {"fields": ["id"]}]}}"#,
        );
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": 100, "message": "Session expired"},
        }));
    });

    let c = client(&server);
    let domain = json!([["state", "in", ["sale", "done"]]]);
    let result = c
        .search_read("sale.order", domain, &["id"], None, None)
        .await;
    assert!(matches!(result, Err(UpstreamError::Auth(_))));
    // Both the initial call and the retry matched the domain-bearing mock.
    stale.assert_hits(2);
}

#[tokio::test]
async fn non_success_status_invalidates_the_cached_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(500);
    });

    let c = client(&server);
    c.authenticate().await.expect("authenticate");
    assert_eq!(c.cached_session().await, Some(7));

    let result = c.search_read("sale.order", json!([]), &["id"], None, None).await;
    assert!(matches!(result, Err(UpstreamError::Transport(_))));
    assert_eq!(c.cached_session().await, None);
}

#[tokio::test]
async fn malformed_body_invalidates_the_cached_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(200).body("not json at all");
    });

    let c = client(&server);
    c.authenticate().await.expect("authenticate");
    assert_eq!(c.cached_session().await, Some(7));

    let result = c.search_read("sale.order", json!([]), &["id"], None, None).await;
    assert!(matches!(result, Err(UpstreamError::Malformed(_))));
    assert_eq!(c.cached_session().await, None);
}

#[tokio::test]
async fn rate_limited_response_is_reported_distinctly() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(429);
    });

    let c = client(&server);
    c.authenticate().await.expect("authenticate");
    let result = c.search_read("sale.order", json!([]), &["id"], None, None).await;
    assert!(matches!(result, Err(UpstreamError::RateLimited)));
    // Rate-limiting says nothing about session validity — leave it cached.
    assert_eq!(c.cached_session().await, Some(7));
}

#[tokio::test]
async fn malformed_reply_is_reported_as_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "common", "method": "authenticate"}}"#);
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": 7}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/jsonrpc")
            .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"not": "an array"},
        }));
    });

    let c = client(&server);
    let result = c.search_read("sale.order", json!([]), &["id"], None, None).await;
    assert!(matches!(result, Err(UpstreamError::Malformed(_))));
}
