//! An in-memory double for the upstream JSON-RPC service, for tests that
//! need a working [`osb_upstream::UpstreamClient`] without a live
//! Odoo-like backend to talk to.

use httpmock::prelude::*;
use serde_json::{json, Value};

use osb_upstream::UpstreamClient;

/// A running mock JSON-RPC endpoint plus helpers to stub its two call
/// shapes (`common.authenticate`, `object.execute_kw`).
pub struct UpstreamDouble {
    pub server: MockServer,
}

impl UpstreamDouble {
    pub fn start() -> Self {
        Self {
            server: MockServer::start(),
        }
    }

    pub fn base_url(&self) -> String {
        self.server.url("/jsonrpc")
    }

    /// Build an `UpstreamClient` pointed at this double.
    pub fn client(&self, db: &str, username: &str, api_key: &str) -> UpstreamClient {
        UpstreamClient::new(
            self.base_url(),
            db.to_string(),
            username.to_string(),
            api_key.to_string(),
        )
    }

    /// Answer the next `common.authenticate` call with `session_id`.
    pub fn mock_authenticate(&self, session_id: i64) {
        self.server.mock(|when, then| {
            when.method(POST).path("/jsonrpc").json_body_partial(
                r#"{"params": {"service": "common", "method": "authenticate"}}"#,
            );
            then.status(200)
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": session_id}));
        });
    }

    /// Answer the next `object.execute_kw` call (any model/method) with
    /// `result`, whatever its shape.
    pub fn mock_execute_kw(&self, result: Value) {
        self.server.mock(|when, then| {
            when.method(POST)
                .path("/jsonrpc")
                .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
            then.status(200)
                .json_body(json!({"jsonrpc": "2.0", "id": 2, "result": result}));
        });
    }

    /// Answer the next `object.execute_kw` call with a session-expiry error
    /// (JSON-RPC error code 100), to exercise the transparent re-auth path.
    pub fn mock_session_expired(&self) {
        self.server.mock(|when, then| {
            when.method(POST)
                .path("/jsonrpc")
                .json_body_partial(r#"{"params": {"service": "object", "method": "execute_kw"}}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"code": 100, "message": "Session expired"},
            }));
        });
    }
}
