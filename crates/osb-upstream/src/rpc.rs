//! JSON-RPC 2.0 request/response envelopes for the upstream wire protocol.
//! `service` is `"common"` for `authenticate` and `"object"` for
//! `execute_kw`; positional arguments are always wrapped in a single
//! enclosing array.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: RpcParams,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct RpcParams {
    pub service: &'static str,
    pub method: &'static str,
    pub args: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, service: &'static str, method: &'static str, args: Vec<Value>) -> Self {
        RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Build the `execute_kw` positional-args envelope: the enclosing array
/// `[db, uid, api_key, model, method, args, kwargs]`, with `kwargs` fields
/// included only when truthy (non-empty limit/order).
pub fn execute_kw_args(
    db: &str,
    uid: i64,
    api_key: &str,
    model: &str,
    method: &str,
    positional: Vec<Value>,
    limit: Option<i64>,
    order: Option<&str>,
    fields: &[&str],
) -> Vec<Value> {
    let mut kwargs = serde_json::Map::new();
    if !fields.is_empty() {
        kwargs.insert("fields".to_string(), Value::from(fields.to_vec()));
    }
    if let Some(limit) = limit {
        if limit > 0 {
            kwargs.insert("limit".to_string(), Value::from(limit));
        }
    }
    if let Some(order) = order {
        if !order.is_empty() {
            kwargs.insert("order".to_string(), Value::from(order));
        }
    }

    vec![
        Value::from(db),
        Value::from(uid),
        Value::from(api_key),
        Value::from(model),
        Value::from(method),
        Value::Array(positional),
        Value::Object(kwargs),
    ]
}
