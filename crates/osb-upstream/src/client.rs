use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::UpstreamError;
use crate::records::{AttributeValue, Line, OrderRecord, Partner, Product, Template};
use crate::rpc::{execute_kw_args, RpcRequest, RpcResponse};

/// Per-request timeout: 30 seconds for every upstream RPC.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

const ORDER_FIELDS: &[&str] = &[
    "id",
    "name",
    "write_date",
    "date_order",
    "state",
    "invoice_status",
    "note",
    "client_order_ref",
    "amount_total",
    "partner_id",
    "partner_shipping_id",
    "order_line",
];
const PARTNER_FIELDS: &[&str] = &[
    "id", "name", "phone", "mobile", "email", "street", "street2", "city", "state_name", "zip",
    "country_code", "sale_order_count",
];
const LINE_FIELDS: &[&str] = &[
    "id",
    "order_id",
    "product_id",
    "name",
    "product_uom_qty",
    "price_unit",
];
const PRODUCT_FIELDS: &[&str] = &[
    "id",
    "default_code",
    "barcode",
    "product_tmpl_id",
    "product_template_attribute_value_ids",
];
const TEMPLATE_FIELDS: &[&str] = &["id", "default_code"];
const ATTRIBUTE_VALUE_FIELDS: &[&str] = &["id", "name"];

/// Parameters for fetching a page of confirmed orders in the Worker's
/// steady-state path.
#[derive(Debug, Clone)]
pub struct FetchCandidatesRequest {
    pub since_write_date: DateTime<Utc>,
    pub limit: i64,
}

/// One instance per connection. Owns its own `reqwest::Client` —
/// the bulkhead pattern means a hung upstream only ever blocks this
/// connection's task.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    db: String,
    username: String,
    api_key: String,
    session: Mutex<Option<i64>>,
    next_id: Mutex<u64>,
}

impl UpstreamClient {
    pub fn new(base_url: String, db: String, username: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("reqwest client build");
        UpstreamClient {
            http,
            base_url,
            db,
            username,
            api_key,
            session: Mutex::new(None),
            next_id: Mutex::new(1),
        }
    }

    /// Seed the session cache (used by `ensure_session` if the caller
    /// already carries a cached id from the Store).
    pub async fn seed_session(&self, session_id: Option<i64>) {
        *self.session.lock().await = session_id;
    }

    pub async fn cached_session(&self) -> Option<i64> {
        *self.session.lock().await
    }

    async fn next_request_id(&self) -> u64 {
        let mut guard = self.next_id.lock().await;
        let id = *guard;
        *guard += 1;
        id
    }

    /// Exchange `(db, user, api_key)` for a numeric session id. Caches it
    /// until `invalidate_session` is called.
    pub async fn authenticate(&self) -> Result<i64, UpstreamError> {
        let id = self.next_request_id().await;
        let args = vec![
            Value::from(self.db.clone()),
            Value::from(self.username.clone()),
            Value::from(self.api_key.clone()),
            Value::Object(Default::default()),
        ];
        let req = RpcRequest::new(id, "common", "authenticate", args);
        let reply = self.send(&req).await?;

        let uid = reply
            .as_i64()
            .ok_or_else(|| UpstreamError::Auth("authenticate returned no session id".into()))?;

        *self.session.lock().await = Some(uid);
        Ok(uid)
    }

    /// Ensure a session is cached, authenticating if necessary.
    pub async fn ensure_session(&self) -> Result<i64, UpstreamError> {
        if let Some(uid) = self.cached_session().await {
            return Ok(uid);
        }
        self.authenticate().await
    }

    /// Clear the cached session; the next call re-authenticates.
    pub async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        positional: Vec<Value>,
        limit: Option<i64>,
        order: Option<&str>,
        fields: &[&str],
    ) -> Result<Value, UpstreamError> {
        let uid = self.ensure_session().await?;
        let id = self.next_request_id().await;
        let args = execute_kw_args(
            &self.db,
            uid,
            &self.api_key,
            model,
            method,
            positional.clone(),
            limit,
            order,
            fields,
        );
        let req = RpcRequest::new(id, "object", "execute_kw", args);

        match self.send(&req).await {
            Ok(v) => Ok(v),
            Err(UpstreamError::Auth(msg)) => {
                // `send` already invalidated the session on this failure;
                // one transparent retry re-authenticates and replays the call
                // with the same positional args (the search domain or id list).
                let uid = self.ensure_session().await.map_err(|_| {
                    UpstreamError::Auth(format!("re-authentication failed after: {msg}"))
                })?;
                let id = self.next_request_id().await;
                let args = execute_kw_args(
                    &self.db, uid, &self.api_key, model, method, positional, limit, order, fields,
                );
                let req = RpcRequest::new(id, "object", "execute_kw", args);
                self.send(&req).await
            }
            Err(e) => Err(e),
        }
    }

    /// Send one JSON-RPC request. On any transport error or authentication
    /// error the cached session is invalidated before returning — §4.2: "On
    /// any transport error or authentication error, invalidate the session
    /// and fail the current call." A 429 is surfaced as-is without touching
    /// the session, since rate-limiting says nothing about its validity.
    async fn send(&self, req: &RpcRequest) -> Result<Value, UpstreamError> {
        let resp = match self.http.post(&self.base_url).json(req).send().await {
            Ok(r) => r,
            Err(e) => {
                self.invalidate_session().await;
                return Err(UpstreamError::Transport(e.to_string()));
            }
        };

        if resp.status().as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_session().await;
            return Err(UpstreamError::Auth(format!(
                "upstream returned {}",
                resp.status()
            )));
        }
        if !resp.status().is_success() {
            self.invalidate_session().await;
            return Err(UpstreamError::Transport(format!(
                "upstream returned {}",
                resp.status()
            )));
        }

        let body: RpcResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                self.invalidate_session().await;
                return Err(UpstreamError::Malformed(e.to_string()));
            }
        };

        if let Some(err) = body.error {
            // Odoo surfaces an expired/invalid session as an application-level
            // JSON-RPC error rather than an HTTP 401; treat the common codes
            // for that as an auth failure so the transparent retry fires.
            if err.code == 100 || err.message.to_ascii_lowercase().contains("session") {
                self.invalidate_session().await;
                return Err(UpstreamError::Auth(err.message));
            }
            self.invalidate_session().await;
            return Err(UpstreamError::Malformed(err.message));
        }

        if body.result.is_none() {
            self.invalidate_session().await;
        }
        body.result
            .ok_or_else(|| UpstreamError::Malformed("missing result field".into()))
    }

    /// Filtered batch read.
    pub async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        order: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, UpstreamError> {
        let result = self
            .execute_kw(
                model,
                "search_read",
                vec![domain],
                limit,
                order,
                fields,
            )
            .await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| UpstreamError::Malformed("search_read did not return an array".into()))
    }

    /// Batch read by id list; order of results is not guaranteed.
    pub async fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<Value>, UpstreamError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids_value = Value::from(ids.to_vec());
        let result = self
            .execute_kw(model, "read", vec![ids_value], None, None, fields)
            .await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| UpstreamError::Malformed("read did not return an array".into()))
    }

    // -- Typed convenience wrappers used by the Worker's batch prefetch --

    /// Worker step 3 (seed path): most recent `limit` confirmed orders,
    /// ordered by `write_date` descending.
    pub async fn fetch_seed_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, UpstreamError> {
        let rows = self
            .search_read(
                "sale.order",
                confirmed_state_domain(None),
                ORDER_FIELDS,
                Some("write_date desc"),
                Some(limit),
            )
            .await?;
        decode_many(rows)
    }

    /// Worker step 4 (steady state): confirmed orders with `write_date >
    /// since`, ordered ascending.
    pub async fn fetch_new_orders(
        &self,
        req: FetchCandidatesRequest,
    ) -> Result<Vec<OrderRecord>, UpstreamError> {
        let rows = self
            .search_read(
                "sale.order",
                confirmed_state_domain(Some(req.since_write_date)),
                ORDER_FIELDS,
                Some("write_date asc"),
                Some(req.limit),
            )
            .await?;
        decode_many(rows)
    }

    pub async fn fetch_partners(&self, ids: &[i64]) -> Result<Vec<Partner>, UpstreamError> {
        decode_many(self.read("res.partner", ids, PARTNER_FIELDS).await?)
    }

    pub async fn fetch_lines(&self, ids: &[i64]) -> Result<Vec<Line>, UpstreamError> {
        decode_many(self.read("sale.order.line", ids, LINE_FIELDS).await?)
    }

    pub async fn fetch_products(&self, ids: &[i64]) -> Result<Vec<Product>, UpstreamError> {
        decode_many(self.read("product.product", ids, PRODUCT_FIELDS).await?)
    }

    pub async fn fetch_templates(&self, ids: &[i64]) -> Result<Vec<Template>, UpstreamError> {
        decode_many(
            self.read("product.template", ids, TEMPLATE_FIELDS)
                .await?,
        )
    }

    pub async fn fetch_attribute_values(
        &self,
        ids: &[i64],
    ) -> Result<Vec<AttributeValue>, UpstreamError> {
        decode_many(
            self.read(
                "product.template.attribute.value",
                ids,
                ATTRIBUTE_VALUE_FIELDS,
            )
            .await?,
        )
    }
}

fn confirmed_state_domain(since_write_date: Option<DateTime<Utc>>) -> Value {
    let state_clause = Value::from(vec![
        Value::from("state"),
        Value::from("in"),
        Value::from(vec!["sale", "done"]),
    ]);
    match since_write_date {
        None => Value::from(vec![state_clause]),
        Some(since) => {
            let write_date_clause = Value::from(vec![
                Value::from("write_date"),
                Value::from(">"),
                Value::from(since.to_rfc3339()),
            ]);
            Value::from(vec![state_clause, write_date_clause])
        }
    }
}

fn decode_many<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, UpstreamError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| UpstreamError::Malformed(e.to_string())))
        .collect()
}
