//! Dispatcher: delivers one normalized envelope to a connection's webhook.
//!
//! Sends one [`Envelope`] to a connection's webhook URL. One `reqwest::Client`
//! per connection (a bulkhead), separate from the UpstreamClient's.

mod error;

pub use error::DispatchError;

use std::time::Duration;

use osb_schemas::Envelope;

/// Per-request timeout: 30 seconds, fixed for now.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies longer than this are truncated before being stored as a
/// retry item's `last_error`.
const ERROR_BODY_TRUNCATE_LEN: usize = 2048;

pub struct Dispatcher {
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Dispatcher { http }
    }

    /// POST `envelope` to `webhook_url`. Success is any `2xx` status.
    pub async fn dispatch(
        &self,
        webhook_url: &str,
        webhook_secret: &str,
        connection_id: &str,
        envelope: &Envelope,
    ) -> Result<(), DispatchError> {
        let resp = self
            .http
            .post(webhook_url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Secret", webhook_secret)
            .header("X-Upstream-Connection-Id", connection_id)
            .json(envelope)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() >= 200 && status.as_u16() < 300 {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body: truncate(&body),
        })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_BODY_TRUNCATE_LEN {
        body.to_string()
    } else {
        let mut cut = ERROR_BODY_TRUNCATE_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use osb_schemas::{Customer, EnvelopeItem, EnvelopeOrder, EnvelopeSource, PlatformAttributes, ShippingAddress};
    use serde_json::json;

    fn sample_envelope() -> Envelope {
        Envelope {
            event: Envelope::EVENT_ORDER_CONFIRMED.to_string(),
            external_id: "upstream_db_1".to_string(),
            source: EnvelopeSource {
                platform: "UPSTREAM".to_string(),
                connection_id: "conn-1".to_string(),
                store_id: "store-1".to_string(),
                client_id: "client-1".to_string(),
            },
            order: EnvelopeOrder {
                platform_order_id: "1".to_string(),
                platform_order_number: "S00001".to_string(),
                date_order: "2025-01-15T10:30:00Z".to_string(),
                financial_status: "sale".to_string(),
                note: None,
                client_order_ref: None,
                amount_total: json!(10.0),
                tags: Vec::new(),
                platform_attributes: PlatformAttributes {
                    upstream_state: "sale".to_string(),
                    client_order_ref: None,
                },
            },
            customer: Customer {
                name: "Jane".to_string(),
                phone: "555".to_string(),
                email: "jane@example.com".to_string(),
                orders_count: 1,
            },
            shipping_address: ShippingAddress {
                name: "Jane".to_string(),
                address1: "".to_string(),
                address2: "".to_string(),
                city: "".to_string(),
                province: "".to_string(),
                zip: "".to_string(),
                country: "".to_string(),
                phone: "".to_string(),
            },
            items: vec![EnvelopeItem {
                sku: "SKU-1".to_string(),
                name: "Widget".to_string(),
                variant_name: "".to_string(),
                quantity: 1,
                price_cents: json!(9.99),
            }],
        }
    }

    #[tokio::test]
    async fn success_on_2xx() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .header("X-Webhook-Secret", "shh")
                .header("X-Upstream-Connection-Id", "conn-1");
            then.status(200);
        });

        let d = Dispatcher::new();
        let result = d
            .dispatch(&server.url("/hook"), "shh", "conn-1", &sample_envelope())
            .await;
        assert!(result.is_ok());
        mock.assert();
    }

    #[tokio::test]
    async fn non_2xx_is_rejected_with_truncated_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500).body("internal error");
        });

        let d = Dispatcher::new();
        let result = d
            .dispatch(&server.url("/hook"), "shh", "conn-1", &sample_envelope())
            .await;

        match result {
            Err(DispatchError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn truncate_leaves_short_bodies_untouched() {
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let long = "a".repeat(ERROR_BODY_TRUNCATE_LEN + 100);
        let truncated = truncate(&long);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= ERROR_BODY_TRUNCATE_LEN + '…'.len_utf8());
    }
}
