//! Builders for sample normalized envelopes, for tests that exercise
//! dispatch, retry, and ledger logic without running the full
//! upstream-fetch-then-map pipeline.

use chrono::Utc;
use serde_json::json;

use osb_schemas::{
    Customer, Envelope, EnvelopeItem, EnvelopeOrder, EnvelopeSource, PlatformAttributes,
    ShippingAddress,
};

/// A minimal, valid envelope for `order_id` on `connection_id`. Every field
/// is populated with a plausible, fixed value — callers that care about a
/// specific field should overwrite it on the returned struct.
pub fn sample_envelope(connection_id: &str, order_id: i64) -> Envelope {
    Envelope {
        event: Envelope::EVENT_ORDER_CONFIRMED.to_string(),
        external_id: format!("upstream_testdb_{order_id}"),
        source: EnvelopeSource {
            platform: "upstream".to_string(),
            connection_id: connection_id.to_string(),
            store_id: "store-1".to_string(),
            client_id: "client-1".to_string(),
        },
        order: EnvelopeOrder {
            platform_order_id: order_id.to_string(),
            platform_order_number: format!("SO{order_id:05}"),
            date_order: Utc::now().to_rfc3339(),
            financial_status: "sale".to_string(),
            note: None,
            client_order_ref: None,
            amount_total: json!("199.00"),
            tags: vec![],
            platform_attributes: PlatformAttributes {
                upstream_state: "sale".to_string(),
                client_order_ref: None,
            },
        },
        customer: Customer {
            name: "Jane Doe".to_string(),
            phone: "+15555550123".to_string(),
            email: "jane@example.com".to_string(),
            orders_count: 1,
        },
        shipping_address: ShippingAddress {
            name: "Jane Doe".to_string(),
            address1: "1 Example St".to_string(),
            address2: String::new(),
            city: "Springfield".to_string(),
            province: "IL".to_string(),
            zip: "62704".to_string(),
            country: "US".to_string(),
            phone: "+15555550123".to_string(),
        },
        items: vec![EnvelopeItem {
            sku: format!("SKU-{order_id}"),
            name: "Widget".to_string(),
            variant_name: String::new(),
            quantity: 1,
            price_cents: json!("19.99"),
        }],
    }
}
