use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized order line inside an [`Envelope`].
///
/// `price_cents` is a misnomer inherited from the upstream's own field name
/// it carries the unit price verbatim, with no cent
/// scaling applied. Downstream readers must tolerate that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeItem {
    pub sku: String,
    pub name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub price_cents: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSource {
    pub platform: String,
    pub connection_id: String,
    pub store_id: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformAttributes {
    pub upstream_state: String,
    pub client_order_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeOrder {
    pub platform_order_id: String,
    pub platform_order_number: String,
    pub date_order: String,
    pub financial_status: String,
    pub note: Option<String>,
    pub client_order_ref: Option<String>,
    pub amount_total: Value,
    pub tags: Vec<String>,
    pub platform_attributes: PlatformAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub orders_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub province: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

/// The exact outbound JSON envelope POSTed to a connection's webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub external_id: String,
    pub source: EnvelopeSource,
    pub order: EnvelopeOrder,
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub items: Vec<EnvelopeItem>,
}

impl Envelope {
    pub const EVENT_ORDER_CONFIRMED: &'static str = "order.confirmed";
}
