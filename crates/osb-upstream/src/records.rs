//! Typed records for the upstream model fields the engine actually reads.
//!
//! The upstream RPC protocol returns untyped, string-keyed records; these
//! types are the validation boundary: `serde` failing to
//! deserialize a reply into one of these shapes *is* the "upstream
//! malformed" error case, raised once, at this seam, rather than
//! sprinkled through the Worker or Mapper.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub name: String,
    pub write_date: DateTime<Utc>,
    pub date_order: DateTime<Utc>,
    pub state: String,
    /// Odoo's invoicing status (`"no"`, `"to invoice"`, `"invoiced"`,
    /// `"upselling"`) — the payment/invoice concept the Mapper reports as
    /// `financial_status`, distinct from the workflow `state`.
    #[serde(default = "default_invoice_status")]
    pub invoice_status: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub client_order_ref: Option<String>,
    pub amount_total: Value,
    pub partner_id: i64,
    pub partner_shipping_id: i64,
    #[serde(default)]
    pub order_line: Vec<i64>,
}

fn default_invoice_status() -> String {
    "no".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub sale_order_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Line {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub product_uom_qty: Value,
    pub price_unit: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub default_code: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    pub product_tmpl_id: i64,
    #[serde(default)]
    pub product_template_attribute_value_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub id: i64,
    #[serde(default)]
    pub default_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeValue {
    pub id: i64,
    pub name: String,
}
