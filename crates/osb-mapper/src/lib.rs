//! Mapper: pure normalization of upstream order data into an outbound envelope.
//!
//! Pure transformation from a prefetched upstream batch to the outbound
//! [`Envelope`]. No I/O: the Worker is responsible for fetching everything
//! this function touches and for handling any `Err` it returns.

mod error;

pub use error::MapperError;

use std::collections::HashMap;

use osb_schemas::{
    Customer, Envelope, EnvelopeItem, EnvelopeOrder, EnvelopeSource, PlatformAttributes,
    ShippingAddress,
};
use osb_upstream::{AttributeValue, Line, OrderRecord, Partner, Product, Template};

/// Everything the Mapper needs for one order, already fetched by the Worker.
/// Collections are keyed by upstream id for O(1) lookup.
pub struct MapperInput<'a> {
    pub connection_id: String,
    pub upstream_db: String,
    pub store_id: String,
    pub client_id: String,
    pub order: &'a OrderRecord,
    pub partner: &'a Partner,
    pub shipping_partner: &'a Partner,
    pub lines: &'a [Line],
    pub products_by_id: &'a HashMap<i64, Product>,
    pub templates_by_id: &'a HashMap<i64, Template>,
    pub attribute_values_by_id: &'a HashMap<i64, AttributeValue>,
}

/// Build the outbound [`Envelope`] for one order.
pub fn map_order(input: MapperInput<'_>) -> Result<Envelope, MapperError> {
    let external_id =
        osb_schemas::RetryItem::external_id_for(&input.upstream_db, input.order.id);

    let items = input
        .lines
        .iter()
        .filter(|line| line_quantity(line) > 0)
        .map(|line| map_line(line, &input))
        .collect::<Result<Vec<_>, _>>()?;

    let date_order = normalize_date(&input.order.date_order);

    Ok(Envelope {
        event: Envelope::EVENT_ORDER_CONFIRMED.to_string(),
        external_id,
        source: EnvelopeSource {
            platform: "UPSTREAM".to_string(),
            connection_id: input.connection_id,
            store_id: input.store_id,
            client_id: input.client_id,
        },
        order: EnvelopeOrder {
            platform_order_id: input.order.id.to_string(),
            platform_order_number: input.order.name.clone(),
            date_order,
            financial_status: invoice_status_label(&input.order.invoice_status),
            note: input.order.note.clone(),
            client_order_ref: input.order.client_order_ref.clone(),
            amount_total: input.order.amount_total.clone(),
            tags: Vec::new(),
            platform_attributes: PlatformAttributes {
                upstream_state: input.order.state.clone(),
                client_order_ref: input.order.client_order_ref.clone(),
            },
        },
        customer: Customer {
            name: input.partner.name.clone(),
            phone: contact_phone(input.partner),
            email: input.partner.email.clone().unwrap_or_default(),
            orders_count: input.partner.sale_order_count,
        },
        shipping_address: ShippingAddress {
            name: input.shipping_partner.name.clone(),
            address1: input.shipping_partner.street.clone().unwrap_or_default(),
            address2: input.shipping_partner.street2.clone().unwrap_or_default(),
            city: input.shipping_partner.city.clone().unwrap_or_default(),
            province: input.shipping_partner.state_name.clone().unwrap_or_default(),
            zip: input.shipping_partner.zip.clone().unwrap_or_default(),
            country: input
                .shipping_partner
                .country_code
                .clone()
                .unwrap_or_default(),
            phone: contact_phone(input.shipping_partner),
        },
        items,
    })
}

/// Maps Odoo's `invoice_status` vocabulary onto the downstream
/// `financial_status` vocabulary. `invoiced`/`upselling` both mean the
/// order has been fully invoiced, so both read as paid; `to invoice` is
/// still outstanding, and `no` (nothing left to invoice, e.g. a free
/// order) is treated the same way since no payment is pending.
fn invoice_status_label(invoice_status: &str) -> String {
    match invoice_status {
        "invoiced" | "upselling" => "paid",
        "to invoice" => "pending",
        _ => "no_charge",
    }
    .to_string()
}

fn contact_phone(partner: &Partner) -> String {
    partner
        .mobile
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| partner.phone.clone())
        .unwrap_or_default()
}

fn line_quantity(line: &Line) -> i64 {
    line.product_uom_qty.as_i64().unwrap_or_else(|| {
        line.product_uom_qty
            .as_f64()
            .map(|q| q as i64)
            .unwrap_or(0)
    })
}

fn map_line(line: &Line, input: &MapperInput<'_>) -> Result<EnvelopeItem, MapperError> {
    let product = input
        .products_by_id
        .get(&line.product_id)
        .ok_or(MapperError::MissingField {
            field: "product",
            order_id: input.order.id,
        })?;

    let sku = sku_for(product, input.templates_by_id, &input.upstream_db);

    let name = line
        .name
        .clone()
        .unwrap_or_else(|| product.default_code.clone().unwrap_or_default());

    let variant_name = product
        .product_template_attribute_value_ids
        .iter()
        .filter_map(|id| input.attribute_values_by_id.get(id))
        .map(|av| av.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(EnvelopeItem {
        sku,
        name,
        variant_name,
        quantity: line_quantity(line),
        price_cents: line.price_unit.clone(),
    })
}

/// SKU derivation fallback chain: product code, then barcode, then
/// the parent template's code, then a synthesized placeholder.
fn sku_for(product: &Product, templates_by_id: &HashMap<i64, Template>, db: &str) -> String {
    if let Some(code) = product.default_code.as_ref().filter(|c| !c.is_empty()) {
        return code.clone();
    }
    if let Some(barcode) = product.barcode.as_ref().filter(|c| !c.is_empty()) {
        return barcode.clone();
    }
    if let Some(template) = templates_by_id.get(&product.product_tmpl_id) {
        if let Some(code) = template.default_code.as_ref().filter(|c| !c.is_empty()) {
            return code.clone();
        }
    }
    format!("UPSTREAM-{db}-{}", product.id)
}

fn normalize_date(date: &chrono::DateTime<chrono::Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn order(id: i64, partner_id: i64, shipping_id: i64) -> OrderRecord {
        OrderRecord {
            id,
            name: format!("S{id:05}"),
            write_date: chrono::Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
            date_order: chrono::Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
            state: "sale".to_string(),
            invoice_status: "invoiced".to_string(),
            note: None,
            client_order_ref: Some("PO-1".to_string()),
            amount_total: json!(123.45),
            partner_id,
            partner_shipping_id: shipping_id,
            order_line: Vec::new(),
        }
    }

    fn partner(id: i64, mobile: Option<&str>, phone: Option<&str>) -> Partner {
        Partner {
            id,
            name: "Jane Doe".to_string(),
            phone: phone.map(str::to_string),
            mobile: mobile.map(str::to_string),
            email: Some("jane@example.com".to_string()),
            street: Some("123 Main St".to_string()),
            street2: None,
            city: Some("Springfield".to_string()),
            state_name: Some("IL".to_string()),
            zip: Some("62701".to_string()),
            country_code: Some("US".to_string()),
            sale_order_count: 4,
        }
    }

    fn line(id: i64, order_id: i64, product_id: i64, qty: f64) -> Line {
        Line {
            id,
            order_id,
            product_id,
            name: Some("Widget".to_string()),
            product_uom_qty: json!(qty),
            price_unit: json!(19.99),
        }
    }

    fn product(id: i64, code: Option<&str>, barcode: Option<&str>, tmpl_id: i64) -> Product {
        Product {
            id,
            default_code: code.map(str::to_string),
            barcode: barcode.map(str::to_string),
            product_tmpl_id: tmpl_id,
            product_template_attribute_value_ids: Vec::new(),
        }
    }

    #[test]
    fn happy_path_maps_every_field() {
        let ord = order(42, 1, 1);
        let p = partner(1, Some("555-1111"), Some("555-2222"));
        let lines = vec![line(1, 42, 10, 2.0)];
        let mut products = HashMap::new();
        products.insert(10, product(10, Some("SKU-1"), None, 100));

        let envelope = map_order(MapperInput {
            connection_id: "conn-1".to_string(),
            upstream_db: "mydb".to_string(),
            store_id: "store-1".to_string(),
            client_id: "client-1".to_string(),
            order: &ord,
            partner: &p,
            shipping_partner: &p,
            lines: &lines,
            products_by_id: &products,
            templates_by_id: &HashMap::new(),
            attribute_values_by_id: &HashMap::new(),
        })
        .unwrap();

        assert_eq!(envelope.event, "order.confirmed");
        assert_eq!(envelope.external_id, "upstream_mydb_42");
        assert_eq!(envelope.order.platform_order_id, "42");
        assert_eq!(envelope.order.platform_order_number, "S00042");
        assert_eq!(envelope.order.date_order, "2025-01-15T10:30:00Z");
        assert_eq!(envelope.order.amount_total, json!(123.45));
        assert_eq!(envelope.order.financial_status, "paid");
        assert_eq!(envelope.order.platform_attributes.upstream_state, "sale");
        assert_eq!(envelope.customer.phone, "555-1111");
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].sku, "SKU-1");
        assert_eq!(envelope.items[0].quantity, 2);
    }

    #[test]
    fn lines_with_non_positive_quantity_are_omitted() {
        let ord = order(1, 1, 1);
        let p = partner(1, None, None);
        let lines = vec![line(1, 1, 10, 0.0), line(2, 1, 10, -1.0), line(3, 1, 10, 3.0)];
        let mut products = HashMap::new();
        products.insert(10, product(10, Some("SKU-1"), None, 100));

        let envelope = map_order(MapperInput {
            connection_id: "c".to_string(),
            upstream_db: "db".to_string(),
            store_id: "s".to_string(),
            client_id: "cl".to_string(),
            order: &ord,
            partner: &p,
            shipping_partner: &p,
            lines: &lines,
            products_by_id: &products,
            templates_by_id: &HashMap::new(),
            attribute_values_by_id: &HashMap::new(),
        })
        .unwrap();

        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].quantity, 3);
    }

    #[test]
    fn sku_falls_back_to_barcode_then_template_then_synthesized() {
        let mut templates = HashMap::new();
        templates.insert(100, Template { id: 100, default_code: Some("TMPL-1".to_string()) });

        // No product code, has barcode -> barcode wins.
        assert_eq!(
            sku_for(&product(1, None, Some("BAR-1"), 100), &templates, "db"),
            "BAR-1"
        );
        // No product code, no barcode -> template code.
        assert_eq!(
            sku_for(&product(2, None, None, 100), &templates, "db"),
            "TMPL-1"
        );
        // Nothing at all -> synthesized.
        assert_eq!(
            sku_for(&product(3, None, None, 999), &templates, "db"),
            "UPSTREAM-db-3"
        );
    }

    #[test]
    fn variant_name_joins_attribute_values_in_order() {
        let ord = order(1, 1, 1);
        let p = partner(1, None, None);
        let lines = vec![line(1, 1, 10, 1.0)];
        let mut products = HashMap::new();
        let mut prod = product(10, Some("SKU-1"), None, 100);
        prod.product_template_attribute_value_ids = vec![2, 1];
        products.insert(10, prod);
        let mut attrs = HashMap::new();
        attrs.insert(1, AttributeValue { id: 1, name: "Red".to_string() });
        attrs.insert(2, AttributeValue { id: 2, name: "Large".to_string() });

        let envelope = map_order(MapperInput {
            connection_id: "c".to_string(),
            upstream_db: "db".to_string(),
            store_id: "s".to_string(),
            client_id: "cl".to_string(),
            order: &ord,
            partner: &p,
            shipping_partner: &p,
            lines: &lines,
            products_by_id: &products,
            templates_by_id: &HashMap::new(),
            attribute_values_by_id: &attrs,
        })
        .unwrap();

        assert_eq!(envelope.items[0].variant_name, "Large, Red");
    }

    #[test]
    fn contact_prefers_mobile_over_landline() {
        let with_mobile = partner(1, Some("mobile"), Some("landline"));
        assert_eq!(contact_phone(&with_mobile), "mobile");

        let landline_only = partner(1, None, Some("landline"));
        assert_eq!(contact_phone(&landline_only), "landline");

        let neither = partner(1, None, None);
        assert_eq!(contact_phone(&neither), "");
    }

    #[test]
    fn invoice_status_maps_to_financial_status_distinctly_from_workflow_state() {
        assert_eq!(invoice_status_label("invoiced"), "paid");
        assert_eq!(invoice_status_label("upselling"), "paid");
        assert_eq!(invoice_status_label("to invoice"), "pending");
        assert_eq!(invoice_status_label("no"), "no_charge");
    }

    #[test]
    fn missing_product_is_a_mapper_error() {
        let ord = order(1, 1, 1);
        let p = partner(1, None, None);
        let lines = vec![line(1, 1, 999, 1.0)];

        let result = map_order(MapperInput {
            connection_id: "c".to_string(),
            upstream_db: "db".to_string(),
            store_id: "s".to_string(),
            client_id: "cl".to_string(),
            order: &ord,
            partner: &p,
            shipping_partner: &p,
            lines: &lines,
            products_by_id: &HashMap::new(),
            templates_by_id: &HashMap::new(),
            attribute_values_by_id: &HashMap::new(),
        });

        assert!(matches!(
            result,
            Err(MapperError::MissingField { field: "product", order_id: 1 })
        ));
    }
}
