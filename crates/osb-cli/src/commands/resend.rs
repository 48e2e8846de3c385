//! Manual re-send of the last N orders for a connection. Deliberately
//! bypasses the delivery ledger — an explicit operator action overrides
//! automatic dedupe. Unlike the Worker cycle this path does not touch the
//! breaker or the cursor: it is a point-in-time operator action, not a
//! scheduled cycle.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use osb_db::Store;
use osb_dispatcher::Dispatcher;
use osb_mapper::{map_order, MapperInput};

use super::{build_upstream_client, require_connection};

pub async fn resend_last_n(store: &Store, connection_id: String, count: i64) -> Result<()> {
    let connection = require_connection(store, &connection_id).await?;
    let upstream = build_upstream_client(&connection);
    upstream.ensure_session().await?;

    // Most recent `count` confirmed orders, descending by write_date;
    // re-send in the same ascending order a fresh cycle would use.
    let mut orders = upstream.fetch_seed_orders(count).await?;
    orders.reverse();

    if orders.is_empty() {
        eprintln!("no confirmed orders found for connection {connection_id}");
        return Ok(());
    }

    let partner_ids: Vec<i64> = orders
        .iter()
        .flat_map(|o| [o.partner_id, o.partner_shipping_id])
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let partners_by_id: HashMap<i64, _> = upstream
        .fetch_partners(&partner_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let line_ids: Vec<i64> = orders.iter().flat_map(|o| o.order_line.clone()).collect();
    let lines = upstream.fetch_lines(&line_ids).await?;
    let mut lines_by_order: HashMap<i64, Vec<_>> = HashMap::new();
    for line in lines {
        lines_by_order.entry(line.order_id).or_default().push(line);
    }

    let product_ids: Vec<i64> = lines_by_order
        .values()
        .flatten()
        .map(|l| l.product_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let products = upstream.fetch_products(&product_ids).await?;

    let template_ids: Vec<i64> = products
        .iter()
        .map(|p| p.product_tmpl_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let templates_by_id: HashMap<i64, _> = upstream
        .fetch_templates(&template_ids)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let attribute_value_ids: Vec<i64> = products
        .iter()
        .flat_map(|p| p.product_template_attribute_value_ids.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let attribute_values_by_id: HashMap<i64, _> = upstream
        .fetch_attribute_values(&attribute_value_ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();
    let products_by_id: HashMap<i64, _> = products.into_iter().map(|p| (p.id, p)).collect();

    let dispatcher = Dispatcher::new();
    let mut sent = 0i32;
    let mut failed = 0i32;
    for order in &orders {
        let Some(partner) = partners_by_id.get(&order.partner_id) else {
            eprintln!("order_id={} ok=false error=missing partner record", order.id);
            failed += 1;
            continue;
        };
        let shipping_partner = partners_by_id
            .get(&order.partner_shipping_id)
            .unwrap_or(partner);
        let lines = lines_by_order.get(&order.id).cloned().unwrap_or_default();

        let envelope = match map_order(MapperInput {
            connection_id: connection.id.clone(),
            upstream_db: connection.upstream_db.clone(),
            store_id: connection.downstream_store_id.clone(),
            client_id: connection.downstream_client_id.clone(),
            order,
            partner,
            shipping_partner,
            lines: &lines,
            products_by_id: &products_by_id,
            templates_by_id: &templates_by_id,
            attribute_values_by_id: &attribute_values_by_id,
        }) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("order_id={} ok=false error={e}", order.id);
                failed += 1;
                continue;
            }
        };

        match dispatcher
            .dispatch(&connection.webhook_url, &connection.webhook_secret, &connection.id, &envelope)
            .await
        {
            Ok(()) => {
                store
                    .mark_sent(&connection.id, order.id, order.write_date)
                    .await?;
                println!("order_id={} ok=true", order.id);
                sent += 1;
            }
            Err(e) => {
                eprintln!("order_id={} ok=false error={e}", order.id);
                failed += 1;
            }
        }
    }

    eprintln!("resend complete: sent={sent} failed={failed}");
    if failed > 0 && sent == 0 {
        anyhow::bail!("all {failed} re-sent order(s) failed to dispatch");
    }
    Ok(())
}
