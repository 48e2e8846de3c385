//! Worker: one poll cycle for one connection.
//!
//! Pure orchestration: every step here just calls into `osb-breaker`,
//! `osb-upstream`, `osb-mapper`, `osb-dispatcher`, and `osb-db`. No
//! business rule lives in this file that isn't already owned by one of
//! those crates.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use osb_breaker::Breaker;
use osb_db::{NewSyncLog, Store};
use osb_dispatcher::Dispatcher;
use osb_mapper::{map_order, MapperInput};
use osb_schemas::{BreakerState, Connection};
use osb_upstream::{FetchCandidatesRequest, UpstreamClient};

/// Worker step 3: how many of the most recent confirmed orders to seed the
/// ledger with on a connection's first cycle.
pub const SEED_ORDER_LIMIT: i64 = 30;
/// Worker step 4: page size for the steady-state candidate fetch.
pub const FETCH_CANDIDATES_LIMIT: i64 = 100;

/// Run one poll cycle for `connection`. Never returns an `Err` for
/// ordinary upstream/downstream failures — those are breaker/retry/log
/// outcomes, not process errors. `Err` is reserved for Store I/O failure,
/// which the Scheduler treats as a task-level fault subject to restart.
pub async fn run_cycle(
    store: &Store,
    upstream: &UpstreamClient,
    dispatcher: &Dispatcher,
    connection: &Connection,
) -> Result<()> {
    let span = tracing::info_span!("cycle", connection_id = %connection.id);
    let _enter = span.enter();

    let started_at = Utc::now();
    let breaker_on_entry = current_breaker(connection);

    // Step 1: gate.
    let (breaker, allowed) = breaker_on_entry.allow(started_at);
    if !allowed {
        persist_breaker(store, connection, breaker, connection.last_sync_at).await?;
        append_log(
            store,
            connection,
            started_at,
            breaker_on_entry.state,
            breaker.state,
            0,
            0,
            0,
            0,
            Some("breaker open; cycle skipped".to_string()),
        )
        .await?;
        info!("cycle skipped: breaker open");
        return Ok(());
    }

    // Step 2: authenticate.
    upstream.seed_session(connection.session_id).await;
    if let Err(e) = upstream.ensure_session().await {
        let breaker = apply_fault(breaker, &e, Utc::now());
        persist_breaker(store, connection, breaker, connection.last_sync_at).await?;
        append_log(
            store,
            connection,
            started_at,
            breaker_on_entry.state,
            breaker.state,
            0,
            0,
            0,
            0,
            Some(format!("authentication failed: {e}")),
        )
        .await?;
        warn!(error = %e, "authentication failed");
        return Ok(());
    }
    if let Some(sid) = upstream.cached_session().await {
        if sid != connection.session_id.unwrap_or(-1) {
            store
                .update_session_id(&connection.id, Some(sid))
                .await
                .context("persist cached session id")?;
        }
    }

    // Step 3: seed path.
    if connection.last_sync_at.is_none() {
        return seed(store, upstream, connection, breaker, breaker_on_entry, started_at).await;
    }

    // Step 4: fetch candidates.
    let since = connection.last_sync_at.expect("checked above");
    let candidates = match upstream
        .fetch_new_orders(FetchCandidatesRequest {
            since_write_date: since,
            limit: FETCH_CANDIDATES_LIMIT,
        })
        .await
    {
        Ok(c) => c,
        Err(e) => {
            let breaker = apply_fault(breaker, &e, Utc::now());
            persist_breaker(store, connection, breaker, connection.last_sync_at).await?;
            append_log(
                store,
                connection,
                started_at,
                breaker_on_entry.state,
                breaker.state,
                0,
                0,
                0,
                0,
                Some(format!("fetch candidates failed: {e}")),
            )
            .await?;
            warn!(error = %e, "fetch candidates failed");
            return Ok(());
        }
    };
    let orders_found = candidates.len() as i32;

    // Step 5: ledger dedupe.
    let mut surviving = Vec::with_capacity(candidates.len());
    let mut orders_skipped_by_ledger = 0i32;
    let mut cursor_candidate: Option<DateTime<Utc>> = None;
    for order in candidates {
        if store
            .was_sent(&connection.id, order.id, order.write_date)
            .await
            .context("ledger dedupe check")?
        {
            orders_skipped_by_ledger += 1;
            cursor_candidate = Some(max_ts(cursor_candidate, order.write_date));
        } else {
            surviving.push(order);
        }
    }

    if surviving.is_empty() {
        let breaker = breaker.success();
        persist_breaker(store, connection, breaker, cursor_candidate.or(connection.last_sync_at))
            .await?;
        append_log(
            store,
            connection,
            started_at,
            breaker_on_entry.state,
            breaker.state,
            orders_found,
            0,
            0,
            orders_skipped_by_ledger,
            None,
        )
        .await?;
        info!(orders_found, orders_skipped_by_ledger, "cycle complete, nothing new to dispatch");
        return Ok(());
    }

    // Step 6: batch prefetch.
    let partner_ids: Vec<i64> = surviving
        .iter()
        .flat_map(|o| [o.partner_id, o.partner_shipping_id])
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let partners = match upstream.fetch_partners(&partner_ids).await {
        Ok(p) => p,
        Err(e) => {
            return hard_abort(
                store, connection, breaker, breaker_on_entry, started_at, orders_found,
                orders_skipped_by_ledger, "fetch partners failed", &e,
            )
            .await;
        }
    };
    let partners_by_id: HashMap<i64, _> = partners.into_iter().map(|p| (p.id, p)).collect();

    let line_ids: Vec<i64> = surviving.iter().flat_map(|o| o.order_line.clone()).collect();
    let lines = match upstream.fetch_lines(&line_ids).await {
        Ok(l) => l,
        Err(e) => {
            return hard_abort(
                store, connection, breaker, breaker_on_entry, started_at, orders_found,
                orders_skipped_by_ledger, "fetch lines failed", &e,
            )
            .await;
        }
    };
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
    let products = match upstream.fetch_products(&product_ids).await {
        Ok(p) => p,
        Err(e) => {
            return hard_abort(
                store, connection, breaker, breaker_on_entry, started_at, orders_found,
                orders_skipped_by_ledger, "fetch products failed", &e,
            )
            .await;
        }
    };

    let template_ids: Vec<i64> = products
        .iter()
        .map(|p| p.product_tmpl_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let templates = match upstream.fetch_templates(&template_ids).await {
        Ok(t) => t,
        Err(e) => {
            return hard_abort(
                store, connection, breaker, breaker_on_entry, started_at, orders_found,
                orders_skipped_by_ledger, "fetch templates failed", &e,
            )
            .await;
        }
    };
    let templates_by_id: HashMap<i64, _> = templates.into_iter().map(|t| (t.id, t)).collect();

    let attribute_value_ids: Vec<i64> = products
        .iter()
        .flat_map(|p| p.product_template_attribute_value_ids.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let attribute_values = match upstream.fetch_attribute_values(&attribute_value_ids).await {
        Ok(a) => a,
        Err(e) => {
            return hard_abort(
                store, connection, breaker, breaker_on_entry, started_at, orders_found,
                orders_skipped_by_ledger, "fetch attribute values failed", &e,
            )
            .await;
        }
    };
    let attribute_values_by_id: HashMap<i64, _> =
        attribute_values.into_iter().map(|a| (a.id, a)).collect();
    let products_by_id: HashMap<i64, _> = products.into_iter().map(|p| (p.id, p)).collect();

    // Step 7: dispatch loop (ascending write_date — `fetch_new_orders` already
    // orders this way).
    let mut orders_sent = 0i32;
    let mut orders_failed = 0i32;
    for order in &surviving {
        let partner = match partners_by_id.get(&order.partner_id) {
            Some(p) => p,
            None => {
                orders_failed += 1;
                warn!(order_id = order.id, "missing partner record, skipping order");
                continue;
            }
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
                orders_failed += 1;
                warn!(order_id = order.id, error = %e, "mapper data defect, skipping order");
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
                    .await
                    .context("mark ledger after successful dispatch")?;
                orders_sent += 1;
                cursor_candidate = Some(max_ts(cursor_candidate, order.write_date));
            }
            Err(e) => {
                store
                    .enqueue_retry(
                        &connection.id,
                        order.id,
                        order.write_date,
                        &envelope.external_id,
                        &envelope,
                        &e.to_string(),
                    )
                    .await
                    .context("enqueue retry item after dispatch failure")?;
                orders_failed += 1;
                cursor_candidate = Some(max_ts(cursor_candidate, order.write_date));
                warn!(order_id = order.id, error = %e, "dispatch failed, enqueued for retry");
            }
        }
    }

    // Step 8: cursor advance.
    let new_cursor = cursor_candidate.or(connection.last_sync_at);

    // Step 9: ledger trim.
    store
        .trim_ledger_to_limit(&connection.id, osb_db::LEDGER_LIMIT)
        .await
        .context("ledger trim")?;

    // Step 10: retry sweep.
    let now = Utc::now();
    let due = store
        .due_retry_items(&connection.id, now)
        .await
        .context("fetch due retry items")?;
    for item in due {
        match dispatcher
            .dispatch(&connection.webhook_url, &connection.webhook_secret, &connection.id, &item.envelope)
            .await
        {
            Ok(()) => {
                store
                    .mark_sent(&connection.id, item.upstream_order_id, item.write_date)
                    .await
                    .context("mark ledger after retry success")?;
                store
                    .mark_retry_success(item.id)
                    .await
                    .context("mark retry item success")?;
                info!(retry_id = item.id, "retry item delivered");
            }
            Err(e) => {
                let status = store
                    .record_retry_failure(item.id, &e.to_string())
                    .await
                    .context("record retry failure")?;
                if status == osb_schemas::RetryStatus::Failed {
                    tracing::error!(retry_id = item.id, "retry item exhausted max attempts");
                } else {
                    warn!(retry_id = item.id, error = %e, "retry attempt failed, rescheduled");
                }
            }
        }
    }

    // Step 11: finalize.
    let breaker = breaker.success();
    persist_breaker(store, connection, breaker, new_cursor).await?;
    append_log(
        store,
        connection,
        started_at,
        breaker_on_entry.state,
        breaker.state,
        orders_found,
        orders_sent,
        orders_failed,
        orders_skipped_by_ledger,
        None,
    )
    .await?;
    info!(orders_found, orders_sent, orders_failed, orders_skipped_by_ledger, "cycle complete");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn hard_abort(
    store: &Store,
    connection: &Connection,
    breaker: Breaker,
    breaker_on_entry: Breaker,
    started_at: DateTime<Utc>,
    orders_found: i32,
    orders_skipped_by_ledger: i32,
    context: &str,
    error: &osb_upstream::UpstreamError,
) -> Result<()> {
    let breaker = apply_fault(breaker, error, Utc::now());
    persist_breaker(store, connection, breaker, connection.last_sync_at).await?;
    let summary = format!("{context}: {error}");
    append_log(
        store,
        connection,
        started_at,
        breaker_on_entry.state,
        breaker.state,
        orders_found,
        0,
        0,
        orders_skipped_by_ledger,
        Some(summary.clone()),
    )
    .await?;
    warn!(error = %summary, "cycle aborted on upstream batch prefetch failure");
    Ok(())
}

/// Apply an upstream fault to the breaker per the fault table: a 429
/// aborts the cycle without counting against the breaker, everything
/// else (`is_hard_failure()`) is a genuine failure.
fn apply_fault(breaker: Breaker, error: &osb_upstream::UpstreamError, at: DateTime<Utc>) -> Breaker {
    if error.is_hard_failure() {
        breaker.failure(at)
    } else {
        breaker
    }
}

/// Step 3: first cycle for a connection — seed the ledger without
/// dispatching anything.
async fn seed(
    store: &Store,
    upstream: &UpstreamClient,
    connection: &Connection,
    breaker: Breaker,
    breaker_on_entry: Breaker,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let orders = match upstream.fetch_seed_orders(SEED_ORDER_LIMIT).await {
        Ok(o) => o,
        Err(e) => {
            let breaker = apply_fault(breaker, &e, Utc::now());
            persist_breaker(store, connection, breaker, None).await?;
            append_log(
                store,
                connection,
                started_at,
                breaker_on_entry.state,
                breaker.state,
                0,
                0,
                0,
                0,
                Some(format!("seed fetch failed: {e}")),
            )
            .await?;
            warn!(error = %e, "seed fetch failed");
            return Ok(());
        }
    };

    let mut max_write_date: Option<DateTime<Utc>> = None;
    for order in &orders {
        store
            .mark_sent(&connection.id, order.id, order.write_date)
            .await
            .context("seed ledger mark")?;
        max_write_date = Some(max_ts(max_write_date, order.write_date));
    }
    let new_cursor = max_write_date.unwrap_or_else(Utc::now);

    let breaker = breaker.success();
    persist_breaker(store, connection, breaker, Some(new_cursor)).await?;
    append_log(
        store,
        connection,
        started_at,
        breaker_on_entry.state,
        breaker.state,
        orders.len() as i32,
        0,
        0,
        0,
        None,
    )
    .await?;
    info!(seeded = orders.len(), "connection seeded, cursor initialized");
    Ok(())
}

fn current_breaker(connection: &Connection) -> Breaker {
    Breaker {
        state: connection.breaker_state,
        failure_count: connection.breaker_failure_count,
        half_open_successes: connection.breaker_half_open_successes,
        earliest_retry_at: connection.breaker_earliest_retry_at,
    }
}

async fn persist_breaker(
    store: &Store,
    connection: &Connection,
    breaker: Breaker,
    cursor: Option<DateTime<Utc>>,
) -> Result<()> {
    store
        .update_breaker_and_cursor(
            &connection.id,
            cursor,
            breaker.state,
            breaker.failure_count,
            breaker.half_open_successes,
            breaker.earliest_retry_at,
        )
        .await
        .context("persist breaker and cursor")
}

fn max_ts(a: Option<DateTime<Utc>>, b: DateTime<Utc>) -> DateTime<Utc> {
    match a {
        Some(a) if a >= b => a,
        _ => b,
    }
}

#[allow(clippy::too_many_arguments)]
async fn append_log(
    store: &Store,
    connection: &Connection,
    started_at: DateTime<Utc>,
    breaker_state_on_entry: BreakerState,
    breaker_state_on_exit: BreakerState,
    orders_found: i32,
    orders_sent: i32,
    orders_failed: i32,
    orders_skipped_by_ledger: i32,
    error_summary: Option<String>,
) -> Result<()> {
    let duration_ms = (Utc::now() - started_at).num_milliseconds();
    store
        .append_sync_log(&NewSyncLog {
            connection_id: connection.id.clone(),
            started_at,
            orders_found,
            orders_sent,
            orders_failed,
            orders_skipped_by_ledger,
            duration_ms,
            error_summary,
            breaker_state_on_entry,
            breaker_state_on_exit,
        })
        .await
        .context("append sync log")?;
    Ok(())
}
