//! Flex-order reconciliation.
//!
//! A flex order's final filled amount is not fixed at creation; the actual
//! legs are recomputed incrementally as confirmed receipts and payments
//! arrive. Reconciliation never changes order status and never completes an
//! order on its own — finalization is a separate, explicit call.
//!
//! All arithmetic runs through the rate-inference pair so the buy and sell
//! legs stay algebraically consistent under the base-currency heuristic.

use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use fxd_db::{orders, reference, subledger, OrderRow};
use fxd_schemas::{
    Capabilities, DeskError, DeskResult, OrderStatus, SubLedgerKind,
};

use crate::lifecycle::ensure_can_modify;

// ---------------------------------------------------------------------------
// Receipt side
// ---------------------------------------------------------------------------

/// Recompute actuals after a receipt confirmation:
/// `actual_amount_buy = Σ(confirmed receipts)`, sell leg derived via the
/// effective rate. Persisted immediately, no status change.
pub(crate) async fn reconcile_receipt(conn: &mut PgConnection, order_id: Uuid) -> DeskResult<()> {
    let order = fetch_order(&mut *conn, order_id).await?;

    let total_receipts = subledger::sum_confirmed(&mut *conn, SubLedgerKind::Receipt, order.id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let rates = reference::leg_rates(&mut *conn, &order.from_currency, &order.to_currency)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let actual_sell = fxd_rates::convert_legs(
        total_receipts,
        order.effective_rate(),
        &order.from_currency,
        &order.to_currency,
        rates,
    );

    debug!(order_no = order.order_no, total_receipts, actual_sell, "flex receipt reconcile");

    orders::update_order_actuals(
        &mut *conn,
        order.id,
        Some(total_receipts),
        Some(actual_sell),
        order.actual_rate,
    )
    .await
    .map_err(fxd_db::translate_db_error)
}

// ---------------------------------------------------------------------------
// Payment side
// ---------------------------------------------------------------------------

/// Recompute actuals after a payment confirmation.
///
/// When confirmed payments exceed the expected sell amount, the excess is
/// inverted back through the rate to the number of additional receipts the
/// customer still owes; the buy leg grows by that amount and the sell leg
/// snaps to the paid total. The order is never auto-completed here.
pub(crate) async fn reconcile_payment(conn: &mut PgConnection, order_id: Uuid) -> DeskResult<()> {
    let order = fetch_order(&mut *conn, order_id).await?;
    let effective_rate = order.effective_rate();

    let expected = match (order.actual_amount_sell, order.actual_amount_buy) {
        (Some(sell), _) => sell,
        (None, Some(buy)) => buy * effective_rate,
        (None, None) => order.amount_sell,
    };

    let total_payments = subledger::sum_confirmed(&mut *conn, SubLedgerKind::Payment, order.id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    if total_payments <= expected {
        return Ok(());
    }

    let excess = total_payments - expected;
    let rates = reference::leg_rates(&mut *conn, &order.from_currency, &order.to_currency)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let additional_receipts_needed = fxd_rates::invert_legs(
        excess,
        effective_rate,
        &order.from_currency,
        &order.to_currency,
        rates,
    );

    let actual_buy = order.actual_amount_buy.unwrap_or(0.0) + additional_receipts_needed;

    debug!(
        order_no = order.order_no,
        total_payments, expected, excess, additional_receipts_needed,
        "flex payment reconcile"
    );

    orders::update_order_actuals(
        &mut *conn,
        order.id,
        Some(actual_buy),
        Some(total_payments),
        order.actual_rate,
    )
    .await
    .map_err(fxd_db::translate_db_error)
}

// ---------------------------------------------------------------------------
// Explicit flex operations
// ---------------------------------------------------------------------------

/// Accept the partial fill as final intent: actuals snap to the confirmed
/// receipts and the order moves to `under_process` for settlement.
pub async fn proceed_with_partial_receipts(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
) -> DeskResult<OrderRow> {
    let order = fetch_order(&mut *conn, order_id).await?;
    ensure_can_modify(caps, &order)?;
    ensure_flex(&order)?;

    match order.status {
        OrderStatus::Pending | OrderStatus::UnderProcess => {}
        other => {
            return Err(DeskError::invalid_state(format!(
                "order #{} is {}, cannot proceed with partial receipts",
                order.order_no,
                other.as_str()
            )))
        }
    }

    let total_receipts = subledger::sum_confirmed(&mut *conn, SubLedgerKind::Receipt, order.id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let rates = reference::leg_rates(&mut *conn, &order.from_currency, &order.to_currency)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let actual_sell = fxd_rates::convert_legs(
        total_receipts,
        order.effective_rate(),
        &order.from_currency,
        &order.to_currency,
        rates,
    );

    orders::update_order_actuals(
        &mut *conn,
        order.id,
        Some(total_receipts),
        Some(actual_sell),
        order.actual_rate,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    orders::update_order_status(&mut *conn, order.id, OrderStatus::UnderProcess)
        .await
        .map_err(fxd_db::translate_db_error)?;

    fetch_order(&mut *conn, order_id).await
}

/// Adjust the working rate of a flex order and rebase the sell leg on the
/// current actual buy amount. No status change.
pub async fn adjust_flex_rate(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
    new_rate: f64,
) -> DeskResult<OrderRow> {
    if !new_rate.is_finite() || new_rate <= 0.0 {
        return Err(DeskError::invalid_argument(format!(
            "rate must be > 0, got {new_rate}"
        )));
    }

    let order = fetch_order(&mut *conn, order_id).await?;
    ensure_can_modify(caps, &order)?;
    ensure_flex(&order)?;

    let actual_sell = match order.actual_amount_buy {
        Some(actual_buy) => {
            let rates =
                reference::leg_rates(&mut *conn, &order.from_currency, &order.to_currency)
                    .await
                    .map_err(fxd_db::translate_db_error)?;
            Some(fxd_rates::convert_legs(
                actual_buy,
                new_rate,
                &order.from_currency,
                &order.to_currency,
                rates,
            ))
        }
        None => order.actual_amount_sell,
    };

    orders::update_order_actuals(
        &mut *conn,
        order.id,
        order.actual_amount_buy,
        actual_sell,
        Some(new_rate),
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    fetch_order(&mut *conn, order_id).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_order(conn: &mut PgConnection, order_id: Uuid) -> DeskResult<OrderRow> {
    orders::fetch_order(&mut *conn, order_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("order {order_id}")))
}

fn ensure_flex(order: &OrderRow) -> DeskResult<()> {
    if !order.is_flex_order {
        return Err(DeskError::invalid_state(format!(
            "order #{} is not a flex order",
            order.order_no
        )));
    }
    Ok(())
}
