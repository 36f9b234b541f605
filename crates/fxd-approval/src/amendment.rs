//! Amendment payloads and the approved-edit application logic.
//!
//! `request_data` on an edit request deserializes into [`OrderAmendment`].
//! Identity and derived fields (id, order_no, creator, timestamps, actuals,
//! status) are never read from the payload.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use fxd_db::{orders, subledger, NewSubLedgerRow, OrderRow};
use fxd_schemas::{
    DeskError, DeskResult, OrderStatus, OrderType, SubLedgerKind, SubLedgerStatus,
};

use fxd_orders::sub_ledger::{posting_description, replace_draft, reversal_description};

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderAmendment {
    pub customer_id: Option<Uuid>,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    pub amount_buy: Option<f64>,
    pub amount_sell: Option<f64>,
    pub rate: Option<f64>,
    pub order_type: Option<OrderType>,
    pub handler_id: Option<Uuid>,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub profit: Option<EarningAmendment>,
    pub service_charge: Option<EarningAmendment>,
    /// Explicit replacement set; when present the confirmed rows are
    /// reversed, deleted and recreated from this array.
    pub receipts: Option<Vec<CashflowAmendment>>,
    pub payments: Option<Vec<CashflowAmendment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EarningAmendment {
    pub account_id: Option<Uuid>,
    pub amount: f64,
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashflowAmendment {
    pub account_id: Uuid,
    pub amount: f64,
    pub image_path: Option<String>,
    /// Marks `image_path` as a pre-existing stored file to reuse; reused
    /// paths are excluded from cleanup on both approve and reject.
    #[serde(default)]
    pub image_unchanged: bool,
}

impl OrderAmendment {
    pub fn parse(request_data: &Value) -> DeskResult<Self> {
        serde_json::from_value(request_data.clone())
            .map_err(|e| DeskError::invalid_argument(format!("malformed request_data: {e}")))
    }

    /// Image paths the amendment introduced (not marked as reused) —
    /// deleted when the request is rejected.
    pub fn fresh_image_paths(&self) -> Vec<String> {
        self.receipts
            .iter()
            .flatten()
            .chain(self.payments.iter().flatten())
            .filter(|e| !e.image_unchanged)
            .filter_map(|e| e.image_path.clone())
            .collect()
    }

    /// Image paths the amendment reuses from the existing rows.
    fn reused_image_paths(&self) -> Vec<&str> {
        self.receipts
            .iter()
            .flatten()
            .chain(self.payments.iter().flatten())
            .filter(|e| e.image_unchanged)
            .filter_map(|e| e.image_path.as_deref())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Approved edit
// ---------------------------------------------------------------------------

/// Apply an approved edit to an order. Returns stored image paths that are
/// no longer referenced (for best-effort cleanup after commit).
///
/// The order arrives in `pending_amend` (or `completed` via the admin direct
/// path); it leaves `completed` if it was ever completed.
pub async fn apply_order_edit(
    conn: &mut PgConnection,
    mut order: OrderRow,
    amendment: &OrderAmendment,
) -> DeskResult<Vec<String>> {
    let was_completed = matches!(
        order.status,
        OrderStatus::Completed | OrderStatus::PendingAmend | OrderStatus::PendingDelete
    );

    let old_amount_buy = order.amount_buy;
    let old_amount_sell = order.amount_sell;
    let mut removed_images = Vec::new();

    // Scalar fields (identity/derived fields excluded by construction).
    if let Some(v) = amendment.customer_id {
        order.customer_id = v;
    }
    if let Some(v) = &amendment.from_currency {
        order.from_currency = v.clone();
    }
    if let Some(v) = &amendment.to_currency {
        order.to_currency = v.clone();
    }
    if let Some(v) = amendment.amount_buy {
        order.amount_buy = v;
    }
    if let Some(v) = amendment.amount_sell {
        order.amount_sell = v;
    }
    if let Some(v) = amendment.rate {
        order.rate = v;
    }
    if let Some(v) = amendment.order_type {
        order.order_type = v;
    }
    if let Some(v) = amendment.handler_id {
        order.handler_id = Some(v);
    }
    if let Some(v) = amendment.buy_account_id {
        order.buy_account_id = Some(v);
    }
    if let Some(v) = amendment.sell_account_id {
        order.sell_account_id = Some(v);
    }
    if amendment.remarks.is_some() {
        order.remarks = amendment.remarks.clone();
    }

    // Profit / service charge: replace pattern. Confirmed rows (completed
    // orders) are reversed + deleted, then the amendment's row is inserted
    // confirmed and posted. Non-completed orders just swap the draft.
    let has_confirmed_earnings = has_confirmed(&mut *conn, &order, SubLedgerKind::Profit).await?
        || has_confirmed(&mut *conn, &order, SubLedgerKind::ServiceCharge).await?;
    let replace_confirmed = was_completed || has_confirmed_earnings;

    for (kind, patch) in [
        (SubLedgerKind::Profit, &amendment.profit),
        (SubLedgerKind::ServiceCharge, &amendment.service_charge),
    ] {
        let Some(patch) = patch else { continue };
        if replace_confirmed {
            replace_confirmed_earning(&mut *conn, &order, kind, patch).await?;
        } else {
            replace_draft(
                &mut *conn,
                order.id,
                kind,
                patch.account_id,
                patch.amount,
                patch.currency_code.clone(),
            )
            .await?;
        }
    }

    // Receipts / payments: explicit arrays replace the confirmed set;
    // otherwise a bare amount change adjusts the first confirmed row.
    for (kind, replacement, old_total, new_total) in [
        (
            SubLedgerKind::Receipt,
            &amendment.receipts,
            old_amount_buy,
            order.amount_buy,
        ),
        (
            SubLedgerKind::Payment,
            &amendment.payments,
            old_amount_sell,
            order.amount_sell,
        ),
    ] {
        if let Some(entries) = replacement {
            let dropped =
                replace_confirmed_cashflow(&mut *conn, &order, kind, entries, amendment).await?;
            removed_images.extend(dropped);
        } else if (new_total - old_total).abs() > f64::EPSILON {
            adjust_first_confirmed(&mut *conn, &order, kind, new_total - old_total).await?;
        }
    }

    if was_completed {
        order.status = OrderStatus::Completed;
    }

    orders::update_order_row(&mut *conn, &order)
        .await
        .map_err(fxd_db::translate_db_error)?;

    Ok(removed_images)
}

/// Reverse and delete every confirmed row of a kind, then insert + post the
/// amendment's single replacement row.
async fn replace_confirmed_earning(
    conn: &mut PgConnection,
    order: &OrderRow,
    kind: SubLedgerKind,
    patch: &EarningAmendment,
) -> DeskResult<()> {
    let confirmed = subledger::list_sub_ledger_rows_by_status(
        &mut *conn,
        kind,
        order.id,
        SubLedgerStatus::Confirmed,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    for row in &confirmed {
        let account_id = confirmed_account(kind, row)?;
        fxd_ledger::reverse_entry(
            &mut *conn,
            account_id,
            kind.confirm_direction(row.amount),
            row.amount.abs(),
            &reversal_description(order.order_no, kind, row.amount),
        )
        .await?;
        subledger::delete_sub_ledger_row(&mut *conn, kind, row.id)
            .await
            .map_err(fxd_db::translate_db_error)?;
    }

    let account_id = patch.account_id.ok_or_else(|| {
        DeskError::invalid_argument(format!(
            "{} amendment needs an account to post against",
            kind.as_str()
        ))
    })?;

    subledger::insert_sub_ledger_row(
        &mut *conn,
        kind,
        &NewSubLedgerRow {
            id: Uuid::new_v4(),
            order_id: order.id,
            account_id: Some(account_id),
            amount: patch.amount,
            image_path: None,
            currency_code: patch.currency_code.clone(),
            status: SubLedgerStatus::Confirmed,
        },
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    fxd_ledger::post_entry(
        &mut *conn,
        account_id,
        kind.confirm_direction(patch.amount),
        patch.amount.abs(),
        &posting_description(order.order_no, kind, patch.amount),
    )
    .await
}

/// Reverse + delete all confirmed rows of a kind and recreate the set from
/// the amendment array. Returns image paths of dropped rows that the
/// amendment does not reuse.
async fn replace_confirmed_cashflow(
    conn: &mut PgConnection,
    order: &OrderRow,
    kind: SubLedgerKind,
    entries: &[CashflowAmendment],
    amendment: &OrderAmendment,
) -> DeskResult<Vec<String>> {
    let reused = amendment.reused_image_paths();
    let confirmed = subledger::list_sub_ledger_rows_by_status(
        &mut *conn,
        kind,
        order.id,
        SubLedgerStatus::Confirmed,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    let mut dropped_images = Vec::new();
    for row in &confirmed {
        let account_id = confirmed_account(kind, row)?;
        fxd_ledger::reverse_entry(
            &mut *conn,
            account_id,
            kind.confirm_direction(row.amount),
            row.amount.abs(),
            &reversal_description(order.order_no, kind, row.amount),
        )
        .await?;
        subledger::delete_sub_ledger_row(&mut *conn, kind, row.id)
            .await
            .map_err(fxd_db::translate_db_error)?;
        if let Some(path) = &row.image_path {
            if !reused.contains(&path.as_str()) {
                dropped_images.push(path.clone());
            }
        }
    }

    for entry in entries {
        if !entry.amount.is_finite() || entry.amount <= 0.0 {
            return Err(DeskError::invalid_argument(format!(
                "{} amendment amount must be > 0",
                kind.as_str()
            )));
        }
        subledger::insert_sub_ledger_row(
            &mut *conn,
            kind,
            &NewSubLedgerRow {
                id: Uuid::new_v4(),
                order_id: order.id,
                account_id: Some(entry.account_id),
                amount: entry.amount,
                image_path: entry.image_path.clone(),
                currency_code: None,
                status: SubLedgerStatus::Confirmed,
            },
        )
        .await
        .map_err(fxd_db::translate_db_error)?;

        fxd_ledger::post_entry(
            &mut *conn,
            entry.account_id,
            kind.confirm_direction(entry.amount),
            entry.amount,
            &posting_description(order.order_no, kind, entry.amount),
        )
        .await?;
    }

    Ok(dropped_images)
}

/// Bare amount change: adjust the first confirmed row by the delta —
/// reverse its old posting, repost the new value, update the row.
async fn adjust_first_confirmed(
    conn: &mut PgConnection,
    order: &OrderRow,
    kind: SubLedgerKind,
    delta: f64,
) -> DeskResult<()> {
    let confirmed = subledger::list_sub_ledger_rows_by_status(
        &mut *conn,
        kind,
        order.id,
        SubLedgerStatus::Confirmed,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    let Some(first) = confirmed.into_iter().next() else {
        // Nothing to adjust (legacy direct-posting orders keep their
        // original postings; the order amounts alone changed).
        return Ok(());
    };

    let account_id = confirmed_account(kind, &first)?;
    let new_amount = first.amount + delta;
    if !new_amount.is_finite() || new_amount <= 0.0 {
        return Err(DeskError::invalid_argument(format!(
            "adjusted {} amount must stay > 0, got {new_amount}",
            kind.as_str()
        )));
    }

    fxd_ledger::reverse_entry(
        &mut *conn,
        account_id,
        kind.confirm_direction(first.amount),
        first.amount,
        &reversal_description(order.order_no, kind, first.amount),
    )
    .await?;
    fxd_ledger::post_entry(
        &mut *conn,
        account_id,
        kind.confirm_direction(new_amount),
        new_amount,
        &posting_description(order.order_no, kind, new_amount),
    )
    .await?;

    let mut updated = first;
    updated.amount = new_amount;
    subledger::update_sub_ledger_row(&mut *conn, kind, &updated)
        .await
        .map_err(fxd_db::translate_db_error)?;
    Ok(())
}

async fn has_confirmed(
    conn: &mut PgConnection,
    order: &OrderRow,
    kind: SubLedgerKind,
) -> DeskResult<bool> {
    let rows = subledger::list_sub_ledger_rows_by_status(
        &mut *conn,
        kind,
        order.id,
        SubLedgerStatus::Confirmed,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;
    Ok(!rows.is_empty())
}

fn confirmed_account(kind: SubLedgerKind, row: &fxd_db::SubLedgerRow) -> DeskResult<Uuid> {
    row.account_id.ok_or_else(|| {
        DeskError::invalid_state(format!(
            "confirmed {} {} has no account; ledger state is inconsistent",
            kind.as_str(),
            row.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalar_amendment() {
        let a = OrderAmendment::parse(&json!({
            "amount_sell": 110.0,
            "remarks": "customer corrected the figure"
        }))
        .unwrap();
        assert_eq!(a.amount_sell, Some(110.0));
        assert!(a.receipts.is_none());
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = OrderAmendment::parse(&json!({"amount_buy": "a lot"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn fresh_images_exclude_reused_paths() {
        let a = OrderAmendment::parse(&json!({
            "payments": [
                {"account_id": Uuid::new_v4(), "amount": 10.0,
                 "image_path": "new.png"},
                {"account_id": Uuid::new_v4(), "amount": 20.0,
                 "image_path": "old.png", "image_unchanged": true}
            ]
        }))
        .unwrap();
        assert_eq!(a.fresh_image_paths(), vec!["new.png".to_string()]);
        assert_eq!(a.reused_image_paths(), vec!["old.png"]);
    }
}
