//! Order lifecycle state machine.
//!
//! Owns the order status field, the per-status field-mutability policy, and
//! the completion-time cascade:
//!
//! - `pending → under_process → {completed, cancelled}`; the approval-hold
//!   states (`pending_amend`, `pending_delete`) are entered and left only by
//!   the approval workflow, never through [`transition_status`].
//! - Core trade fields are editable while pending; always-updatable fields
//!   (handler, accounts, profit, service charge, remarks) stay editable
//!   until completion. Completed orders change through the approval gate —
//!   admins keep a direct path (e.g. importing already-completed orders).
//! - Completing posts the two trade legs directly unless confirmed
//!   receipts/payments already carry them, then confirms every remaining
//!   draft profit/service-charge row.

use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use fxd_db::{accounts, orders, reference, subledger, NewOrder, OrderRow};
use fxd_schemas::{
    Capabilities, DeskError, DeskResult, EntryDirection, OrderStatus, OrderType, SubLedgerKind,
    SubLedgerStatus,
};

use crate::sub_ledger::{self, reversal_description};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Fields accepted when creating an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer_id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    pub amount_buy: f64,
    pub amount_sell: f64,
    pub rate: f64,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub is_flex_order: bool,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub handler_id: Option<Uuid>,
    pub remarks: Option<String>,
}

/// Profit / service-charge patch carried on an order update. Editing these
/// on a non-completed order replaces the single draft row for that kind.
#[derive(Debug, Clone)]
pub struct EarningPatch {
    pub account_id: Option<Uuid>,
    pub amount: f64,
    pub currency_code: Option<String>,
}

/// Partial update of an order. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    // Core trade fields — pending orders only (admin bypass on completed).
    pub customer_id: Option<Uuid>,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    pub amount_buy: Option<f64>,
    pub amount_sell: Option<f64>,
    pub rate: Option<f64>,
    pub order_type: Option<OrderType>,
    pub is_flex_order: Option<bool>,
    // Always-updatable fields.
    pub handler_id: Option<Uuid>,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub profit: Option<EarningPatch>,
    pub service_charge: Option<EarningPatch>,
}

impl OrderPatch {
    fn touches_core_fields(&self) -> bool {
        self.customer_id.is_some()
            || self.from_currency.is_some()
            || self.to_currency.is_some()
            || self.amount_buy.is_some()
            || self.amount_sell.is_some()
            || self.rate.is_some()
            || self.order_type.is_some()
            || self.is_flex_order.is_some()
    }
}

// ---------------------------------------------------------------------------
// Permission helpers
// ---------------------------------------------------------------------------

/// Creator, handler, or admin may mutate an order.
pub fn ensure_can_modify(caps: &Capabilities, order: &OrderRow) -> DeskResult<()> {
    if caps.is_admin
        || caps.user_id == order.created_by
        || order.handler_id == Some(caps.user_id)
    {
        return Ok(());
    }
    Err(DeskError::forbidden(format!(
        "user {} may not modify order #{}",
        caps.user_id, order.order_no
    )))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

pub async fn create_order(
    conn: &mut PgConnection,
    caps: &Capabilities,
    input: CreateOrder,
) -> DeskResult<OrderRow> {
    validate_trade_fields(
        &input.from_currency,
        &input.to_currency,
        input.amount_buy,
        input.amount_sell,
        input.rate,
    )?;

    if !reference::customer_exists(&mut *conn, input.customer_id)
        .await
        .map_err(fxd_db::translate_db_error)?
    {
        return Err(DeskError::not_found(format!(
            "customer {}",
            input.customer_id
        )));
    }

    match input.status {
        OrderStatus::Pending | OrderStatus::UnderProcess => {}
        OrderStatus::Completed => {
            // Importing an already-completed order triggers completion
            // postings; that path is admin-only.
            if !caps.is_admin {
                return Err(DeskError::forbidden(
                    "only admins may create completed orders",
                ));
            }
        }
        other => {
            return Err(DeskError::invalid_argument(format!(
                "orders cannot be created as {}",
                other.as_str()
            )))
        }
    }

    if let Some(account_id) = input.buy_account_id {
        validate_trade_account(&mut *conn, account_id, &input.from_currency, "buy").await?;
    }
    if let Some(account_id) = input.sell_account_id {
        validate_trade_account(&mut *conn, account_id, &input.to_currency, "sell").await?;
    }

    let order = orders::insert_order(
        &mut *conn,
        &NewOrder {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            from_currency: input.from_currency,
            to_currency: input.to_currency,
            amount_buy: input.amount_buy,
            amount_sell: input.amount_sell,
            rate: input.rate,
            status: input.status,
            order_type: input.order_type,
            is_flex_order: input.is_flex_order,
            buy_account_id: input.buy_account_id,
            sell_account_id: input.sell_account_id,
            handler_id: input.handler_id,
            created_by: caps.user_id,
            remarks: input.remarks,
        },
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    if order.status == OrderStatus::Completed {
        run_completion_cascade(&mut *conn, &order).await?;
    }

    info!(order_no = order.order_no, status = order.status.as_str(), "order created");
    Ok(order)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

pub async fn update_order(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
    patch: OrderPatch,
) -> DeskResult<OrderRow> {
    let mut order = fetch_order(&mut *conn, order_id).await?;
    ensure_can_modify(caps, &order)?;

    if order.status.is_approval_hold() {
        return Err(DeskError::invalid_state(format!(
            "order #{} is locked behind a pending approval request",
            order.order_no
        )));
    }
    if order.status.approval_gated() && !caps.is_admin {
        return Err(DeskError::forbidden(format!(
            "order #{} is completed; changes require an approval request",
            order.order_no
        )));
    }
    if patch.touches_core_fields() && !(order.status.core_fields_editable() || caps.is_admin) {
        return Err(DeskError::invalid_state(format!(
            "core trade fields of order #{} are locked in status {}",
            order.order_no,
            order.status.as_str()
        )));
    }

    // Core fields.
    if let Some(customer_id) = patch.customer_id {
        if !reference::customer_exists(&mut *conn, customer_id)
            .await
            .map_err(fxd_db::translate_db_error)?
        {
            return Err(DeskError::not_found(format!("customer {customer_id}")));
        }
        order.customer_id = customer_id;
    }
    if let Some(v) = patch.from_currency {
        order.from_currency = v;
    }
    if let Some(v) = patch.to_currency {
        order.to_currency = v;
    }
    if let Some(v) = patch.amount_buy {
        order.amount_buy = v;
    }
    if let Some(v) = patch.amount_sell {
        order.amount_sell = v;
    }
    if let Some(v) = patch.rate {
        order.rate = v;
    }
    if let Some(v) = patch.order_type {
        order.order_type = v;
    }
    if let Some(v) = patch.is_flex_order {
        order.is_flex_order = v;
    }
    validate_trade_fields(
        &order.from_currency,
        &order.to_currency,
        order.amount_buy,
        order.amount_sell,
        order.rate,
    )?;

    // Always-updatable fields.
    if let Some(v) = patch.handler_id {
        order.handler_id = Some(v);
    }
    if let Some(account_id) = patch.buy_account_id {
        validate_trade_account(&mut *conn, account_id, &order.from_currency, "buy").await?;
        order.buy_account_id = Some(account_id);
    }
    if let Some(account_id) = patch.sell_account_id {
        validate_trade_account(&mut *conn, account_id, &order.to_currency, "sell").await?;
        order.sell_account_id = Some(account_id);
    }
    if patch.remarks.is_some() {
        order.remarks = patch.remarks;
    }

    // Profit / service charge edits replace the single draft row per kind.
    // On completed orders those rows are confirmed; changes go through the
    // approval workflow's replace pattern instead.
    if patch.profit.is_some() || patch.service_charge.is_some() {
        if order.status.approval_gated() {
            return Err(DeskError::invalid_state(format!(
                "profit/service charge of completed order #{} change via approval",
                order.order_no
            )));
        }
        if let Some(p) = patch.profit {
            sub_ledger::validate_amount(SubLedgerKind::Profit, p.amount)?;
            sub_ledger::replace_draft(
                &mut *conn,
                order.id,
                SubLedgerKind::Profit,
                p.account_id,
                p.amount,
                p.currency_code,
            )
            .await?;
        }
        if let Some(p) = patch.service_charge {
            sub_ledger::validate_amount(SubLedgerKind::ServiceCharge, p.amount)?;
            sub_ledger::replace_draft(
                &mut *conn,
                order.id,
                SubLedgerKind::ServiceCharge,
                p.account_id,
                p.amount,
                p.currency_code,
            )
            .await?;
        }
    }

    orders::update_order_row(&mut *conn, &order)
        .await
        .map_err(fxd_db::translate_db_error)?;

    fetch_order(&mut *conn, order_id).await
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

pub async fn transition_status(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
    new_status: OrderStatus,
) -> DeskResult<OrderRow> {
    let order = fetch_order(&mut *conn, order_id).await?;
    ensure_can_modify(caps, &order)?;

    let allowed = matches!(
        (order.status, new_status),
        (OrderStatus::Pending, OrderStatus::UnderProcess)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::UnderProcess, OrderStatus::Completed)
            | (OrderStatus::UnderProcess, OrderStatus::Cancelled)
    ) || (caps.is_admin
        && matches!(
            (order.status, new_status),
            (OrderStatus::Pending, OrderStatus::Completed)
        ));

    if !allowed {
        return Err(DeskError::invalid_state(format!(
            "order #{}: {} -> {} is not a valid transition",
            order.order_no,
            order.status.as_str(),
            new_status.as_str()
        )));
    }

    orders::update_order_status(&mut *conn, order.id, new_status)
        .await
        .map_err(fxd_db::translate_db_error)?;

    if new_status == OrderStatus::Completed {
        run_completion_cascade(&mut *conn, &order).await?;
    }

    info!(
        order_no = order.order_no,
        from = order.status.as_str(),
        to = new_status.as_str(),
        "order status transition"
    );

    fetch_order(&mut *conn, order_id).await
}

/// Completion-time cascade.
///
/// 1. If the order already carries confirmed receipts/payments, skip direct
///    posting — the money moved when those rows were confirmed.
/// 2. Otherwise, when both trade accounts are set and the order is not OTC,
///    post the two legs directly: buy account `add amount_buy`, sell
///    account `withdraw amount_sell`.
/// 3. Always: confirm every remaining draft profit/service-charge row.
pub(crate) async fn run_completion_cascade(
    conn: &mut PgConnection,
    order: &OrderRow,
) -> DeskResult<()> {
    let has_cashflow = subledger::has_confirmed_cashflow(&mut *conn, order.id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    if !has_cashflow {
        if let (Some(buy_account), Some(sell_account)) =
            (order.buy_account_id, order.sell_account_id)
        {
            if order.order_type != OrderType::Otc {
                fxd_ledger::post_entry(
                    &mut *conn,
                    buy_account,
                    EntryDirection::Add,
                    order.amount_buy,
                    &direct_buy_description(order.order_no),
                )
                .await?;
                fxd_ledger::post_entry(
                    &mut *conn,
                    sell_account,
                    EntryDirection::Withdraw,
                    order.amount_sell,
                    &direct_sell_description(order.order_no),
                )
                .await?;
            }
        }
    }

    for kind in [SubLedgerKind::Profit, SubLedgerKind::ServiceCharge] {
        let drafts = subledger::list_sub_ledger_rows_by_status(
            &mut *conn,
            kind,
            order.id,
            SubLedgerStatus::Draft,
        )
        .await
        .map_err(fxd_db::translate_db_error)?;

        for row in drafts {
            sub_ledger::confirm_fetched(&mut *conn, order, row).await?;
        }
    }

    Ok(())
}

/// Description of the direct buy-leg posting made at completion.
pub fn direct_buy_description(order_no: i64) -> String {
    format!("Order #{order_no} - Received from customer")
}

/// Description of the direct sell-leg posting made at completion.
pub fn direct_sell_description(order_no: i64) -> String {
    format!("Order #{order_no} - Paid to customer")
}

// ---------------------------------------------------------------------------
// Deletion & reversal
// ---------------------------------------------------------------------------

/// Reverse every confirmed posting tied to an order with exact
/// equal-and-opposite ledger calls. Returns the image paths of the order's
/// receipt/payment rows for best-effort cleanup after commit.
///
/// Legacy orders that completed with no sub-ledger rows get their two
/// direct completion postings reversed instead.
pub async fn reverse_order_postings(
    conn: &mut PgConnection,
    order: &OrderRow,
) -> DeskResult<Vec<String>> {
    let mut image_paths = Vec::new();
    let mut had_confirmed_cashflow = false;

    for kind in [
        SubLedgerKind::Receipt,
        SubLedgerKind::Payment,
        SubLedgerKind::Profit,
        SubLedgerKind::ServiceCharge,
    ] {
        let rows = subledger::list_sub_ledger_rows(&mut *conn, kind, order.id)
            .await
            .map_err(fxd_db::translate_db_error)?;

        for row in rows {
            if let Some(path) = &row.image_path {
                image_paths.push(path.clone());
            }
            if row.status != SubLedgerStatus::Confirmed {
                continue;
            }
            if kind.is_cashflow() {
                had_confirmed_cashflow = true;
            }
            let account_id = row.account_id.ok_or_else(|| {
                DeskError::invalid_state(format!(
                    "confirmed {} {} has no account; cannot reverse",
                    kind.as_str(),
                    row.id
                ))
            })?;
            fxd_ledger::reverse_entry(
                &mut *conn,
                account_id,
                kind.confirm_direction(row.amount),
                row.amount.abs(),
                &reversal_description(order.order_no, kind, row.amount),
            )
            .await?;
        }
    }

    // Legacy path: the order completed via direct posting of the two legs.
    let was_completed = matches!(
        order.status,
        OrderStatus::Completed | OrderStatus::PendingAmend | OrderStatus::PendingDelete
    );
    if was_completed && !had_confirmed_cashflow && order.order_type != OrderType::Otc {
        if let (Some(buy_account), Some(sell_account)) =
            (order.buy_account_id, order.sell_account_id)
        {
            fxd_ledger::reverse_entry(
                &mut *conn,
                buy_account,
                EntryDirection::Add,
                order.amount_buy,
                &format!("Order #{} - Reversal: Received from customer", order.order_no),
            )
            .await?;
            fxd_ledger::reverse_entry(
                &mut *conn,
                sell_account,
                EntryDirection::Withdraw,
                order.amount_sell,
                &format!("Order #{} - Reversal: Paid to customer", order.order_no),
            )
            .await?;
        }
    }

    Ok(image_paths)
}

/// Direct (non-approval) delete. Completed and approval-held orders are
/// admin-only here; everyone else goes through the approval workflow.
///
/// Returns image paths for best-effort cleanup after the transaction
/// commits.
pub async fn delete_order(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
) -> DeskResult<Vec<String>> {
    let order = fetch_order(&mut *conn, order_id).await?;
    ensure_can_modify(caps, &order)?;

    if (order.status.approval_gated() || order.status.is_approval_hold()) && !caps.is_admin {
        return Err(DeskError::forbidden(format!(
            "order #{} is completed; deletion requires an approval request",
            order.order_no
        )));
    }

    let image_paths = reverse_order_postings(&mut *conn, &order).await?;

    orders::delete_order(&mut *conn, order.id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    info!(order_no = order.order_no, "order deleted");
    Ok(image_paths)
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

async fn fetch_order(conn: &mut PgConnection, order_id: Uuid) -> DeskResult<OrderRow> {
    orders::fetch_order(&mut *conn, order_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("order {order_id}")))
}

fn validate_trade_fields(
    from_currency: &str,
    to_currency: &str,
    amount_buy: f64,
    amount_sell: f64,
    rate: f64,
) -> DeskResult<()> {
    if from_currency.trim().is_empty() || to_currency.trim().is_empty() {
        return Err(DeskError::invalid_argument(
            "both currency legs are required",
        ));
    }
    if from_currency == to_currency {
        return Err(DeskError::invalid_argument(
            "currency legs must differ",
        ));
    }
    for (name, v) in [
        ("amount_buy", amount_buy),
        ("amount_sell", amount_sell),
        ("rate", rate),
    ] {
        if !v.is_finite() || v <= 0.0 {
            return Err(DeskError::invalid_argument(format!(
                "{name} must be > 0, got {v}"
            )));
        }
    }
    Ok(())
}

/// A trade account must exist and hold the currency of its order leg.
async fn validate_trade_account(
    conn: &mut PgConnection,
    account_id: Uuid,
    leg_currency: &str,
    leg: &str,
) -> DeskResult<()> {
    let account = accounts::fetch_account(&mut *conn, account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {account_id}")))?;

    if account.currency_code != leg_currency {
        return Err(DeskError::invalid_argument(format!(
            "{leg} account {} holds {}, order leg is {}",
            account_id, account.currency_code, leg_currency
        )));
    }
    Ok(())
}
