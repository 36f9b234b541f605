//! Draft/confirmed lifecycle for the sub-ledger rows of one order.
//!
//! Drafts are freely mutable and deletable and never touch balances.
//! Confirmation is a one-way transition that posts exactly one ledger entry;
//! callers run it inside their open transaction so the status change and the
//! posting commit or roll back together.

use sqlx::PgConnection;
use uuid::Uuid;

use fxd_db::{accounts, orders, subledger, NewSubLedgerRow, OrderRow, SubLedgerRow};
use fxd_schemas::{Capabilities, DeskError, DeskResult, SubLedgerKind, SubLedgerStatus};

use crate::flex;
use crate::lifecycle::ensure_can_modify;

// ---------------------------------------------------------------------------
// Draft creation / mutation
// ---------------------------------------------------------------------------

/// Fields accepted when creating or updating a draft row.
#[derive(Debug, Clone, Default)]
pub struct DraftInput {
    pub account_id: Option<Uuid>,
    pub amount: Option<f64>,
    pub image_path: Option<String>,
    pub currency_code: Option<String>,
}

/// Create a draft row. No balance effect.
pub async fn create_draft(
    conn: &mut PgConnection,
    caps: &Capabilities,
    order_id: Uuid,
    kind: SubLedgerKind,
    input: DraftInput,
) -> DeskResult<SubLedgerRow> {
    let order = orders::fetch_order(&mut *conn, order_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("order {order_id}")))?;
    ensure_can_modify(caps, &order)?;

    let amount = input
        .amount
        .ok_or_else(|| DeskError::invalid_argument("amount is required"))?;
    validate_amount(kind, amount)?;

    if let Some(account_id) = input.account_id {
        validate_account_leg(&mut *conn, &order, kind, account_id).await?;
    }

    subledger::insert_sub_ledger_row(
        &mut *conn,
        kind,
        &NewSubLedgerRow {
            id: Uuid::new_v4(),
            order_id,
            account_id: input.account_id,
            amount,
            image_path: input.image_path,
            currency_code: input.currency_code,
            status: SubLedgerStatus::Draft,
        },
    )
    .await
    .map_err(fxd_db::translate_db_error)
}

/// Update a draft row. Confirmed rows are append-history and never edited
/// directly.
pub async fn update_draft(
    conn: &mut PgConnection,
    caps: &Capabilities,
    kind: SubLedgerKind,
    id: Uuid,
    input: DraftInput,
) -> DeskResult<SubLedgerRow> {
    let mut row = fetch_row(&mut *conn, kind, id).await?;
    if row.status != SubLedgerStatus::Draft {
        return Err(DeskError::invalid_state(format!(
            "{} {id} is {}, only drafts can be edited",
            kind.as_str(),
            row.status.as_str()
        )));
    }

    let order = fetch_parent(&mut *conn, &row).await?;
    ensure_can_modify(caps, &order)?;

    if let Some(amount) = input.amount {
        validate_amount(kind, amount)?;
        row.amount = amount;
    }
    if let Some(account_id) = input.account_id {
        validate_account_leg(&mut *conn, &order, kind, account_id).await?;
        row.account_id = Some(account_id);
    }
    if input.image_path.is_some() {
        row.image_path = input.image_path;
    }
    if input.currency_code.is_some() {
        row.currency_code = input.currency_code;
    }

    subledger::update_sub_ledger_row(&mut *conn, kind, &row)
        .await
        .map_err(fxd_db::translate_db_error)?;
    Ok(row)
}

/// Delete a draft row. Returns the deleted row so callers can clean up any
/// attached image after commit.
pub async fn delete_draft(
    conn: &mut PgConnection,
    caps: &Capabilities,
    kind: SubLedgerKind,
    id: Uuid,
) -> DeskResult<SubLedgerRow> {
    let row = fetch_row(&mut *conn, kind, id).await?;
    if row.status != SubLedgerStatus::Draft {
        return Err(DeskError::invalid_state(format!(
            "{} {id} is {}, only drafts can be deleted",
            kind.as_str(),
            row.status.as_str()
        )));
    }

    let order = fetch_parent(&mut *conn, &row).await?;
    ensure_can_modify(caps, &order)?;

    subledger::delete_sub_ledger_row(&mut *conn, kind, id)
        .await
        .map_err(fxd_db::translate_db_error)?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Confirm a draft row: one-way transition plus exactly one ledger posting.
///
/// For flex orders, confirming a receipt or payment also reconciles the
/// order's actual amounts — in the same transaction.
pub async fn confirm(
    conn: &mut PgConnection,
    caps: &Capabilities,
    kind: SubLedgerKind,
    id: Uuid,
) -> DeskResult<SubLedgerRow> {
    let row = fetch_row(&mut *conn, kind, id).await?;
    let order = fetch_parent(&mut *conn, &row).await?;
    ensure_can_modify(caps, &order)?;

    let row = confirm_fetched(&mut *conn, &order, row).await?;

    if order.is_flex_order && kind.is_cashflow() {
        match kind {
            SubLedgerKind::Receipt => flex::reconcile_receipt(&mut *conn, order.id).await?,
            SubLedgerKind::Payment => flex::reconcile_payment(&mut *conn, order.id).await?,
            _ => unreachable!(),
        }
    }

    Ok(row)
}

/// Confirmation core, shared with the completion cascade (which has already
/// fetched the order and rows).
pub(crate) async fn confirm_fetched(
    conn: &mut PgConnection,
    order: &OrderRow,
    mut row: SubLedgerRow,
) -> DeskResult<SubLedgerRow> {
    if row.status != SubLedgerStatus::Draft {
        return Err(DeskError::invalid_state(format!(
            "{} {} is already {}",
            row.kind.as_str(),
            row.id,
            row.status.as_str()
        )));
    }
    let account_id = row.account_id.ok_or_else(|| {
        DeskError::invalid_argument(format!(
            "{} {} has no account to post against",
            row.kind.as_str(),
            row.id
        ))
    })?;
    validate_amount(row.kind, row.amount)?;

    subledger::set_sub_ledger_status(&mut *conn, row.kind, row.id, SubLedgerStatus::Confirmed)
        .await
        .map_err(fxd_db::translate_db_error)?;

    let direction = row.kind.confirm_direction(row.amount);
    let description = posting_description(order.order_no, row.kind, row.amount);
    fxd_ledger::post_entry(
        &mut *conn,
        account_id,
        direction,
        row.amount.abs(),
        &description,
    )
    .await?;

    row.status = SubLedgerStatus::Confirmed;
    Ok(row)
}

/// `Order #<n> - <fragment>` — the ledger description for a confirmation.
pub fn posting_description(order_no: i64, kind: SubLedgerKind, amount: f64) -> String {
    format!("Order #{order_no} - {}", kind.description_fragment(amount))
}

/// `Order #<n> - Reversal: <fragment>` — the description of an
/// equal-and-opposite undo posting.
pub fn reversal_description(order_no: i64, kind: SubLedgerKind, amount: f64) -> String {
    format!(
        "Order #{order_no} - Reversal: {}",
        kind.description_fragment(amount)
    )
}

// ---------------------------------------------------------------------------
// Replace pattern (single draft row per kind)
// ---------------------------------------------------------------------------

/// Replace the single draft profit/service-charge row for an order:
/// delete all drafts of the kind, insert the new one. Keeps exactly one
/// draft row per kind per order at all times.
pub async fn replace_draft(
    conn: &mut PgConnection,
    order_id: Uuid,
    kind: SubLedgerKind,
    account_id: Option<Uuid>,
    amount: f64,
    currency_code: Option<String>,
) -> DeskResult<SubLedgerRow> {
    subledger::delete_sub_ledger_rows_by_status(
        &mut *conn,
        kind,
        order_id,
        SubLedgerStatus::Draft,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    subledger::insert_sub_ledger_row(
        &mut *conn,
        kind,
        &NewSubLedgerRow {
            id: Uuid::new_v4(),
            order_id,
            account_id,
            amount,
            image_path: None,
            currency_code,
            status: SubLedgerStatus::Draft,
        },
    )
    .await
    .map_err(fxd_db::translate_db_error)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_row(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    id: Uuid,
) -> DeskResult<SubLedgerRow> {
    subledger::fetch_sub_ledger_row(&mut *conn, kind, id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("{} {id}", kind.as_str())))
}

async fn fetch_parent(conn: &mut PgConnection, row: &SubLedgerRow) -> DeskResult<OrderRow> {
    orders::fetch_order(&mut *conn, row.order_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("order {}", row.order_id)))
}

pub(crate) fn validate_amount(kind: SubLedgerKind, amount: f64) -> DeskResult<()> {
    if !amount.is_finite() {
        return Err(DeskError::invalid_argument("amount must be finite"));
    }
    match kind {
        // Service charge may be negative ("we pay"), but not zero.
        SubLedgerKind::ServiceCharge => {
            if amount == 0.0 {
                return Err(DeskError::invalid_argument(
                    "service charge amount must be non-zero",
                ));
            }
        }
        _ => {
            if amount <= 0.0 {
                return Err(DeskError::invalid_argument(format!(
                    "{} amount must be > 0",
                    kind.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// The account a receipt posts to must hold the order's from-currency; a
/// payment account must hold the to-currency.
async fn validate_account_leg(
    conn: &mut PgConnection,
    order: &OrderRow,
    kind: SubLedgerKind,
    account_id: Uuid,
) -> DeskResult<()> {
    let account = accounts::fetch_account(&mut *conn, account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {account_id}")))?;

    let expected = match kind {
        SubLedgerKind::Receipt => Some(order.from_currency.as_str()),
        SubLedgerKind::Payment => Some(order.to_currency.as_str()),
        // Profit and service charge carry their own currency.
        SubLedgerKind::Profit | SubLedgerKind::ServiceCharge => None,
    };

    if let Some(expected) = expected {
        if account.currency_code != expected {
            return Err(DeskError::invalid_argument(format!(
                "account {} holds {}, order leg is {}",
                account_id, account.currency_code, expected
            )));
        }
    }
    Ok(())
}
