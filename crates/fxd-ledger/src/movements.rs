//! Expense and transfer money movements.
//!
//! Both post to the ledger at creation time and are reversed with exact
//! equal-and-opposite entries when an approved delete removes them.

use sqlx::PgConnection;
use uuid::Uuid;

use fxd_db::{accounts, expenses, ExpenseRow, NewExpense, NewTransfer, TransferRow};
use fxd_schemas::{Capabilities, DeskError, DeskResult, EntryDirection};

use crate::{post_entry, reverse_entry};

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExpenseInput {
    pub account_id: Uuid,
    pub amount: f64,
    pub description: String,
}

/// Record an expense: one row, one `withdraw` posting.
pub async fn create_expense(
    conn: &mut PgConnection,
    caps: &Capabilities,
    input: ExpenseInput,
) -> DeskResult<ExpenseRow> {
    if input.description.trim().is_empty() {
        return Err(DeskError::invalid_argument("expense description is required"));
    }

    let expense = NewExpense {
        id: Uuid::new_v4(),
        account_id: input.account_id,
        amount: input.amount,
        description: input.description,
        created_by: caps.user_id,
    };

    // post_entry validates the amount and account before any mutation.
    post_entry(
        &mut *conn,
        expense.account_id,
        EntryDirection::Withdraw,
        expense.amount,
        &expense_description(&expense.description),
    )
    .await?;

    expenses::insert_expense(&mut *conn, &expense)
        .await
        .map_err(fxd_db::translate_db_error)?;

    expenses::fetch_expense(&mut *conn, expense.id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::storage("expense row vanished after insert"))
}

/// Reverse the posting an expense made at creation.
pub async fn reverse_expense_postings(
    conn: &mut PgConnection,
    expense: &ExpenseRow,
) -> DeskResult<()> {
    reverse_entry(
        &mut *conn,
        expense.account_id,
        EntryDirection::Withdraw,
        expense.amount,
        &format!("Reversal: {}", expense_description(&expense.description)),
    )
    .await
}

fn expense_description(description: &str) -> String {
    format!("Expense - {description}")
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransferInput {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_from: f64,
    pub amount_to: f64,
}

/// Move money between two internal accounts: `withdraw` from one, `add` to
/// the other. The two amounts may differ (cross-currency transfers).
pub async fn create_transfer(
    conn: &mut PgConnection,
    caps: &Capabilities,
    input: TransferInput,
) -> DeskResult<TransferRow> {
    if input.from_account_id == input.to_account_id {
        return Err(DeskError::invalid_argument(
            "transfer accounts must differ",
        ));
    }

    let from = accounts::fetch_account(&mut *conn, input.from_account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {}", input.from_account_id)))?;
    let to = accounts::fetch_account(&mut *conn, input.to_account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {}", input.to_account_id)))?;

    let transfer = NewTransfer {
        id: Uuid::new_v4(),
        from_account_id: input.from_account_id,
        to_account_id: input.to_account_id,
        amount_from: input.amount_from,
        amount_to: input.amount_to,
        created_by: caps.user_id,
    };

    post_entry(
        &mut *conn,
        transfer.from_account_id,
        EntryDirection::Withdraw,
        transfer.amount_from,
        &format!("Transfer to {}", to.name),
    )
    .await?;
    post_entry(
        &mut *conn,
        transfer.to_account_id,
        EntryDirection::Add,
        transfer.amount_to,
        &format!("Transfer from {}", from.name),
    )
    .await?;

    expenses::insert_transfer(&mut *conn, &transfer)
        .await
        .map_err(fxd_db::translate_db_error)?;

    expenses::fetch_transfer(&mut *conn, transfer.id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::storage("transfer row vanished after insert"))
}

/// Reverse both postings a transfer made at creation.
pub async fn reverse_transfer_postings(
    conn: &mut PgConnection,
    transfer: &TransferRow,
) -> DeskResult<()> {
    reverse_entry(
        &mut *conn,
        transfer.from_account_id,
        EntryDirection::Withdraw,
        transfer.amount_from,
        "Reversal: transfer out",
    )
    .await?;
    reverse_entry(
        &mut *conn,
        transfer.to_account_id,
        EntryDirection::Add,
        transfer.amount_to,
        "Reversal: transfer in",
    )
    .await
}
