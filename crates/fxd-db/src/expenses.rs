//! Expense and transfer rows.
//!
//! Both exist so the approval workflow's `expense`/`transfer` entity types
//! are real: creation posts to the ledger, approval-gated delete reverses.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub created_by: Uuid,
}

fn decode_expense(row: sqlx::postgres::PgRow) -> Result<ExpenseRow> {
    Ok(ExpenseRow {
        id: row.try_get("id").context("expenses.id")?,
        account_id: row.try_get("account_id").context("expenses.account_id")?,
        amount: row.try_get("amount").context("expenses.amount")?,
        description: row
            .try_get("description")
            .context("expenses.description")?,
        created_by: row.try_get("created_by").context("expenses.created_by")?,
        created_at: row.try_get("created_at").context("expenses.created_at")?,
    })
}

pub async fn insert_expense(conn: &mut PgConnection, expense: &NewExpense) -> Result<()> {
    sqlx::query(
        r#"
        insert into expenses (id, account_id, amount, description, created_by)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(expense.id)
    .bind(expense.account_id)
    .bind(expense.amount)
    .bind(&expense.description)
    .bind(expense.created_by)
    .execute(conn)
    .await
    .context("insert_expense failed")?;
    Ok(())
}

pub async fn fetch_expense(conn: &mut PgConnection, id: Uuid) -> Result<Option<ExpenseRow>> {
    let row = sqlx::query(
        r#"
        select id, account_id, amount, description, created_by, created_at
        from expenses
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("fetch_expense failed")?;

    row.map(decode_expense).transpose()
}

pub async fn update_expense(conn: &mut PgConnection, expense: &ExpenseRow) -> Result<()> {
    let res = sqlx::query(
        r#"
        update expenses
        set account_id = $2,
            amount = $3,
            description = $4
        where id = $1
        "#,
    )
    .bind(expense.id)
    .bind(expense.account_id)
    .bind(expense.amount)
    .bind(&expense.description)
    .execute(conn)
    .await
    .context("update_expense failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("update_expense: expense {} not found", expense.id));
    }
    Ok(())
}

pub async fn delete_expense(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    let res = sqlx::query("delete from expenses where id = $1")
        .bind(id)
        .execute(conn)
        .await
        .context("delete_expense failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("delete_expense: expense {id} not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransferRow {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_from: f64,
    pub amount_to: f64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_from: f64,
    pub amount_to: f64,
    pub created_by: Uuid,
}

fn decode_transfer(row: sqlx::postgres::PgRow) -> Result<TransferRow> {
    Ok(TransferRow {
        id: row.try_get("id").context("transfers.id")?,
        from_account_id: row
            .try_get("from_account_id")
            .context("transfers.from_account_id")?,
        to_account_id: row
            .try_get("to_account_id")
            .context("transfers.to_account_id")?,
        amount_from: row.try_get("amount_from").context("transfers.amount_from")?,
        amount_to: row.try_get("amount_to").context("transfers.amount_to")?,
        created_by: row.try_get("created_by").context("transfers.created_by")?,
        created_at: row.try_get("created_at").context("transfers.created_at")?,
    })
}

pub async fn insert_transfer(conn: &mut PgConnection, transfer: &NewTransfer) -> Result<()> {
    sqlx::query(
        r#"
        insert into transfers (id, from_account_id, to_account_id, amount_from, amount_to, created_by)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(transfer.id)
    .bind(transfer.from_account_id)
    .bind(transfer.to_account_id)
    .bind(transfer.amount_from)
    .bind(transfer.amount_to)
    .bind(transfer.created_by)
    .execute(conn)
    .await
    .context("insert_transfer failed")?;
    Ok(())
}

pub async fn fetch_transfer(conn: &mut PgConnection, id: Uuid) -> Result<Option<TransferRow>> {
    let row = sqlx::query(
        r#"
        select id, from_account_id, to_account_id, amount_from, amount_to, created_by, created_at
        from transfers
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("fetch_transfer failed")?;

    row.map(decode_transfer).transpose()
}

pub async fn update_transfer(conn: &mut PgConnection, transfer: &TransferRow) -> Result<()> {
    let res = sqlx::query(
        r#"
        update transfers
        set amount_from = $2,
            amount_to = $3
        where id = $1
        "#,
    )
    .bind(transfer.id)
    .bind(transfer.amount_from)
    .bind(transfer.amount_to)
    .execute(conn)
    .await
    .context("update_transfer failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!(
            "update_transfer: transfer {} not found",
            transfer.id
        ));
    }
    Ok(())
}

pub async fn delete_transfer(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    let res = sqlx::query("delete from transfers where id = $1")
        .bind(id)
        .execute(conn)
        .await
        .context("delete_transfer failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("delete_transfer: transfer {id} not found"));
    }
    Ok(())
}
