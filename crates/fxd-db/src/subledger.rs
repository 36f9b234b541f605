//! Sub-ledger rows: receipts, payments, profit, service charge.
//!
//! The four tables share one uniform column set, so one row type and one
//! set of queries cover all kinds; [`SubLedgerKind`] selects the table.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use fxd_schemas::{SubLedgerKind, SubLedgerStatus};

#[derive(Debug, Clone)]
pub struct SubLedgerRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: SubLedgerKind,
    pub account_id: Option<Uuid>,
    pub amount: f64,
    /// Receipt/payment image attachment; null for profit/service charge.
    pub image_path: Option<String>,
    /// Profit/service-charge currency; null for receipts/payments.
    pub currency_code: Option<String>,
    pub status: SubLedgerStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubLedgerRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub account_id: Option<Uuid>,
    pub amount: f64,
    pub image_path: Option<String>,
    pub currency_code: Option<String>,
    pub status: SubLedgerStatus,
}

fn table(kind: SubLedgerKind) -> &'static str {
    match kind {
        SubLedgerKind::Receipt => "order_receipts",
        SubLedgerKind::Payment => "order_payments",
        SubLedgerKind::Profit => "order_profits",
        SubLedgerKind::ServiceCharge => "order_service_charges",
    }
}

fn decode_row(kind: SubLedgerKind, row: sqlx::postgres::PgRow) -> Result<SubLedgerRow> {
    let t = table(kind);
    Ok(SubLedgerRow {
        id: row.try_get("id").with_context(|| format!("{t}.id"))?,
        order_id: row
            .try_get("order_id")
            .with_context(|| format!("{t}.order_id"))?,
        kind,
        account_id: row
            .try_get("account_id")
            .with_context(|| format!("{t}.account_id"))?,
        amount: row
            .try_get("amount")
            .with_context(|| format!("{t}.amount"))?,
        image_path: row
            .try_get("image_path")
            .with_context(|| format!("{t}.image_path"))?,
        currency_code: row
            .try_get("currency_code")
            .with_context(|| format!("{t}.currency_code"))?,
        status: SubLedgerStatus::parse(
            &row.try_get::<String, _>("status")
                .with_context(|| format!("{t}.status"))?,
        )?,
        created_at: row
            .try_get("created_at")
            .with_context(|| format!("{t}.created_at"))?,
    })
}

pub async fn insert_sub_ledger_row(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    new_row: &NewSubLedgerRow,
) -> Result<SubLedgerRow> {
    let sql = format!(
        r#"
        insert into {} (id, order_id, account_id, amount, image_path, currency_code, status)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id, order_id, account_id, amount, image_path, currency_code, status, created_at
        "#,
        table(kind)
    );

    let row = sqlx::query(&sql)
        .bind(new_row.id)
        .bind(new_row.order_id)
        .bind(new_row.account_id)
        .bind(new_row.amount)
        .bind(&new_row.image_path)
        .bind(&new_row.currency_code)
        .bind(new_row.status.as_str())
        .fetch_one(conn)
        .await
        .with_context(|| format!("insert into {} failed", table(kind)))?;

    decode_row(kind, row)
}

pub async fn fetch_sub_ledger_row(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    id: Uuid,
) -> Result<Option<SubLedgerRow>> {
    let sql = format!(
        r#"
        select id, order_id, account_id, amount, image_path, currency_code, status, created_at
        from {}
        where id = $1
        "#,
        table(kind)
    );

    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("fetch from {} failed", table(kind)))?;

    row.map(|r| decode_row(kind, r)).transpose()
}

/// All rows of one kind for an order, oldest first. The "first confirmed
/// row" semantics of approval-edit adjustments rely on this ordering.
pub async fn list_sub_ledger_rows(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    order_id: Uuid,
) -> Result<Vec<SubLedgerRow>> {
    let sql = format!(
        r#"
        select id, order_id, account_id, amount, image_path, currency_code, status, created_at
        from {}
        where order_id = $1
        order by created_at asc, id asc
        "#,
        table(kind)
    );

    let rows = sqlx::query(&sql)
        .bind(order_id)
        .fetch_all(conn)
        .await
        .with_context(|| format!("list from {} failed", table(kind)))?;

    rows.into_iter().map(|r| decode_row(kind, r)).collect()
}

pub async fn list_sub_ledger_rows_by_status(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    order_id: Uuid,
    status: SubLedgerStatus,
) -> Result<Vec<SubLedgerRow>> {
    let sql = format!(
        r#"
        select id, order_id, account_id, amount, image_path, currency_code, status, created_at
        from {}
        where order_id = $1 and status = $2
        order by created_at asc, id asc
        "#,
        table(kind)
    );

    let rows = sqlx::query(&sql)
        .bind(order_id)
        .bind(status.as_str())
        .fetch_all(conn)
        .await
        .with_context(|| format!("list by status from {} failed", table(kind)))?;

    rows.into_iter().map(|r| decode_row(kind, r)).collect()
}

/// Update a draft row's mutable fields. Status changes go through
/// [`set_sub_ledger_status`].
pub async fn update_sub_ledger_row(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    row: &SubLedgerRow,
) -> Result<()> {
    let sql = format!(
        r#"
        update {}
        set account_id = $2,
            amount = $3,
            image_path = $4,
            currency_code = $5
        where id = $1
        "#,
        table(kind)
    );

    let res = sqlx::query(&sql)
        .bind(row.id)
        .bind(row.account_id)
        .bind(row.amount)
        .bind(&row.image_path)
        .bind(&row.currency_code)
        .execute(conn)
        .await
        .with_context(|| format!("update {} failed", table(kind)))?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("update {}: row {} not found", table(kind), row.id));
    }
    Ok(())
}

pub async fn set_sub_ledger_status(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    id: Uuid,
    status: SubLedgerStatus,
) -> Result<()> {
    let sql = format!("update {} set status = $2 where id = $1", table(kind));

    let res = sqlx::query(&sql)
        .bind(id)
        .bind(status.as_str())
        .execute(conn)
        .await
        .with_context(|| format!("set status on {} failed", table(kind)))?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("set status {}: row {id} not found", table(kind)));
    }
    Ok(())
}

pub async fn delete_sub_ledger_row(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    id: Uuid,
) -> Result<()> {
    let sql = format!("delete from {} where id = $1", table(kind));

    let res = sqlx::query(&sql)
        .bind(id)
        .execute(conn)
        .await
        .with_context(|| format!("delete from {} failed", table(kind)))?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("delete {}: row {id} not found", table(kind)));
    }
    Ok(())
}

/// Delete every row of a kind/status for an order (the "replace" pattern).
pub async fn delete_sub_ledger_rows_by_status(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    order_id: Uuid,
    status: SubLedgerStatus,
) -> Result<u64> {
    let sql = format!(
        "delete from {} where order_id = $1 and status = $2",
        table(kind)
    );

    let res = sqlx::query(&sql)
        .bind(order_id)
        .bind(status.as_str())
        .execute(conn)
        .await
        .with_context(|| format!("bulk delete from {} failed", table(kind)))?;

    Ok(res.rows_affected())
}

/// Σ(amount) of confirmed rows of one kind for an order.
pub async fn sum_confirmed(
    conn: &mut PgConnection,
    kind: SubLedgerKind,
    order_id: Uuid,
) -> Result<f64> {
    let sql = format!(
        "select sum(amount) from {} where order_id = $1 and status = 'confirmed'",
        table(kind)
    );

    let (sum,): (Option<f64>,) = sqlx::query_as::<_, (Option<f64>,)>(&sql)
        .bind(order_id)
        .fetch_one(conn)
        .await
        .with_context(|| format!("sum confirmed {} failed", table(kind)))?;

    Ok(sum.unwrap_or(0.0))
}

/// Does the order carry any confirmed receipt or payment? Used by the
/// completion transition to avoid double-posting.
pub async fn has_confirmed_cashflow(conn: &mut PgConnection, order_id: Uuid) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1 from order_receipts where order_id = $1 and status = 'confirmed'
            union all
            select 1 from order_payments where order_id = $1 and status = 'confirmed'
        )
        "#,
    )
    .bind(order_id)
    .fetch_one(conn)
    .await
    .context("has_confirmed_cashflow failed")?;

    Ok(exists)
}
