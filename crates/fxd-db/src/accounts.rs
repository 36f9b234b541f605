//! Account rows and the append-only transaction log.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use fxd_schemas::EntryDirection;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub balance: f64,
}

fn decode_account(row: sqlx::postgres::PgRow) -> Result<AccountRow> {
    Ok(AccountRow {
        id: row.try_get("id").context("accounts.id")?,
        name: row.try_get("name").context("accounts.name")?,
        currency_code: row
            .try_get("currency_code")
            .context("accounts.currency_code")?,
        balance: row.try_get("balance").context("accounts.balance")?,
        created_at: row.try_get("created_at").context("accounts.created_at")?,
    })
}

pub async fn insert_account(conn: &mut PgConnection, account: &NewAccount) -> Result<()> {
    sqlx::query(
        r#"
        insert into accounts (id, name, currency_code, balance)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(account.id)
    .bind(&account.name)
    .bind(&account.currency_code)
    .bind(account.balance)
    .execute(conn)
    .await
    .context("insert_account failed")?;
    Ok(())
}

pub async fn fetch_account(conn: &mut PgConnection, id: Uuid) -> Result<Option<AccountRow>> {
    let row = sqlx::query(
        r#"
        select id, name, currency_code, balance, created_at
        from accounts
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("fetch_account failed")?;

    row.map(decode_account).transpose()
}

pub async fn list_accounts(conn: &mut PgConnection) -> Result<Vec<AccountRow>> {
    let rows = sqlx::query(
        r#"
        select id, name, currency_code, balance, created_at
        from accounts
        order by name asc, id asc
        "#,
    )
    .fetch_all(conn)
    .await
    .context("list_accounts failed")?;

    rows.into_iter().map(decode_account).collect()
}

/// Apply a signed delta to an account balance. Balances may go negative —
/// staff fronting funds is an accepted state, not an error.
pub async fn apply_balance_delta(conn: &mut PgConnection, id: Uuid, delta: f64) -> Result<()> {
    let res = sqlx::query(
        r#"
        update accounts
        set balance = balance + $2
        where id = $1
        "#,
    )
    .bind(id)
    .bind(delta)
    .execute(conn)
    .await
    .context("apply_balance_delta failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("apply_balance_delta: account {id} not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transaction log (append-only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccountTransactionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: EntryDirection,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccountTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: EntryDirection,
    pub amount: f64,
    pub description: String,
}

fn decode_account_tx(row: sqlx::postgres::PgRow) -> Result<AccountTransactionRow> {
    Ok(AccountTransactionRow {
        id: row.try_get("id").context("account_transactions.id")?,
        account_id: row
            .try_get("account_id")
            .context("account_transactions.account_id")?,
        direction: EntryDirection::parse(
            &row.try_get::<String, _>("direction")
                .context("account_transactions.direction")?,
        )?,
        amount: row
            .try_get("amount")
            .context("account_transactions.amount")?,
        description: row
            .try_get("description")
            .context("account_transactions.description")?,
        created_at: row
            .try_get("created_at")
            .context("account_transactions.created_at")?,
    })
}

/// Append one log row. Append-only semantics enforced at the app layer:
/// nothing in this crate updates or deletes from account_transactions.
pub async fn insert_account_transaction(
    conn: &mut PgConnection,
    tx_row: &NewAccountTransaction,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into account_transactions (id, account_id, direction, amount, description)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(tx_row.id)
    .bind(tx_row.account_id)
    .bind(tx_row.direction.as_str())
    .bind(tx_row.amount)
    .bind(&tx_row.description)
    .execute(conn)
    .await
    .context("insert_account_transaction failed")?;
    Ok(())
}

pub async fn list_account_transactions(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> Result<Vec<AccountTransactionRow>> {
    let rows = sqlx::query(
        r#"
        select id, account_id, direction, amount, description, created_at
        from account_transactions
        where account_id = $1
        order by created_at asc, id asc
        "#,
    )
    .bind(account_id)
    .fetch_all(conn)
    .await
    .context("list_account_transactions failed")?;

    rows.into_iter().map(decode_account_tx).collect()
}

/// Σ(signed amounts) over the whole log for one account.
pub async fn sum_signed_transactions(conn: &mut PgConnection, account_id: Uuid) -> Result<f64> {
    let (sum,): (Option<f64>,) = sqlx::query_as::<_, (Option<f64>,)>(
        r#"
        select sum(case direction when 'add' then amount else -amount end)
        from account_transactions
        where account_id = $1
        "#,
    )
    .bind(account_id)
    .fetch_one(conn)
    .await
    .context("sum_signed_transactions failed")?;

    Ok(sum.unwrap_or(0.0))
}
