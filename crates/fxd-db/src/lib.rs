//! Postgres access layer for FxDesk.
//!
//! All row types and SQL live here; domain crates (ledger, orders, approval)
//! orchestrate these primitives. Queries use `sqlx::query()` + `.bind()` —
//! no compile-time macros — and decode with `try_get` + `.context(...)`.
//!
//! Every function that participates in a business mutation takes
//! `&mut PgConnection` so callers can compose an arbitrary sequence of
//! statements inside one `sqlx::Transaction`. Pool-level conveniences
//! (connect, migrate, status) take `&PgPool`.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use fxd_schemas::DeskError;

pub mod accounts;
pub mod approvals;
pub mod expenses;
pub mod orders;
pub mod reference;
pub mod subledger;

pub use accounts::{AccountRow, AccountTransactionRow, NewAccount, NewAccountTransaction};
pub use approvals::{ApprovalFilter, ApprovalRequestRow, NewApprovalRequest};
pub use expenses::{ExpenseRow, NewExpense, NewTransfer, TransferRow};
pub use orders::{NewOrder, OrderRow};
pub use reference::UserRow;
pub use subledger::{NewSubLedgerRow, SubLedgerRow};

pub const ENV_DB_URL: &str = "FXD_DATABASE_URL";

/// Connect to Postgres using FXD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Count open approval requests. Used by CLI guardrails to prevent
/// migrating a database with in-flight approvals.
pub async fn count_pending_approvals(pool: &PgPool) -> Result<i64> {
    // If schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_orders_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from approval_requests
        where status = 'pending'
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_pending_approvals failed")?;

    Ok(n)
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                // Postgres unique_violation is 23505. Not always present, but helps.
                || db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// Translate a storage failure into the domain taxonomy.
///
/// Known constraint kinds become caller-visible domain errors; everything
/// else stays a generic `Storage` failure (surfaced as 5xx).
pub fn translate_db_error(err: anyhow::Error) -> DeskError {
    if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
        if let sqlx::Error::Database(db_err) = sqlx_err {
            if let Some(constraint) = db_err.constraint() {
                if constraint.starts_with("uq_") {
                    return DeskError::conflict(format!(
                        "duplicate violates constraint {constraint}"
                    ));
                }
                if constraint.starts_with("fk_") || constraint.starts_with("ck_") {
                    return DeskError::invalid_argument(format!(
                        "value violates constraint {constraint}"
                    ));
                }
            }
        }
    }
    DeskError::storage(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn translate_falls_back_to_storage_for_plain_errors() {
        let e = translate_db_error(anyhow!("network down"));
        assert_eq!(e.kind(), "storage");
    }
}
