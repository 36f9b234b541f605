//! Reference data consumed by the core: currency rates, users
//! (capability resolution), customers (existence checks).
//!
//! CRUD for these resources lives outside this service; only the reads the
//! ledger core needs — plus seed inserts for tests — are provided.

use anyhow::{Context, Result};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use fxd_rates::LegRates;
use fxd_schemas::Capabilities;

// ---------------------------------------------------------------------------
// Currencies
// ---------------------------------------------------------------------------

/// Table rate for one currency, `None` when not on file.
pub async fn currency_rate(conn: &mut PgConnection, code: &str) -> Result<Option<f64>> {
    let row = sqlx::query("select rate from currencies where code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await
        .context("currency_rate failed")?;

    row.map(|r| r.try_get::<f64, _>("rate").context("currencies.rate"))
        .transpose()
}

/// Both leg rates for a trade, in one call.
pub async fn leg_rates(
    conn: &mut PgConnection,
    from_currency: &str,
    to_currency: &str,
) -> Result<LegRates> {
    let from_rate = currency_rate(&mut *conn, from_currency).await?;
    let to_rate = currency_rate(&mut *conn, to_currency).await?;
    Ok(LegRates { from_rate, to_rate })
}

pub async fn upsert_currency(conn: &mut PgConnection, code: &str, rate: f64) -> Result<()> {
    sqlx::query(
        r#"
        insert into currencies (code, rate)
        values ($1, $2)
        on conflict (code) do update set rate = excluded.rate
        "#,
    )
    .bind(code)
    .bind(rate)
    .execute(conn)
    .await
    .context("upsert_currency failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Users / capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub display_name: String,
    pub is_admin: bool,
    pub can_request_edit: bool,
    pub can_request_delete: bool,
    pub can_approve_edit: bool,
    pub can_approve_delete: bool,
}

impl UserRow {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            user_id: self.id,
            is_admin: self.is_admin,
            can_request_edit: self.can_request_edit,
            can_request_delete: self.can_request_delete,
            can_approve_edit: self.can_approve_edit,
            can_approve_delete: self.can_approve_delete,
        }
    }
}

pub async fn insert_user(conn: &mut PgConnection, user: &UserRow) -> Result<()> {
    sqlx::query(
        r#"
        insert into users (
          id, display_name, is_admin,
          can_request_edit, can_request_delete,
          can_approve_edit, can_approve_delete
        ) values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user.id)
    .bind(&user.display_name)
    .bind(user.is_admin)
    .bind(user.can_request_edit)
    .bind(user.can_request_delete)
    .bind(user.can_approve_edit)
    .bind(user.can_approve_delete)
    .execute(conn)
    .await
    .context("insert_user failed")?;
    Ok(())
}

/// Resolve a user's capability set. Resolved once per request and passed
/// explicitly into the workflow layers; `None` when the actor is unknown.
pub async fn resolve_capabilities(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Capabilities>> {
    let row = sqlx::query(
        r#"
        select id, display_name, is_admin,
               can_request_edit, can_request_delete,
               can_approve_edit, can_approve_delete
        from users
        where id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .context("resolve_capabilities failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Capabilities {
        user_id: row.try_get("id").context("users.id")?,
        is_admin: row.try_get("is_admin").context("users.is_admin")?,
        can_request_edit: row
            .try_get("can_request_edit")
            .context("users.can_request_edit")?,
        can_request_delete: row
            .try_get("can_request_delete")
            .context("users.can_request_delete")?,
        can_approve_edit: row
            .try_get("can_approve_edit")
            .context("users.can_approve_edit")?,
        can_approve_delete: row
            .try_get("can_approve_delete")
            .context("users.can_approve_delete")?,
    }))
}

/// Users holding the approve capability for a request type — the audience
/// notified when a new approval request lands.
pub async fn list_approvers(
    conn: &mut PgConnection,
    request_type: fxd_schemas::RequestType,
) -> Result<Vec<Uuid>> {
    let column = match request_type {
        fxd_schemas::RequestType::Edit => "can_approve_edit",
        fxd_schemas::RequestType::Delete => "can_approve_delete",
    };
    let sql = format!("select id from users where is_admin or {column} order by id");

    let rows = sqlx::query(&sql)
        .fetch_all(conn)
        .await
        .context("list_approvers failed")?;

    rows.into_iter()
        .map(|r| r.try_get::<Uuid, _>("id").context("users.id"))
        .collect()
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

pub async fn insert_customer(conn: &mut PgConnection, id: Uuid, name: &str) -> Result<()> {
    sqlx::query("insert into customers (id, name) values ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(conn)
        .await
        .context("insert_customer failed")?;
    Ok(())
}

pub async fn customer_exists(conn: &mut PgConnection, id: Uuid) -> Result<bool> {
    let (exists,): (bool,) =
        sqlx::query_as::<_, (bool,)>("select exists (select 1 from customers where id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await
            .context("customer_exists failed")?;
    Ok(exists)
}
