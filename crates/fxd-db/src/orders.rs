//! Order rows.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use fxd_schemas::{OrderStatus, OrderType};

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: Uuid,
    /// Human-facing serial used in ledger descriptions ("Order #123 - ...").
    pub order_no: i64,
    pub customer_id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    pub amount_buy: f64,
    pub amount_sell: f64,
    pub rate: f64,
    pub actual_amount_buy: Option<f64>,
    pub actual_amount_sell: Option<f64>,
    pub actual_rate: Option<f64>,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub is_flex_order: bool,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub handler_id: Option<Uuid>,
    pub created_by: Uuid,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Rate in effect for flex reconciliation: the adjusted actual rate when
    /// one has been set, the original order rate otherwise.
    pub fn effective_rate(&self) -> f64 {
        self.actual_rate.unwrap_or(self.rate)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
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
    pub created_by: Uuid,
    pub remarks: Option<String>,
}

const ORDER_COLUMNS: &str = r#"
    id, order_no, customer_id, from_currency, to_currency,
    amount_buy, amount_sell, rate,
    actual_amount_buy, actual_amount_sell, actual_rate,
    status, order_type, is_flex_order,
    buy_account_id, sell_account_id, handler_id, created_by, remarks,
    created_at, updated_at
"#;

fn decode_order(row: sqlx::postgres::PgRow) -> Result<OrderRow> {
    Ok(OrderRow {
        id: row.try_get("id").context("orders.id")?,
        order_no: row.try_get("order_no").context("orders.order_no")?,
        customer_id: row.try_get("customer_id").context("orders.customer_id")?,
        from_currency: row
            .try_get("from_currency")
            .context("orders.from_currency")?,
        to_currency: row.try_get("to_currency").context("orders.to_currency")?,
        amount_buy: row.try_get("amount_buy").context("orders.amount_buy")?,
        amount_sell: row.try_get("amount_sell").context("orders.amount_sell")?,
        rate: row.try_get("rate").context("orders.rate")?,
        actual_amount_buy: row
            .try_get("actual_amount_buy")
            .context("orders.actual_amount_buy")?,
        actual_amount_sell: row
            .try_get("actual_amount_sell")
            .context("orders.actual_amount_sell")?,
        actual_rate: row.try_get("actual_rate").context("orders.actual_rate")?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status").context("orders.status")?)?,
        order_type: OrderType::parse(
            &row.try_get::<String, _>("order_type")
                .context("orders.order_type")?,
        )?,
        is_flex_order: row
            .try_get("is_flex_order")
            .context("orders.is_flex_order")?,
        buy_account_id: row
            .try_get("buy_account_id")
            .context("orders.buy_account_id")?,
        sell_account_id: row
            .try_get("sell_account_id")
            .context("orders.sell_account_id")?,
        handler_id: row.try_get("handler_id").context("orders.handler_id")?,
        created_by: row.try_get("created_by").context("orders.created_by")?,
        remarks: row.try_get("remarks").context("orders.remarks")?,
        created_at: row.try_get("created_at").context("orders.created_at")?,
        updated_at: row.try_get("updated_at").context("orders.updated_at")?,
    })
}

/// Insert a new order and return the stored row (with its serial order_no).
pub async fn insert_order(conn: &mut PgConnection, order: &NewOrder) -> Result<OrderRow> {
    let sql = format!(
        r#"
        insert into orders (
          id, customer_id, from_currency, to_currency,
          amount_buy, amount_sell, rate,
          status, order_type, is_flex_order,
          buy_account_id, sell_account_id, handler_id, created_by, remarks
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
        )
        returning {ORDER_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(order.id)
        .bind(order.customer_id)
        .bind(&order.from_currency)
        .bind(&order.to_currency)
        .bind(order.amount_buy)
        .bind(order.amount_sell)
        .bind(order.rate)
        .bind(order.status.as_str())
        .bind(order.order_type.as_str())
        .bind(order.is_flex_order)
        .bind(order.buy_account_id)
        .bind(order.sell_account_id)
        .bind(order.handler_id)
        .bind(order.created_by)
        .bind(&order.remarks)
        .fetch_one(conn)
        .await
        .context("insert_order failed")?;

    decode_order(row)
}

pub async fn fetch_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderRow>> {
    let sql = format!("select {ORDER_COLUMNS} from orders where id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("fetch_order failed")?;

    row.map(decode_order).transpose()
}

pub async fn list_orders(
    conn: &mut PgConnection,
    status: Option<OrderStatus>,
) -> Result<Vec<OrderRow>> {
    let rows = if let Some(status) = status {
        let sql = format!(
            "select {ORDER_COLUMNS} from orders where status = $1 order by created_at desc, order_no desc"
        );
        sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(conn)
            .await
            .context("list_orders failed")?
    } else {
        let sql =
            format!("select {ORDER_COLUMNS} from orders order by created_at desc, order_no desc");
        sqlx::query(&sql)
            .fetch_all(conn)
            .await
            .context("list_orders failed")?
    };

    rows.into_iter().map(decode_order).collect()
}

/// Write back every mutable column of an order row.
///
/// The lifecycle layer loads the row, applies its policy-checked patch in
/// memory, and persists the whole row in one statement — no per-field
/// dynamic SQL.
pub async fn update_order_row(conn: &mut PgConnection, order: &OrderRow) -> Result<()> {
    let res = sqlx::query(
        r#"
        update orders
        set customer_id = $2,
            from_currency = $3,
            to_currency = $4,
            amount_buy = $5,
            amount_sell = $6,
            rate = $7,
            actual_amount_buy = $8,
            actual_amount_sell = $9,
            actual_rate = $10,
            status = $11,
            order_type = $12,
            is_flex_order = $13,
            buy_account_id = $14,
            sell_account_id = $15,
            handler_id = $16,
            remarks = $17,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.customer_id)
    .bind(&order.from_currency)
    .bind(&order.to_currency)
    .bind(order.amount_buy)
    .bind(order.amount_sell)
    .bind(order.rate)
    .bind(order.actual_amount_buy)
    .bind(order.actual_amount_sell)
    .bind(order.actual_rate)
    .bind(order.status.as_str())
    .bind(order.order_type.as_str())
    .bind(order.is_flex_order)
    .bind(order.buy_account_id)
    .bind(order.sell_account_id)
    .bind(order.handler_id)
    .bind(&order.remarks)
    .execute(conn)
    .await
    .context("update_order_row failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("update_order_row: order {} not found", order.id));
    }
    Ok(())
}

pub async fn update_order_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: OrderStatus,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update orders
        set status = $2,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .execute(conn)
    .await
    .context("update_order_status failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("update_order_status: order {id} not found"));
    }
    Ok(())
}

/// Persist flex reconciliation results. No status change.
pub async fn update_order_actuals(
    conn: &mut PgConnection,
    id: Uuid,
    actual_amount_buy: Option<f64>,
    actual_amount_sell: Option<f64>,
    actual_rate: Option<f64>,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update orders
        set actual_amount_buy = $2,
            actual_amount_sell = $3,
            actual_rate = $4,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(actual_amount_buy)
    .bind(actual_amount_sell)
    .bind(actual_rate)
    .execute(conn)
    .await
    .context("update_order_actuals failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("update_order_actuals: order {id} not found"));
    }
    Ok(())
}

/// Hard-delete an order row; sub-ledger rows go with it (FK cascade).
pub async fn delete_order(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    let res = sqlx::query("delete from orders where id = $1")
        .bind(id)
        .execute(conn)
        .await
        .context("delete_order failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("delete_order: order {id} not found"));
    }
    Ok(())
}
