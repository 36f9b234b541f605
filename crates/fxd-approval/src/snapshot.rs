//! Immutable snapshots of entity state.
//!
//! A snapshot is captured **before** any status flip or mutation when an
//! approval request is created, so later reads of "original" data never
//! reflect in-flight edits. Sub-ledger rows are resolved — the confirmed
//! set when one exists, otherwise any drafts — and image references are
//! resolved to stable URLs.

use serde_json::{json, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use fxd_artifacts::FileStore;
use fxd_db::{expenses, orders, subledger, OrderRow, SubLedgerRow};
use fxd_schemas::{DeskError, DeskResult, EntityType, SubLedgerKind, SubLedgerStatus};

/// Capture the full original state of an entity as JSON.
pub async fn capture_snapshot(
    conn: &mut PgConnection,
    files: &FileStore,
    entity_type: EntityType,
    entity_id: Uuid,
) -> DeskResult<Value> {
    match entity_type {
        EntityType::Order => {
            let order = orders::fetch_order(&mut *conn, entity_id)
                .await
                .map_err(fxd_db::translate_db_error)?
                .ok_or_else(|| DeskError::not_found(format!("order {entity_id}")))?;
            order_snapshot(&mut *conn, files, &order).await
        }
        EntityType::Expense => {
            let expense = expenses::fetch_expense(&mut *conn, entity_id)
                .await
                .map_err(fxd_db::translate_db_error)?
                .ok_or_else(|| DeskError::not_found(format!("expense {entity_id}")))?;
            Ok(json!({
                "id": expense.id,
                "account_id": expense.account_id,
                "amount": expense.amount,
                "description": expense.description,
                "created_by": expense.created_by,
                "created_at": expense.created_at,
            }))
        }
        EntityType::Transfer => {
            let transfer = expenses::fetch_transfer(&mut *conn, entity_id)
                .await
                .map_err(fxd_db::translate_db_error)?
                .ok_or_else(|| DeskError::not_found(format!("transfer {entity_id}")))?;
            Ok(json!({
                "id": transfer.id,
                "from_account_id": transfer.from_account_id,
                "to_account_id": transfer.to_account_id,
                "amount_from": transfer.amount_from,
                "amount_to": transfer.amount_to,
                "created_by": transfer.created_by,
                "created_at": transfer.created_at,
            }))
        }
    }
}

async fn order_snapshot(
    conn: &mut PgConnection,
    files: &FileStore,
    order: &OrderRow,
) -> DeskResult<Value> {
    let mut sub_ledger = serde_json::Map::new();
    for kind in [
        SubLedgerKind::Receipt,
        SubLedgerKind::Payment,
        SubLedgerKind::Profit,
        SubLedgerKind::ServiceCharge,
    ] {
        let rows = subledger::list_sub_ledger_rows(&mut *conn, kind, order.id)
            .await
            .map_err(fxd_db::translate_db_error)?;
        let resolved = resolve_rows(rows);
        sub_ledger.insert(
            plural(kind).to_string(),
            Value::Array(resolved.iter().map(|r| row_json(files, r)).collect()),
        );
    }

    Ok(json!({
        "id": order.id,
        "order_no": order.order_no,
        "customer_id": order.customer_id,
        "from_currency": order.from_currency,
        "to_currency": order.to_currency,
        "amount_buy": order.amount_buy,
        "amount_sell": order.amount_sell,
        "rate": order.rate,
        "actual_amount_buy": order.actual_amount_buy,
        "actual_amount_sell": order.actual_amount_sell,
        "actual_rate": order.actual_rate,
        "status": order.status,
        "order_type": order.order_type,
        "is_flex_order": order.is_flex_order,
        "buy_account_id": order.buy_account_id,
        "sell_account_id": order.sell_account_id,
        "handler_id": order.handler_id,
        "created_by": order.created_by,
        "remarks": order.remarks,
        "created_at": order.created_at,
        "sub_ledger": Value::Object(sub_ledger),
    }))
}

/// Confirmed rows when any exist, falling back to drafts.
fn resolve_rows(rows: Vec<SubLedgerRow>) -> Vec<SubLedgerRow> {
    let has_confirmed = rows
        .iter()
        .any(|r| r.status == SubLedgerStatus::Confirmed);
    rows.into_iter()
        .filter(|r| {
            if has_confirmed {
                r.status == SubLedgerStatus::Confirmed
            } else {
                r.status == SubLedgerStatus::Draft
            }
        })
        .collect()
}

fn row_json(files: &FileStore, row: &SubLedgerRow) -> Value {
    json!({
        "id": row.id,
        "account_id": row.account_id,
        "amount": row.amount,
        "image_path": row.image_path,
        "image_url": row.image_path.as_deref().map(|p| files.resolve_url(p)),
        "currency_code": row.currency_code,
        "status": row.status,
        "created_at": row.created_at,
    })
}

fn plural(kind: SubLedgerKind) -> &'static str {
    match kind {
        SubLedgerKind::Receipt => "receipts",
        SubLedgerKind::Payment => "payments",
        SubLedgerKind::Profit => "profits",
        SubLedgerKind::ServiceCharge => "service_charges",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(status: SubLedgerStatus) -> SubLedgerRow {
        SubLedgerRow {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            kind: SubLedgerKind::Receipt,
            account_id: None,
            amount: 10.0,
            image_path: None,
            currency_code: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolve_prefers_confirmed_rows() {
        let resolved = resolve_rows(vec![
            row(SubLedgerStatus::Draft),
            row(SubLedgerStatus::Confirmed),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, SubLedgerStatus::Confirmed);
    }

    #[test]
    fn resolve_falls_back_to_drafts() {
        let resolved = resolve_rows(vec![row(SubLedgerStatus::Draft)]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, SubLedgerStatus::Draft);
    }
}
