//! Request / approve / reject workflow for mutating finalized records.
//!
//! A non-privileged actor files a request; a privileged approver later
//! applies or discards it against the immutable snapshot captured at
//! request time. All request-side and approve-side validation happens
//! before any mutation, and every apply/reverse cascade runs on the
//! caller's open transaction.
//!
//! Notifications are returned as [`Notice`]s, dispatched by the HTTP layer
//! after commit so fan-out can never fail or delay the transaction.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use fxd_artifacts::FileStore;
use fxd_db::{
    approvals, expenses, orders, reference, ApprovalRequestRow, NewApprovalRequest,
};
use fxd_ledger::movements;
use fxd_notify::Notice;
use fxd_schemas::{
    ApprovalStatus, Capabilities, DeskError, DeskResult, EntityRef, EntityType, OrderStatus,
    RequestType,
};

use crate::amendment::{apply_order_edit, OrderAmendment};
use crate::snapshot::capture_snapshot;

// ---------------------------------------------------------------------------
// Inputs / outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub reason: String,
    pub request_data: Option<Value>,
}

/// Result of an approve/reject: the terminal request row, notifications to
/// dispatch after commit, and stored files to clean up best-effort.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub request: ApprovalRequestRow,
    pub notices: Vec<Notice>,
    pub removed_files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

pub async fn create_request(
    conn: &mut PgConnection,
    caps: &Capabilities,
    files: &FileStore,
    input: CreateRequestInput,
) -> DeskResult<(ApprovalRequestRow, Vec<Notice>)> {
    if !caps.can_request(input.request_type) {
        return Err(DeskError::forbidden(format!(
            "user {} lacks the request-{} capability",
            caps.user_id,
            input.request_type.as_str()
        )));
    }
    if input.request_type == RequestType::Edit {
        let Some(data) = &input.request_data else {
            return Err(DeskError::invalid_argument(
                "edit requests must carry request_data",
            ));
        };
        // Surface malformed payloads at request time, not at approval time.
        if input.entity_type == EntityType::Order {
            OrderAmendment::parse(data)?;
        }
    }
    if input.reason.trim().is_empty() {
        return Err(DeskError::invalid_argument("a reason is required"));
    }

    // Snapshot before any status flip: later reads of "original" data must
    // never reflect in-flight edits. Also proves the entity exists.
    let original = capture_snapshot(&mut *conn, files, input.entity_type, input.entity_id).await?;

    if approvals::find_pending_request(&mut *conn, input.entity_type, input.entity_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .is_some()
    {
        return Err(DeskError::conflict(format!(
            "a pending request already exists for {} {}",
            input.entity_type.as_str(),
            input.entity_id
        )));
    }

    let request_id = Uuid::new_v4();
    approvals::insert_approval_request(
        &mut *conn,
        &NewApprovalRequest {
            id: request_id,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            request_type: input.request_type,
            requested_by: caps.user_id,
            reason: input.reason.clone(),
            request_data: input.request_data.clone(),
            original_entity_data: original,
        },
    )
    .await
    // The partial unique index backstops the lookup above under
    // concurrent creates; the violation surfaces as Conflict.
    .map_err(fxd_db::translate_db_error)?;

    // Park a completed order behind the approval gate.
    if input.entity_type == EntityType::Order {
        let order = orders::fetch_order(&mut *conn, input.entity_id)
            .await
            .map_err(fxd_db::translate_db_error)?
            .ok_or_else(|| DeskError::not_found(format!("order {}", input.entity_id)))?;
        if order.status == OrderStatus::Completed {
            orders::update_order_status(
                &mut *conn,
                order.id,
                input.request_type.hold_status(),
            )
            .await
            .map_err(fxd_db::translate_db_error)?;
        }
    }

    let request = fetch_request(&mut *conn, request_id).await?;

    let approvers = reference::list_approvers(&mut *conn, input.request_type)
        .await
        .map_err(fxd_db::translate_db_error)?;
    let notices = vec![Notice {
        recipients: approvers,
        kind: "approval_requested".to_string(),
        title: format!(
            "{} {} requested",
            input.entity_type.as_str(),
            input.request_type.as_str()
        ),
        message: input.reason,
        entity: EntityRef {
            entity_type: input.entity_type,
            entity_id: input.entity_id,
        },
    }];

    info!(
        request = %request_id,
        entity = input.entity_type.as_str(),
        kind = input.request_type.as_str(),
        "approval request created"
    );
    Ok((request, notices))
}

// ---------------------------------------------------------------------------
// Approve
// ---------------------------------------------------------------------------

pub async fn approve(
    conn: &mut PgConnection,
    caps: &Capabilities,
    request_id: Uuid,
) -> DeskResult<WorkflowOutcome> {
    let request = fetch_pending(&mut *conn, request_id).await?;
    if !caps.can_approve(request.request_type) {
        return Err(DeskError::forbidden(format!(
            "user {} lacks the approve-{} capability",
            caps.user_id,
            request.request_type.as_str()
        )));
    }

    let removed_files = match (request.entity_type, request.request_type) {
        (EntityType::Order, RequestType::Delete) => {
            let order = fetch_order(&mut *conn, request.entity_id).await?;
            let files = fxd_orders::reverse_order_postings(&mut *conn, &order).await?;
            orders::delete_order(&mut *conn, order.id)
                .await
                .map_err(fxd_db::translate_db_error)?;
            files
        }
        (EntityType::Order, RequestType::Edit) => {
            let data = request.request_data.as_ref().ok_or_else(|| {
                DeskError::invalid_argument("edit request carries no request_data")
            })?;
            let amendment = OrderAmendment::parse(data)?;
            let order = fetch_order(&mut *conn, request.entity_id).await?;
            apply_order_edit(&mut *conn, order, &amendment).await?
        }
        (EntityType::Expense, RequestType::Delete) => {
            let expense = fetch_expense(&mut *conn, request.entity_id).await?;
            movements::reverse_expense_postings(&mut *conn, &expense).await?;
            expenses::delete_expense(&mut *conn, expense.id)
                .await
                .map_err(fxd_db::translate_db_error)?;
            Vec::new()
        }
        (EntityType::Expense, RequestType::Edit) => {
            let data = request.request_data.as_ref().ok_or_else(|| {
                DeskError::invalid_argument("edit request carries no request_data")
            })?;
            apply_expense_edit(&mut *conn, request.entity_id, data).await?;
            Vec::new()
        }
        (EntityType::Transfer, RequestType::Delete) => {
            let transfer = fetch_transfer(&mut *conn, request.entity_id).await?;
            movements::reverse_transfer_postings(&mut *conn, &transfer).await?;
            expenses::delete_transfer(&mut *conn, transfer.id)
                .await
                .map_err(fxd_db::translate_db_error)?;
            Vec::new()
        }
        (EntityType::Transfer, RequestType::Edit) => {
            let data = request.request_data.as_ref().ok_or_else(|| {
                DeskError::invalid_argument("edit request carries no request_data")
            })?;
            apply_transfer_edit(&mut *conn, request.entity_id, data).await?;
            Vec::new()
        }
    };

    approvals::resolve_approval_request(
        &mut *conn,
        request.id,
        ApprovalStatus::Approved,
        caps.user_id,
        None,
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    let resolved = fetch_request(&mut *conn, request.id).await?;
    let notices = vec![requester_notice(&resolved, "approval_approved", "approved")];

    info!(request = %request.id, "approval request approved");
    Ok(WorkflowOutcome {
        request: resolved,
        notices,
        removed_files,
    })
}

// ---------------------------------------------------------------------------
// Reject
// ---------------------------------------------------------------------------

pub async fn reject(
    conn: &mut PgConnection,
    caps: &Capabilities,
    request_id: Uuid,
    reason: Option<String>,
) -> DeskResult<WorkflowOutcome> {
    let request = fetch_pending(&mut *conn, request_id).await?;
    if !caps.can_approve(request.request_type) {
        return Err(DeskError::forbidden(format!(
            "user {} lacks the approve-{} capability",
            caps.user_id,
            request.request_type.as_str()
        )));
    }

    // Release the approval hold.
    if request.entity_type == EntityType::Order {
        let order = orders::fetch_order(&mut *conn, request.entity_id)
            .await
            .map_err(fxd_db::translate_db_error)?;
        if let Some(order) = order {
            if order.status.is_approval_hold() {
                orders::update_order_status(&mut *conn, order.id, OrderStatus::Completed)
                    .await
                    .map_err(fxd_db::translate_db_error)?;
            }
        }
    }

    // Newly-uploaded images referenced by the discarded amendment are
    // orphans now; reused paths stay.
    let mut removed_files = Vec::new();
    if request.entity_type == EntityType::Order && request.request_type == RequestType::Edit {
        if let Some(data) = &request.request_data {
            if let Ok(amendment) = OrderAmendment::parse(data) {
                removed_files = amendment.fresh_image_paths();
            }
        }
    }

    approvals::resolve_approval_request(
        &mut *conn,
        request.id,
        ApprovalStatus::Rejected,
        caps.user_id,
        reason.as_deref(),
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    let resolved = fetch_request(&mut *conn, request.id).await?;
    let notices = vec![requester_notice(&resolved, "approval_rejected", "rejected")];

    info!(request = %request.id, "approval request rejected");
    Ok(WorkflowOutcome {
        request: resolved,
        notices,
        removed_files,
    })
}

// ---------------------------------------------------------------------------
// Expense / transfer edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ExpenseAmendment {
    account_id: Option<Uuid>,
    amount: Option<f64>,
    description: Option<String>,
}

async fn apply_expense_edit(
    conn: &mut PgConnection,
    expense_id: Uuid,
    data: &Value,
) -> DeskResult<()> {
    let amendment: ExpenseAmendment = serde_json::from_value(data.clone())
        .map_err(|e| DeskError::invalid_argument(format!("malformed request_data: {e}")))?;

    let mut expense = fetch_expense(&mut *conn, expense_id).await?;
    let money_changed = amendment.amount.is_some_and(|a| a != expense.amount)
        || amendment.account_id.is_some_and(|a| a != expense.account_id);

    if money_changed {
        movements::reverse_expense_postings(&mut *conn, &expense).await?;
    }
    if let Some(v) = amendment.account_id {
        expense.account_id = v;
    }
    if let Some(v) = amendment.amount {
        expense.amount = v;
    }
    if let Some(v) = amendment.description {
        expense.description = v;
    }
    if money_changed {
        fxd_ledger::post_entry(
            &mut *conn,
            expense.account_id,
            fxd_schemas::EntryDirection::Withdraw,
            expense.amount,
            &format!("Expense - {}", expense.description),
        )
        .await?;
    }

    expenses::update_expense(&mut *conn, &expense)
        .await
        .map_err(fxd_db::translate_db_error)
}

#[derive(Debug, Clone, Deserialize)]
struct TransferAmendment {
    amount_from: Option<f64>,
    amount_to: Option<f64>,
}

async fn apply_transfer_edit(
    conn: &mut PgConnection,
    transfer_id: Uuid,
    data: &Value,
) -> DeskResult<()> {
    let amendment: TransferAmendment = serde_json::from_value(data.clone())
        .map_err(|e| DeskError::invalid_argument(format!("malformed request_data: {e}")))?;

    let mut transfer = fetch_transfer(&mut *conn, transfer_id).await?;
    movements::reverse_transfer_postings(&mut *conn, &transfer).await?;

    if let Some(v) = amendment.amount_from {
        transfer.amount_from = v;
    }
    if let Some(v) = amendment.amount_to {
        transfer.amount_to = v;
    }

    fxd_ledger::post_entry(
        &mut *conn,
        transfer.from_account_id,
        fxd_schemas::EntryDirection::Withdraw,
        transfer.amount_from,
        "Transfer out (amended)",
    )
    .await?;
    fxd_ledger::post_entry(
        &mut *conn,
        transfer.to_account_id,
        fxd_schemas::EntryDirection::Add,
        transfer.amount_to,
        "Transfer in (amended)",
    )
    .await?;

    expenses::update_transfer(&mut *conn, &transfer)
        .await
        .map_err(fxd_db::translate_db_error)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_request(conn: &mut PgConnection, id: Uuid) -> DeskResult<ApprovalRequestRow> {
    approvals::fetch_approval_request(&mut *conn, id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("approval request {id}")))
}

/// A request that exists but is no longer pending reads as absent to the
/// approve/reject surface.
async fn fetch_pending(conn: &mut PgConnection, id: Uuid) -> DeskResult<ApprovalRequestRow> {
    let request = fetch_request(&mut *conn, id).await?;
    if request.status != ApprovalStatus::Pending {
        return Err(DeskError::not_found(format!(
            "approval request {id} is not pending"
        )));
    }
    Ok(request)
}

async fn fetch_order(conn: &mut PgConnection, id: Uuid) -> DeskResult<fxd_db::OrderRow> {
    orders::fetch_order(&mut *conn, id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("order {id}")))
}

async fn fetch_expense(conn: &mut PgConnection, id: Uuid) -> DeskResult<fxd_db::ExpenseRow> {
    expenses::fetch_expense(&mut *conn, id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("expense {id}")))
}

async fn fetch_transfer(conn: &mut PgConnection, id: Uuid) -> DeskResult<fxd_db::TransferRow> {
    expenses::fetch_transfer(&mut *conn, id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("transfer {id}")))
}

fn requester_notice(request: &ApprovalRequestRow, kind: &str, verb: &str) -> Notice {
    Notice {
        recipients: vec![request.requested_by],
        kind: kind.to_string(),
        title: format!(
            "{} {} request {verb}",
            request.entity_type.as_str(),
            request.request_type.as_str()
        ),
        message: request
            .rejection_reason
            .clone()
            .unwrap_or_else(|| request.reason.clone()),
        entity: EntityRef {
            entity_type: request.entity_type,
            entity_id: request.entity_id,
        },
    }
}
