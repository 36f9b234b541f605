//! Approval request rows.
//!
//! The at-most-one-pending invariant is owned by the partial unique index
//! `uq_approval_pending`; [`insert_approval_request`] surfaces that
//! violation to the caller for translation into a domain `Conflict`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use fxd_schemas::{ApprovalStatus, EntityType, RequestType};

#[derive(Debug, Clone)]
pub struct ApprovalRequestRow {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub requested_by: Uuid,
    pub reason: String,
    pub request_data: Option<Value>,
    pub original_entity_data: Value,
    pub status: ApprovalStatus,
    pub approved_by: Option<Uuid>,
    pub rejected_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewApprovalRequest {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub requested_by: Uuid,
    pub reason: String,
    pub request_data: Option<Value>,
    pub original_entity_data: Value,
}

/// Optional listing filters (all conjunctive).
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
}

const APPROVAL_COLUMNS: &str = r#"
    id, entity_type, entity_id, request_type, requested_by, reason,
    request_data, original_entity_data, status,
    approved_by, rejected_by, rejection_reason, created_at, resolved_at
"#;

fn decode_request(row: sqlx::postgres::PgRow) -> Result<ApprovalRequestRow> {
    Ok(ApprovalRequestRow {
        id: row.try_get("id").context("approval_requests.id")?,
        entity_type: EntityType::parse(
            &row.try_get::<String, _>("entity_type")
                .context("approval_requests.entity_type")?,
        )?,
        entity_id: row
            .try_get("entity_id")
            .context("approval_requests.entity_id")?,
        request_type: RequestType::parse(
            &row.try_get::<String, _>("request_type")
                .context("approval_requests.request_type")?,
        )?,
        requested_by: row
            .try_get("requested_by")
            .context("approval_requests.requested_by")?,
        reason: row.try_get("reason").context("approval_requests.reason")?,
        request_data: row
            .try_get("request_data")
            .context("approval_requests.request_data")?,
        original_entity_data: row
            .try_get("original_entity_data")
            .context("approval_requests.original_entity_data")?,
        status: ApprovalStatus::parse(
            &row.try_get::<String, _>("status")
                .context("approval_requests.status")?,
        )?,
        approved_by: row
            .try_get("approved_by")
            .context("approval_requests.approved_by")?,
        rejected_by: row
            .try_get("rejected_by")
            .context("approval_requests.rejected_by")?,
        rejection_reason: row
            .try_get("rejection_reason")
            .context("approval_requests.rejection_reason")?,
        created_at: row
            .try_get("created_at")
            .context("approval_requests.created_at")?,
        resolved_at: row
            .try_get("resolved_at")
            .context("approval_requests.resolved_at")?,
    })
}

/// Insert a pending request. A `uq_approval_pending` violation propagates
/// as-is; callers translate it to `Conflict`.
pub async fn insert_approval_request(
    conn: &mut PgConnection,
    req: &NewApprovalRequest,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into approval_requests (
          id, entity_type, entity_id, request_type, requested_by, reason,
          request_data, original_entity_data, status
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, 'pending'
        )
        "#,
    )
    .bind(req.id)
    .bind(req.entity_type.as_str())
    .bind(req.entity_id)
    .bind(req.request_type.as_str())
    .bind(req.requested_by)
    .bind(&req.reason)
    .bind(&req.request_data)
    .bind(&req.original_entity_data)
    .execute(conn)
    .await
    .context("insert_approval_request failed")?;
    Ok(())
}

pub async fn fetch_approval_request(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<ApprovalRequestRow>> {
    let sql = format!("select {APPROVAL_COLUMNS} from approval_requests where id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("fetch_approval_request failed")?;

    row.map(decode_request).transpose()
}

/// The pending request for an entity, if one exists.
pub async fn find_pending_request(
    conn: &mut PgConnection,
    entity_type: EntityType,
    entity_id: Uuid,
) -> Result<Option<ApprovalRequestRow>> {
    let sql = format!(
        r#"
        select {APPROVAL_COLUMNS}
        from approval_requests
        where entity_type = $1 and entity_id = $2 and status = 'pending'
        "#
    );

    let row = sqlx::query(&sql)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(conn)
        .await
        .context("find_pending_request failed")?;

    row.map(decode_request).transpose()
}

pub async fn list_approval_requests(
    conn: &mut PgConnection,
    filter: &ApprovalFilter,
) -> Result<Vec<ApprovalRequestRow>> {
    let sql = format!(
        r#"
        select {APPROVAL_COLUMNS}
        from approval_requests
        where ($1::text is null or status = $1)
          and ($2::text is null or entity_type = $2)
          and ($3::uuid is null or entity_id = $3)
        order by created_at desc, id desc
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.entity_type.map(|t| t.as_str()))
        .bind(filter.entity_id)
        .fetch_all(conn)
        .await
        .context("list_approval_requests failed")?;

    rows.into_iter().map(decode_request).collect()
}

/// Terminal transition: pending → approved | rejected. Stamps the resolver
/// column matching the outcome and `resolved_at`.
pub async fn resolve_approval_request(
    conn: &mut PgConnection,
    id: Uuid,
    outcome: ApprovalStatus,
    resolver: Uuid,
    rejection_reason: Option<&str>,
) -> Result<()> {
    let res = match outcome {
        ApprovalStatus::Approved => sqlx::query(
            r#"
            update approval_requests
            set status = 'approved',
                approved_by = $2,
                resolved_at = now()
            where id = $1 and status = 'pending'
            "#,
        )
        .bind(id)
        .bind(resolver)
        .execute(conn)
        .await
        .context("resolve_approval_request (approve) failed")?,
        ApprovalStatus::Rejected => sqlx::query(
            r#"
            update approval_requests
            set status = 'rejected',
                rejected_by = $2,
                rejection_reason = $3,
                resolved_at = now()
            where id = $1 and status = 'pending'
            "#,
        )
        .bind(id)
        .bind(resolver)
        .bind(rejection_reason)
        .execute(conn)
        .await
        .context("resolve_approval_request (reject) failed")?,
        ApprovalStatus::Pending => {
            return Err(anyhow!("resolve_approval_request: pending is not an outcome"))
        }
    };

    if res.rows_affected() != 1 {
        return Err(anyhow!(
            "resolve_approval_request: request {id} not pending"
        ));
    }
    Ok(())
}
