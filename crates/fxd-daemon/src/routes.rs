//! Axum router and all HTTP handlers for fxd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! Every ledger-mutating handler follows one shape: resolve the actor's
//! capability set once, open one transaction, run the domain operation,
//! commit — then dispatch notifications and best-effort file cleanup. A
//! failure anywhere before commit rolls the whole request back.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post, put},
    Json, Router,
};
use base64::Engine as _;
use futures_util::{Stream, StreamExt};
use sqlx::PgConnection;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use fxd_approval::CreateRequestInput;
use fxd_db::{accounts, approvals, orders, reference, subledger, ApprovalFilter};
use fxd_ledger::movements;
use fxd_notify::Notice;
use fxd_orders::{CreateOrder, DraftInput, EarningPatch, OrderPatch};
use fxd_schemas::{Capabilities, DeskError, SubLedgerKind};

use crate::{
    api_types::*,
    error::{ApiError, ApiResult},
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/files", post(upload_file))
        .route("/v1/accounts", get(list_accounts))
        .route("/v1/accounts/:id/transactions", get(list_account_transactions))
        .route("/v1/orders", post(create_order).get(list_orders))
        .route(
            "/v1/orders/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/v1/orders/:id/status", patch(patch_order_status))
        .route("/v1/orders/:id/receipts", post(create_receipt))
        .route("/v1/orders/:id/payments", post(create_payment))
        .route(
            "/v1/orders/:id/proceed-with-partial-receipts",
            post(proceed_with_partial_receipts),
        )
        .route("/v1/orders/:id/adjust-flex-rate", post(adjust_flex_rate))
        .route("/v1/receipts/:id", put(update_receipt).delete(delete_receipt))
        .route("/v1/receipts/:id/confirm", post(confirm_receipt))
        .route("/v1/payments/:id", put(update_payment).delete(delete_payment))
        .route("/v1/payments/:id/confirm", post(confirm_payment))
        .route("/v1/profits/:id", put(update_profit).delete(delete_profit))
        .route("/v1/profits/:id/confirm", post(confirm_profit))
        .route(
            "/v1/service-charges/:id",
            put(update_service_charge).delete(delete_service_charge),
        )
        .route("/v1/service-charges/:id/confirm", post(confirm_service_charge))
        .route("/v1/expenses", post(create_expense))
        .route("/v1/transfers", post(create_transfer))
        .route(
            "/v1/approval-requests",
            post(create_approval_request).get(list_approval_requests),
        )
        .route("/v1/approval-requests/:id", get(get_approval_request))
        .route("/v1/approval-requests/:id/approve", post(approve_request))
        .route("/v1/approval-requests/:id/reject", post(reject_request))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Header carrying the upstream-authenticated actor id.
pub const ACTOR_HEADER: &str = "x-actor-id";

fn actor_id(headers: &HeaderMap) -> ApiResult<Uuid> {
    let raw = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::from(DeskError::invalid_argument(format!(
                "missing {ACTOR_HEADER} header"
            )))
        })?;
    raw.parse().map_err(|_| {
        ApiError::from(DeskError::invalid_argument(format!(
            "{ACTOR_HEADER} is not a uuid"
        )))
    })
}

/// Resolve the actor's capability set once per request (passed explicitly
/// into every domain call).
async fn caps_for(conn: &mut PgConnection, actor: Uuid) -> ApiResult<Capabilities> {
    reference::resolve_capabilities(conn, actor)
        .await
        .map_err(db_err)?
        .ok_or_else(|| ApiError::from(DeskError::forbidden(format!("unknown actor {actor}"))))
}

fn db_err(err: anyhow::Error) -> ApiError {
    ApiError::from(fxd_db::translate_db_error(err))
}

/// Post-commit side effects: notifications and best-effort file cleanup.
fn finish(state: &AppState, notices: Vec<Notice>, removed_files: Vec<String>) {
    for notice in notices {
        state.hub.send_notice(notice);
    }
    for path in removed_files {
        state.files.delete_quiet(&path);
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health, /v1/status — service metadata
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let db = fxd_db::status(&st.pool).await;
    let (db_ok, has_schema) = match db {
        Ok(s) => (s.ok, s.has_orders_table),
        Err(_) => (false, false),
    };

    (
        StatusCode::OK,
        Json(StatusResponse {
            ok: db_ok,
            db_ok,
            has_schema,
            daemon_uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream — SSE notification feed
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.hub.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: tokio::sync::broadcast::Receiver<fxd_notify::Notification>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(n) => {
                let data = serde_json::to_string(&n).ok()?;
                Some(Ok(Event::default().event("notification").data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// POST /v1/files — attachment upload (outside any DB transaction)
// ---------------------------------------------------------------------------

pub(crate) async fn upload_file(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FileUploadRequest>,
) -> ApiResult<impl IntoResponse> {
    // Uploads need a known actor but no particular capability.
    let actor = actor_id(&headers)?;
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    caps_for(&mut conn, actor).await?;
    drop(conn);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body.data_base64.as_bytes())
        .map_err(|_| ApiError::from(DeskError::invalid_argument("data_base64 is not base64")))?;

    let path = st
        .files
        .save(&bytes, &body.ext)
        .map_err(|e| ApiError::from(DeskError::storage(e)))?;
    let url = st.files.resolve_url(&path);

    Ok((StatusCode::CREATED, Json(FileUploadResponse { path, url })))
}

// ---------------------------------------------------------------------------
// Accounts (read-only)
// ---------------------------------------------------------------------------

pub(crate) async fn list_accounts(
    State(st): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    let rows = accounts::list_accounts(&mut conn).await.map_err(db_err)?;
    let body: Vec<AccountResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn list_account_transactions(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    accounts::fetch_account(&mut conn, id)
        .await
        .map_err(db_err)?
        .ok_or_else(|| ApiError::from(DeskError::not_found(format!("account {id}"))))?;
    let rows = accounts::list_account_transactions(&mut conn, id)
        .await
        .map_err(db_err)?;
    let body: Vec<AccountTransactionResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let order = fxd_orders::create_order(
        &mut tx,
        &caps,
        CreateOrder {
            customer_id: body.customer_id,
            from_currency: body.from_currency,
            to_currency: body.to_currency,
            amount_buy: body.amount_buy,
            amount_sell: body.amount_sell,
            rate: body.rate,
            status: body.status,
            order_type: body.order_type,
            is_flex_order: body.is_flex_order,
            buy_account_id: body.buy_account_id,
            sell_account_id: body.sell_account_id,
            handler_id: body.handler_id,
            remarks: body.remarks,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    let rows = orders::list_orders(&mut conn, query.status)
        .await
        .map_err(db_err)?;
    let body: Vec<OrderResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    let order = orders::fetch_order(&mut conn, id)
        .await
        .map_err(db_err)?
        .ok_or_else(|| ApiError::from(DeskError::not_found(format!("order {id}"))))?;

    let mut lists = Vec::with_capacity(4);
    for kind in [
        SubLedgerKind::Receipt,
        SubLedgerKind::Payment,
        SubLedgerKind::Profit,
        SubLedgerKind::ServiceCharge,
    ] {
        let rows = subledger::list_sub_ledger_rows(&mut conn, kind, id)
            .await
            .map_err(db_err)?;
        lists.push(
            rows.into_iter()
                .map(|r| SubLedgerResponse::from_row(&st.files, r))
                .collect::<Vec<_>>(),
        );
    }
    let mut lists = lists.into_iter();

    Ok(Json(OrderDetailResponse {
        order: order.into(),
        receipts: lists.next().unwrap_or_default(),
        payments: lists.next().unwrap_or_default(),
        profits: lists.next().unwrap_or_default(),
        service_charges: lists.next().unwrap_or_default(),
    }))
}

pub(crate) async fn update_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let order = fxd_orders::update_order(
        &mut tx,
        &caps,
        id,
        OrderPatch {
            customer_id: body.customer_id,
            from_currency: body.from_currency,
            to_currency: body.to_currency,
            amount_buy: body.amount_buy,
            amount_sell: body.amount_sell,
            rate: body.rate,
            order_type: body.order_type,
            is_flex_order: body.is_flex_order,
            handler_id: body.handler_id,
            buy_account_id: body.buy_account_id,
            sell_account_id: body.sell_account_id,
            remarks: body.remarks,
            profit: body.profit.map(earning_patch),
            service_charge: body.service_charge.map(earning_patch),
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(OrderResponse::from(order)))
}

fn earning_patch(body: EarningBody) -> EarningPatch {
    EarningPatch {
        account_id: body.account_id,
        amount: body.amount,
        currency_code: body.currency_code,
    }
}

pub(crate) async fn patch_order_status(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusPatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let order = fxd_orders::transition_status(&mut tx, &caps, id, body.status).await?;
    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(OrderResponse::from(order)))
}

pub(crate) async fn delete_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let removed_files = fxd_orders::delete_order(&mut tx, &caps, id).await?;
    tx.commit().await.map_err(ApiError::from)?;

    finish(&st, Vec::new(), removed_files);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Flex operations
// ---------------------------------------------------------------------------

pub(crate) async fn proceed_with_partial_receipts(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let order = fxd_orders::proceed_with_partial_receipts(&mut tx, &caps, id).await?;
    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(OrderResponse::from(order)))
}

pub(crate) async fn adjust_flex_rate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AdjustRateRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let order = fxd_orders::adjust_flex_rate(&mut tx, &caps, id, body.rate).await?;
    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(OrderResponse::from(order)))
}

// ---------------------------------------------------------------------------
// Sub-ledger drafts: create (receipts / payments)
// ---------------------------------------------------------------------------

pub(crate) async fn create_receipt(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    path: Path<Uuid>,
    body: Json<DraftCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    create_cashflow_draft(state, headers, path, SubLedgerKind::Receipt, body.0).await
}

pub(crate) async fn create_payment(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    path: Path<Uuid>,
    body: Json<DraftCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    create_cashflow_draft(state, headers, path, SubLedgerKind::Payment, body.0).await
}

async fn create_cashflow_draft(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    kind: SubLedgerKind,
    body: DraftCreateRequest,
) -> ApiResult<(StatusCode, Json<SubLedgerResponse>)> {
    // Attachment bytes land on disk before the transaction opens; a
    // rollback orphans the file, which best-effort cleanup tolerates.
    let image_path = save_image(&st, body.image_base64.as_deref(), &body.image_ext)?;

    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let row = fxd_orders::create_draft(
        &mut tx,
        &caps,
        order_id,
        kind,
        DraftInput {
            account_id: body.account_id,
            amount: Some(body.amount),
            image_path,
            currency_code: body.currency_code,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(SubLedgerResponse::from_row(&st.files, row)),
    ))
}

fn save_image(
    st: &AppState,
    image_base64: Option<&str>,
    ext: &str,
) -> ApiResult<Option<String>> {
    let Some(encoded) = image_base64 else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| ApiError::from(DeskError::invalid_argument("image_base64 is not base64")))?;
    let path = st
        .files
        .save(&bytes, ext)
        .map_err(|e| ApiError::from(DeskError::storage(e)))?;
    Ok(Some(path))
}

// ---------------------------------------------------------------------------
// Sub-ledger drafts: update / delete / confirm (all four kinds)
// ---------------------------------------------------------------------------

macro_rules! sub_ledger_handlers {
    ($update:ident, $delete:ident, $confirm:ident, $kind:expr) => {
        pub(crate) async fn $update(
            state: State<Arc<AppState>>,
            headers: HeaderMap,
            path: Path<Uuid>,
            body: Json<DraftUpdateRequest>,
        ) -> ApiResult<Json<SubLedgerResponse>> {
            update_draft_generic(state, headers, path, $kind, body.0).await
        }

        pub(crate) async fn $delete(
            state: State<Arc<AppState>>,
            headers: HeaderMap,
            path: Path<Uuid>,
        ) -> ApiResult<StatusCode> {
            delete_draft_generic(state, headers, path, $kind).await
        }

        pub(crate) async fn $confirm(
            state: State<Arc<AppState>>,
            headers: HeaderMap,
            path: Path<Uuid>,
        ) -> ApiResult<Json<SubLedgerResponse>> {
            confirm_generic(state, headers, path, $kind).await
        }
    };
}

sub_ledger_handlers!(
    update_receipt,
    delete_receipt,
    confirm_receipt,
    SubLedgerKind::Receipt
);
sub_ledger_handlers!(
    update_payment,
    delete_payment,
    confirm_payment,
    SubLedgerKind::Payment
);
sub_ledger_handlers!(
    update_profit,
    delete_profit,
    confirm_profit,
    SubLedgerKind::Profit
);
sub_ledger_handlers!(
    update_service_charge,
    delete_service_charge,
    confirm_service_charge,
    SubLedgerKind::ServiceCharge
);

async fn update_draft_generic(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    kind: SubLedgerKind,
    body: DraftUpdateRequest,
) -> ApiResult<Json<SubLedgerResponse>> {
    let image_path = save_image(&st, body.image_base64.as_deref(), &body.image_ext)?;

    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let row = fxd_orders::update_draft(
        &mut tx,
        &caps,
        kind,
        id,
        DraftInput {
            account_id: body.account_id,
            amount: body.amount,
            image_path,
            currency_code: body.currency_code,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(SubLedgerResponse::from_row(&st.files, row)))
}

async fn delete_draft_generic(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    kind: SubLedgerKind,
) -> ApiResult<StatusCode> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let row = fxd_orders::delete_draft(&mut tx, &caps, kind, id).await?;
    tx.commit().await.map_err(ApiError::from)?;

    if let Some(path) = row.image_path {
        st.files.delete_quiet(&path);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn confirm_generic(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    kind: SubLedgerKind,
) -> ApiResult<Json<SubLedgerResponse>> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let row = fxd_orders::confirm(&mut tx, &caps, kind, id).await?;
    tx.commit().await.map_err(ApiError::from)?;
    Ok(Json(SubLedgerResponse::from_row(&st.files, row)))
}

// ---------------------------------------------------------------------------
// Expenses / transfers
// ---------------------------------------------------------------------------

pub(crate) async fn create_expense(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateExpenseRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let expense = movements::create_expense(
        &mut tx,
        &caps,
        movements::ExpenseInput {
            account_id: body.account_id,
            amount: body.amount,
            description: body.description,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(ExpenseResponse::from(expense))))
}

pub(crate) async fn create_transfer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTransferRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let transfer = movements::create_transfer(
        &mut tx,
        &caps,
        movements::TransferInput {
            from_account_id: body.from_account_id,
            to_account_id: body.to_account_id,
            amount_from: body.amount_from,
            amount_to: body.amount_to,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(TransferResponse::from(transfer))))
}

// ---------------------------------------------------------------------------
// Approval requests
// ---------------------------------------------------------------------------

pub(crate) async fn create_approval_request(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateApprovalRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;

    let (request, notices) = fxd_approval::create_request(
        &mut tx,
        &caps,
        &st.files,
        CreateRequestInput {
            entity_type: body.entity_type,
            entity_id: body.entity_id,
            request_type: body.request_type,
            reason: body.reason,
            request_data: body.request_data,
        },
    )
    .await?;

    tx.commit().await.map_err(ApiError::from)?;
    finish(&st, notices, Vec::new());
    Ok((StatusCode::CREATED, Json(ApprovalResponse::from(request))))
}

pub(crate) async fn list_approval_requests(
    State(st): State<Arc<AppState>>,
    Query(query): Query<ApprovalListQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    let rows = approvals::list_approval_requests(
        &mut conn,
        &ApprovalFilter {
            status: query.status,
            entity_type: query.entity_type,
            entity_id: query.entity_id,
        },
    )
    .await
    .map_err(db_err)?;
    let body: Vec<ApprovalResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn get_approval_request(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = st.pool.acquire().await.map_err(ApiError::from)?;
    let row = approvals::fetch_approval_request(&mut conn, id)
        .await
        .map_err(db_err)?
        .ok_or_else(|| ApiError::from(DeskError::not_found(format!("approval request {id}"))))?;
    Ok(Json(ApprovalResponse::from(row)))
}

pub(crate) async fn approve_request(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let outcome = fxd_approval::approve(&mut tx, &caps, id).await?;
    tx.commit().await.map_err(ApiError::from)?;

    finish(&st, outcome.notices, outcome.removed_files);
    Ok(Json(ApprovalResponse::from(outcome.request)))
}

pub(crate) async fn reject_request(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectBody>>,
) -> ApiResult<impl IntoResponse> {
    let reason = body.and_then(|b| b.0.reason);

    let actor = actor_id(&headers)?;
    let mut tx = st.pool.begin().await.map_err(ApiError::from)?;
    let caps = caps_for(&mut tx, actor).await?;
    let outcome = fxd_approval::reject(&mut tx, &caps, id, reason).await?;
    tx.commit().await.map_err(ApiError::from)?;

    finish(&st, outcome.notices, outcome.removed_files);
    Ok(Json(ApprovalResponse::from(outcome.request)))
}
