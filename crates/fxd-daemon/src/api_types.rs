//! Request/response DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use fxd_artifacts::FileStore;
use fxd_db::{
    AccountRow, AccountTransactionRow, ApprovalRequestRow, ExpenseRow, OrderRow, SubLedgerRow,
    TransferRow,
};
use fxd_schemas::{
    ApprovalStatus, EntityType, EntryDirection, OrderStatus, OrderType, RequestType,
    SubLedgerKind, SubLedgerStatus,
};

// ---------------------------------------------------------------------------
// Service metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub db_ok: bool,
    pub has_schema: bool,
    pub daemon_uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub balance: f64,
}

impl From<AccountRow> for AccountResponse {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            currency_code: row.currency_code,
            balance: row.balance,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountTransactionResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: EntryDirection,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<AccountTransactionRow> for AccountTransactionResponse {
    fn from(row: AccountTransactionRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            direction: row.direction,
            amount: row.amount,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FileUploadRequest {
    /// Raw file bytes, base64-encoded.
    pub data_base64: String,
    /// Extension without the dot, e.g. "png".
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub path: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    pub amount_buy: f64,
    pub amount_sell: f64,
    pub rate: f64,
    #[serde(default = "default_order_status")]
    pub status: OrderStatus,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub is_flex_order: bool,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub handler_id: Option<Uuid>,
    pub remarks: Option<String>,
}

fn default_order_status() -> OrderStatus {
    OrderStatus::Pending
}

fn default_order_type() -> OrderType {
    OrderType::Online
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateOrderRequest {
    pub customer_id: Option<Uuid>,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    pub amount_buy: Option<f64>,
    pub amount_sell: Option<f64>,
    pub rate: Option<f64>,
    pub order_type: Option<OrderType>,
    pub is_flex_order: Option<bool>,
    pub handler_id: Option<Uuid>,
    pub buy_account_id: Option<Uuid>,
    pub sell_account_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub profit: Option<EarningBody>,
    pub service_charge: Option<EarningBody>,
}

#[derive(Debug, Deserialize)]
pub struct EarningBody {
    pub account_id: Option<Uuid>,
    pub amount: f64,
    pub currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusPatchRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRateRequest {
    pub rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
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

impl From<OrderRow> for OrderResponse {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            order_no: row.order_no,
            customer_id: row.customer_id,
            from_currency: row.from_currency,
            to_currency: row.to_currency,
            amount_buy: row.amount_buy,
            amount_sell: row.amount_sell,
            rate: row.rate,
            actual_amount_buy: row.actual_amount_buy,
            actual_amount_sell: row.actual_amount_sell,
            actual_rate: row.actual_rate,
            status: row.status,
            order_type: row.order_type,
            is_flex_order: row.is_flex_order,
            buy_account_id: row.buy_account_id,
            sell_account_id: row.sell_account_id,
            handler_id: row.handler_id,
            created_by: row.created_by,
            remarks: row.remarks,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Order plus its resolved sub-ledger rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub receipts: Vec<SubLedgerResponse>,
    pub payments: Vec<SubLedgerResponse>,
    pub profits: Vec<SubLedgerResponse>,
    pub service_charges: Vec<SubLedgerResponse>,
}

// ---------------------------------------------------------------------------
// Sub-ledger rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DraftCreateRequest {
    pub account_id: Option<Uuid>,
    pub amount: f64,
    /// Optional attachment, base64-encoded; stored before the transaction
    /// opens (tolerates orphaning on rollback).
    pub image_base64: Option<String>,
    #[serde(default)]
    pub image_ext: String,
    pub currency_code: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DraftUpdateRequest {
    pub account_id: Option<Uuid>,
    pub amount: Option<f64>,
    pub image_base64: Option<String>,
    #[serde(default)]
    pub image_ext: String,
    pub currency_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubLedgerResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: SubLedgerKind,
    pub account_id: Option<Uuid>,
    pub amount: f64,
    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub currency_code: Option<String>,
    pub status: SubLedgerStatus,
    pub created_at: DateTime<Utc>,
}

impl SubLedgerResponse {
    pub fn from_row(files: &FileStore, row: SubLedgerRow) -> Self {
        let image_url = row.image_path.as_deref().map(|p| files.resolve_url(p));
        Self {
            id: row.id,
            order_id: row.order_id,
            kind: row.kind,
            account_id: row.account_id,
            amount: row.amount,
            image_path: row.image_path,
            image_url,
            currency_code: row.currency_code,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Expenses / transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub account_id: Uuid,
    pub amount: f64,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseRow> for ExpenseResponse {
    fn from(row: ExpenseRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            amount: row.amount,
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_from: f64,
    pub amount_to: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_from: f64,
    pub amount_to: f64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<TransferRow> for TransferResponse {
    fn from(row: TransferRow) -> Self {
        Self {
            id: row.id,
            from_account_id: row.from_account_id,
            to_account_id: row.to_account_id,
            amount_from: row.amount_from,
            amount_to: row.amount_to,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Approval requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateApprovalRequest {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub reason: String,
    pub request_data: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApprovalListQuery {
    pub status: Option<ApprovalStatus>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RejectBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalResponse {
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

impl From<ApprovalRequestRow> for ApprovalResponse {
    fn from(row: ApprovalRequestRow) -> Self {
        Self {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            request_type: row.request_type,
            requested_by: row.requested_by,
            reason: row.reason,
            request_data: row.request_data,
            original_entity_data: row.original_entity_data,
            status: row.status,
            approved_by: row.approved_by,
            rejected_by: row.rejected_by,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Order list query
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}
