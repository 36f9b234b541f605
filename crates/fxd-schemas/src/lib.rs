//! Shared domain vocabulary for FxDesk.
//!
//! Status enums, sub-ledger kinds, the per-request capability set, and the
//! tagged domain error carried across every crate boundary. Everything here
//! is plain data — no IO, no async.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// DeskError — tagged domain error
// ---------------------------------------------------------------------------

/// Domain error taxonomy. The HTTP layer dispatches on the variant alone;
/// nothing downstream inspects request paths to classify a failure.
///
/// Every variant is detected by validation *before* any mutation, except
/// `Storage`, which wraps an unexpected database/infrastructure failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskError {
    /// Missing or malformed field, currency mismatch, bad payload shape.
    InvalidArgument(String),
    /// Entity / account / request absent.
    NotFound(String),
    /// Capability check failed.
    Forbidden(String),
    /// Wrong status for the requested operation.
    InvalidState(String),
    /// Duplicate pending approval request (or equivalent uniqueness clash).
    Conflict(String),
    /// Unexpected storage failure, surfaced as a generic 5xx.
    Storage(String),
}

impl DeskError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Wrap any displayable infrastructure failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Stable machine-readable tag, serialized in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for DeskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            Self::NotFound(m) => write!(f, "not found: {m}"),
            Self::Forbidden(m) => write!(f, "forbidden: {m}"),
            Self::InvalidState(m) => write!(f, "invalid state: {m}"),
            Self::Conflict(m) => write!(f, "conflict: {m}"),
            Self::Storage(m) => write!(f, "storage error: {m}"),
        }
    }
}

impl std::error::Error for DeskError {}

/// Crate-wide result alias.
pub type DeskResult<T> = Result<T, DeskError>;

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Order lifecycle states.
///
/// `pending → under_process → {completed, cancelled}`;
/// `completed ↔ {pending_amend, pending_delete}` via the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    UnderProcess,
    Completed,
    Cancelled,
    PendingAmend,
    PendingDelete,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderProcess => "under_process",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::PendingAmend => "pending_amend",
            Self::PendingDelete => "pending_delete",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "under_process" => Ok(Self::UnderProcess),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "pending_amend" => Ok(Self::PendingAmend),
            "pending_delete" => Ok(Self::PendingDelete),
            other => Err(DeskError::invalid_argument(format!(
                "unknown order status: {other}"
            ))),
        }
    }

    /// Core trade fields (customer, currencies, amounts, rate) are editable
    /// directly only while the order is still pending.
    pub fn core_fields_editable(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Completed orders mutate only through the approval workflow
    /// (admins retain a direct path).
    pub fn approval_gated(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// States parked behind an open approval request.
    pub fn is_approval_hold(&self) -> bool {
        matches!(self, Self::PendingAmend | Self::PendingDelete)
    }
}

/// Sales channel of an order. OTC orders settle outside the desk's accounts,
/// so completion never posts directly for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Online,
    Otc,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Otc => "otc",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "online" => Ok(Self::Online),
            "otc" => Ok(Self::Otc),
            other => Err(DeskError::invalid_argument(format!(
                "unknown order type: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger direction
// ---------------------------------------------------------------------------

/// Direction of a balance posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Add,
    Withdraw,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Withdraw => "withdraw",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "add" => Ok(Self::Add),
            "withdraw" => Ok(Self::Withdraw),
            other => Err(DeskError::invalid_argument(format!(
                "unknown entry direction: {other}"
            ))),
        }
    }

    /// The exact-opposite direction, used for reversals.
    pub fn inverse(&self) -> Self {
        match self {
            Self::Add => Self::Withdraw,
            Self::Withdraw => Self::Add,
        }
    }

    /// Signed contribution of an `amount ≥ 0` posting to a balance.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            Self::Add => amount,
            Self::Withdraw => -amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-ledger rows
// ---------------------------------------------------------------------------

/// Visibility state of a sub-ledger row. Only confirmed rows affect
/// account balances; drafts are freely mutable and deletable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubLedgerStatus {
    Draft,
    Confirmed,
}

impl SubLedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(DeskError::invalid_argument(format!(
                "unknown sub-ledger status: {other}"
            ))),
        }
    }
}

/// The four sub-ledger row kinds belonging to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubLedgerKind {
    Receipt,
    Payment,
    Profit,
    ServiceCharge,
}

impl SubLedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Payment => "payment",
            Self::Profit => "profit",
            Self::ServiceCharge => "service_charge",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "receipt" => Ok(Self::Receipt),
            "payment" => Ok(Self::Payment),
            "profit" => Ok(Self::Profit),
            "service_charge" => Ok(Self::ServiceCharge),
            other => Err(DeskError::invalid_argument(format!(
                "unknown sub-ledger kind: {other}"
            ))),
        }
    }

    /// Receipts and payments carry image attachments; profit and service
    /// charge carry a currency code instead.
    pub fn is_cashflow(&self) -> bool {
        matches!(self, Self::Receipt | Self::Payment)
    }

    /// Posting direction when a row of this kind is confirmed.
    ///
    /// Receipts add to the receiving account, payments withdraw, profit
    /// always adds, and a service charge adds unless the amount is negative
    /// ("we pay"), in which case the absolute value is withdrawn.
    pub fn confirm_direction(&self, amount: f64) -> EntryDirection {
        match self {
            Self::Receipt => EntryDirection::Add,
            Self::Payment => EntryDirection::Withdraw,
            Self::Profit => EntryDirection::Add,
            Self::ServiceCharge => {
                if amount >= 0.0 {
                    EntryDirection::Add
                } else {
                    EntryDirection::Withdraw
                }
            }
        }
    }

    /// Human fragment used in ledger descriptions:
    /// `Order #<n> - <fragment>`.
    pub fn description_fragment(&self, amount: f64) -> &'static str {
        match self {
            Self::Receipt => "Receipt from customer",
            Self::Payment => "Payment to customer",
            Self::Profit => "Profit",
            Self::ServiceCharge => {
                if amount >= 0.0 {
                    "Service charge"
                } else {
                    "Service charge paid by us"
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Approval workflow vocabulary
// ---------------------------------------------------------------------------

/// Entities that can be targeted by an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Order,
    Expense,
    Transfer,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "order" => Ok(Self::Order),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(DeskError::invalid_argument(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

/// What the requester wants done to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Edit,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            other => Err(DeskError::invalid_argument(format!(
                "unknown request type: {other}"
            ))),
        }
    }

    /// Hold status an affected completed order is parked in while the
    /// request is open.
    pub fn hold_status(&self) -> OrderStatus {
        match self {
            Self::Edit => OrderStatus::PendingAmend,
            Self::Delete => OrderStatus::PendingDelete,
        }
    }
}

/// Terminal-state machine of a request: `pending → {approved, rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> DeskResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DeskError::invalid_argument(format!(
                "unknown approval status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capability set resolved once per request and passed explicitly into the
/// workflow/lifecycle layers. No layer fetches permission flags on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub can_request_edit: bool,
    pub can_request_delete: bool,
    pub can_approve_edit: bool,
    pub can_approve_delete: bool,
}

impl Capabilities {
    /// An all-powerful capability set (admin).
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
            can_request_edit: true,
            can_request_delete: true,
            can_approve_edit: true,
            can_approve_delete: true,
        }
    }

    pub fn can_request(&self, rt: RequestType) -> bool {
        self.is_admin
            || match rt {
                RequestType::Edit => self.can_request_edit,
                RequestType::Delete => self.can_request_delete,
            }
    }

    pub fn can_approve(&self, rt: RequestType) -> bool {
        self.is_admin
            || match rt {
                RequestType::Edit => self.can_approve_edit,
                RequestType::Delete => self.can_approve_delete,
            }
    }
}

// ---------------------------------------------------------------------------
// Notification envelope
// ---------------------------------------------------------------------------

/// Reference to the entity a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::UnderProcess,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::PendingAmend,
            OrderStatus::PendingDelete,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(OrderStatus::parse("armed").is_err());
    }

    #[test]
    fn direction_inverse_is_involutive() {
        assert_eq!(EntryDirection::Add.inverse(), EntryDirection::Withdraw);
        assert_eq!(
            EntryDirection::Withdraw.inverse().inverse(),
            EntryDirection::Withdraw
        );
        assert_eq!(EntryDirection::Withdraw.signed(5.0), -5.0);
    }

    #[test]
    fn service_charge_direction_follows_sign() {
        let k = SubLedgerKind::ServiceCharge;
        assert_eq!(k.confirm_direction(10.0), EntryDirection::Add);
        assert_eq!(k.confirm_direction(-10.0), EntryDirection::Withdraw);
        assert_eq!(k.description_fragment(-10.0), "Service charge paid by us");
        assert_eq!(k.description_fragment(10.0), "Service charge");
    }

    #[test]
    fn profit_always_adds() {
        assert_eq!(
            SubLedgerKind::Profit.confirm_direction(-3.0),
            EntryDirection::Add
        );
    }

    #[test]
    fn admin_passes_every_capability_check() {
        let caps = Capabilities::admin(Uuid::new_v4());
        assert!(caps.can_request(RequestType::Edit));
        assert!(caps.can_approve(RequestType::Delete));
    }

    #[test]
    fn non_admin_needs_the_matching_flag() {
        let caps = Capabilities {
            user_id: Uuid::new_v4(),
            is_admin: false,
            can_request_edit: true,
            can_request_delete: false,
            can_approve_edit: false,
            can_approve_delete: false,
        };
        assert!(caps.can_request(RequestType::Edit));
        assert!(!caps.can_request(RequestType::Delete));
        assert!(!caps.can_approve(RequestType::Edit));
    }

    #[test]
    fn error_kind_tags_are_stable() {
        assert_eq!(DeskError::conflict("x").kind(), "conflict");
        assert_eq!(DeskError::not_found("x").kind(), "not_found");
        assert_eq!(
            DeskError::invalid_state("x").to_string(),
            "invalid state: x"
        );
    }
}
