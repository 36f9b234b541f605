//! Approval workflow: request / approve / reject for mutating completed
//! orders, expenses, and transfers against an immutable prior-state
//! snapshot.

pub mod amendment;
pub mod snapshot;
pub mod workflow;

pub use amendment::{CashflowAmendment, EarningAmendment, OrderAmendment};
pub use snapshot::capture_snapshot;
pub use workflow::{approve, create_request, reject, CreateRequestInput, WorkflowOutcome};
