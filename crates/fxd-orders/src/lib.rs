//! Order core: lifecycle state machine, sub-ledger, flex reconciliation.
//!
//! Every public operation takes `&mut PgConnection` and composes inside the
//! caller's transaction — the status change and every ledger posting it
//! triggers commit or roll back together.

pub mod flex;
pub mod lifecycle;
pub mod sub_ledger;

pub use flex::{adjust_flex_rate, proceed_with_partial_receipts};
pub use lifecycle::{
    create_order, delete_order, reverse_order_postings, transition_status, update_order,
    CreateOrder, EarningPatch, OrderPatch,
};
pub use sub_ledger::{confirm, create_draft, delete_draft, replace_draft, update_draft, DraftInput};
