//! Account ledger — the single write surface for balances.
//!
//! # Purpose
//! Every balance change in FxDesk flows through [`post_entry`]: it applies
//! one signed delta to an account and appends exactly one row to the
//! append-only `account_transactions` log. Undo is [`reverse_entry`] — an
//! equal-and-opposite posting — never an edit of history.
//!
//! Invariants owned here:
//! - `amount` must be strictly positive and finite; validation runs before
//!   any mutation.
//! - Balances MAY go negative (staff fronting funds); never rejected.
//! - One posting ⇒ one log row, inside whatever transaction the caller has
//!   open — callers pass `&mut PgConnection` from their `sqlx::Transaction`
//!   so a failure partway rolls back both the balance and the log row.
//!
//! The replay check [`recompute_balance`] verifies
//! `balance == Σ(signed log amounts)` — O(n) over the log, for tests,
//! startup verification, and the CLI integrity command.

use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use fxd_db::accounts;
use fxd_schemas::{DeskError, DeskResult, EntryDirection};

pub mod movements;

// ---------------------------------------------------------------------------
// Posting
// ---------------------------------------------------------------------------

/// Post one signed balance entry and append its log row.
///
/// # Errors
/// - `InvalidArgument` — amount not strictly positive/finite, empty
///   description.
/// - `NotFound` — account absent.
/// - `Storage` — unexpected database failure.
///
/// The account is **not** mutated on a validation error.
pub async fn post_entry(
    conn: &mut PgConnection,
    account_id: Uuid,
    direction: EntryDirection,
    amount: f64,
    description: &str,
) -> DeskResult<()> {
    validate_amount(amount)?;
    if description.trim().is_empty() {
        return Err(DeskError::invalid_argument(
            "posting description must not be empty",
        ));
    }

    let account = accounts::fetch_account(&mut *conn, account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {account_id}")))?;

    accounts::apply_balance_delta(&mut *conn, account_id, direction.signed(amount))
        .await
        .map_err(fxd_db::translate_db_error)?;

    accounts::insert_account_transaction(
        &mut *conn,
        &accounts::NewAccountTransaction {
            id: Uuid::new_v4(),
            account_id,
            direction,
            amount,
            description: description.to_string(),
        },
    )
    .await
    .map_err(fxd_db::translate_db_error)?;

    debug!(
        account = %account.name,
        direction = direction.as_str(),
        amount,
        "ledger posting"
    );
    Ok(())
}

/// Post the exact inverse of a prior entry.
pub async fn reverse_entry(
    conn: &mut PgConnection,
    account_id: Uuid,
    original_direction: EntryDirection,
    amount: f64,
    description: &str,
) -> DeskResult<()> {
    post_entry(
        conn,
        account_id,
        original_direction.inverse(),
        amount,
        description,
    )
    .await
}

fn validate_amount(amount: f64) -> DeskResult<()> {
    if !amount.is_finite() {
        return Err(DeskError::invalid_argument(format!(
            "posting amount must be finite, got {amount}"
        )));
    }
    if amount <= 0.0 {
        return Err(DeskError::invalid_argument(format!(
            "posting amount must be > 0, got {amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

/// Result of replaying one account's transaction log.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCheck {
    pub account_id: Uuid,
    pub stored_balance: f64,
    pub replayed_balance: f64,
}

impl BalanceCheck {
    /// Consistent within floating tolerance.
    pub fn is_consistent(&self) -> bool {
        (self.stored_balance - self.replayed_balance).abs() < 1e-6
    }

    pub fn drift(&self) -> f64 {
        self.stored_balance - self.replayed_balance
    }
}

/// Replay the log for one account and compare with the stored balance.
pub async fn recompute_balance(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> DeskResult<BalanceCheck> {
    let account = accounts::fetch_account(&mut *conn, account_id)
        .await
        .map_err(fxd_db::translate_db_error)?
        .ok_or_else(|| DeskError::not_found(format!("account {account_id}")))?;

    let replayed = accounts::sum_signed_transactions(&mut *conn, account_id)
        .await
        .map_err(fxd_db::translate_db_error)?;

    Ok(BalanceCheck {
        account_id,
        stored_balance: account.balance,
        replayed_balance: replayed,
    })
}

// ---------------------------------------------------------------------------
// Tests (pure parts; posting flows live in tests/scenario_*.rs)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_amount() {
        assert_eq!(
            validate_amount(0.0),
            Err(DeskError::invalid_argument(
                "posting amount must be > 0, got 0"
            ))
        );
    }

    #[test]
    fn rejects_negative_amount() {
        assert!(validate_amount(-1.5).is_err());
    }

    #[test]
    fn rejects_non_finite_amount() {
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn accepts_positive_amount() {
        assert!(validate_amount(0.01).is_ok());
    }

    #[test]
    fn balance_check_tolerance() {
        let check = BalanceCheck {
            account_id: Uuid::new_v4(),
            stored_balance: 100.0,
            replayed_balance: 100.0 + 1e-9,
        };
        assert!(check.is_consistent());

        let drifted = BalanceCheck {
            stored_balance: 100.0,
            replayed_balance: 90.0,
            ..check
        };
        assert!(!drifted.is_consistent());
        assert_eq!(drifted.drift(), 10.0);
    }
}
