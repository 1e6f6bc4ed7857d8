//! Settlement, ledger balances and payouts.
//!
//! The ledger is append-only. Balances are always derived from it and never
//! stored.

pub mod estimate;
pub mod ledger;
pub mod payouts;
pub mod settlement;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::billing::PayoutStatus;

/// Billing errors.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Malformed input. Carries the stable machine code.
    #[error("Validation error: {0}")]
    Validation(&'static str),

    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Payout not found")]
    PayoutNotFound,

    #[error("Payout is {current}")]
    InvalidPayoutTransition { current: PayoutStatus },

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}
