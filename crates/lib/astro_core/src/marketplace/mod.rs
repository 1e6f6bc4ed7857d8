//! Astrologer onboarding and weekly availability.

pub mod availability;
pub mod profiles;

use thiserror::Error;

use crate::auth::AuthError;
use crate::models::marketplace::AstrologerStatus;

/// Marketplace errors.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Malformed input. Carries the stable machine code.
    #[error("Validation error: {0}")]
    Validation(&'static str),

    #[error("Astrologer profile already exists")]
    AlreadyApplied,

    #[error("Astrologer profile not found")]
    ProfileNotFound,

    #[error("Availability slot not found")]
    SlotNotFound,

    /// The profile is not in the status the operation requires.
    #[error("Invalid status: {0}")]
    InvalidStatus(AstrologerStatus),

    #[error("Astrologer is not verified")]
    NotVerified,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}
