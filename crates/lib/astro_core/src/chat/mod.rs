//! Chat consultations: booking, lifecycle state machine, and messages.

pub mod booking;
pub mod lifecycle;
pub mod messages;
pub mod sessions;

use thiserror::Error;

use crate::billing::BillingError;
use crate::marketplace::MarketplaceError;
use crate::models::chat::ChatStatus;
use lifecycle::SessionAction;

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed input. Carries the stable machine code.
    #[error("Validation error: {0}")]
    Validation(&'static str),

    #[error("Astrologer not found")]
    AstrologerNotFound,

    #[error("Astrologer is not verified")]
    AstrologerNotVerified,

    #[error("Requested window is outside the astrologer's availability")]
    OutsideAvailability,

    #[error("Requested window overlaps an existing booking")]
    SlotAlreadyBooked,

    #[error("Chat session not found")]
    SessionNotFound,

    #[error("Caller is not a participant of this session")]
    NotParticipant,

    /// A conditional update matched no row.
    #[error("Cannot {action} a session in status {current}")]
    InvalidTransition {
        action: SessionAction,
        current: ChatStatus,
    },

    #[error("Session does not accept messages in status {0}")]
    NotAcceptingMessages(ChatStatus),

    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}
