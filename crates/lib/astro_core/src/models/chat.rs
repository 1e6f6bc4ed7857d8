//! Chat session and message models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Lifecycle of a booked consultation.
    ///
    /// `requested -> accepted -> active -> ended`, with
    /// `requested | accepted -> canceled` as the alternate terminal.
    pub enum ChatStatus {
        Requested => "requested",
        Accepted => "accepted",
        Active => "active",
        Ended => "ended",
        Canceled => "canceled",
    }
}

impl ChatStatus {
    /// Statuses that hold a slot on the astrologer's calendar.
    pub const BOOKED: &'static [ChatStatus] =
        &[ChatStatus::Requested, ChatStatus::Accepted, ChatStatus::Active];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Canceled)
    }

    /// Messages may be exchanged only while the session is confirmed.
    pub fn accepts_messages(self) -> bool {
        matches!(self, Self::Accepted | Self::Active)
    }
}

/// Stored chat session. Pricing fields are snapshots taken at creation.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionRecord {
    #[serde(rename = "chatSessionId")]
    pub id: Uuid,
    pub consumer_id: Uuid,
    pub astrologer_id: Uuid,
    #[serde(rename = "scheduledStartUtc")]
    pub scheduled_start: DateTime<Utc>,
    #[serde(rename = "scheduledEndUtc")]
    pub scheduled_end: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: ChatStatus,
    pub price_per_minute_snapshot: Decimal,
    pub platform_fee_pct_snapshot: Decimal,
    pub astrologer_share_pct_snapshot: Decimal,
    pub notes: Option<String>,
    #[serde(rename = "createdUtc")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "acceptedUtc")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "startedUtc")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedUtc")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "canceledUtc")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl ChatSessionRecord {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.consumer_id == user_id || self.astrologer_id == user_id
    }
}

/// Append-only chat message.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRecord {
    #[serde(rename = "chatMessageId")]
    pub id: Uuid,
    pub chat_session_id: Uuid,
    pub sender_user_id: Uuid,
    pub message_text: String,
    #[serde(rename = "createdUtc")]
    pub created_at: DateTime<Utc>,
}
