//! Astrologer profile and availability models.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Linear onboarding workflow: applied, then verified by an admin, then
    /// activated by the astrologer. `Suspended` is reachable only by admin action.
    pub enum AstrologerStatus {
        Applied => "applied",
        Verified => "verified",
        Active => "active",
        Suspended => "suspended",
    }
}

impl AstrologerStatus {
    /// Whether consumers may book sessions with an astrologer in this status.
    pub fn accepts_bookings(self) -> bool {
        matches!(self, Self::Verified | Self::Active)
    }
}

/// Stored astrologer profile.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AstrologerProfile {
    pub astrologer_id: Uuid,
    pub display_name: String,
    pub bio: Option<String>,
    pub experience_years: i32,
    pub languages_csv: String,
    pub specializations_csv: String,
    pub price_per_minute: Decimal,
    pub platform_fee_pct: Decimal,
    #[sqlx(try_from = "String")]
    pub status: AstrologerStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Weekly-recurring availability window. `day_of_week` counts from Sunday = 0.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub astrologer_id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}
