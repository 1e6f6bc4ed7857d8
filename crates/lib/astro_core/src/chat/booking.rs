//! Booking window rules.

use chrono::{DateTime, Duration, Utc};

use super::ChatError;

pub const MIN_DURATION_MINUTES: i64 = 5;
pub const MAX_DURATION_MINUTES: i64 = 240;

/// Requested consultation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parse an RFC 3339 timestamp that explicitly carries UTC (`Z` or `+00:00`).
pub fn parse_utc_instant(raw: &str) -> Result<DateTime<Utc>, ChatError> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|_| ChatError::Validation("start_must_be_utc"))?;
    if parsed.offset().local_minus_utc() != 0 {
        return Err(ChatError::Validation("start_must_be_utc"));
    }
    Ok(parsed.with_timezone(&Utc))
}

/// Build the window for a booking request. The window must stay on one UTC
/// calendar day.
pub fn booking_window(
    start: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<BookingWindow, ChatError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
        return Err(ChatError::Validation("invalid_duration"));
    }
    let end = start + Duration::minutes(duration_minutes);
    if start.date_naive() != end.date_naive() {
        return Err(ChatError::Validation("cross_midnight_not_supported"));
    }
    Ok(BookingWindow { start, end })
}
