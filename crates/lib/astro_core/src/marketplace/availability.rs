//! Weekly-recurring availability slots and window matching.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::MarketplaceError;
use super::profiles::get_profile;
use crate::models::marketplace::AvailabilitySlot;
use crate::uuid::uuidv7;

const SLOT_COLUMNS: &str = "id, astrologer_id, day_of_week, start_time, end_time, is_active";

/// Day index used by availability slots: Sunday = 0 .. Saturday = 6.
pub fn day_of_week(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

pub fn validate_slot(
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> Result<(), MarketplaceError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(MarketplaceError::Validation("invalid_dayofweek"));
    }
    if start_time >= end_time {
        return Err(MarketplaceError::Validation("invalid_time_range"));
    }
    Ok(())
}

/// Whether `[start, end)` sits entirely inside one active slot on the
/// weekday of `start`. Windows spanning two calendar days never fit.
pub fn window_fits(slots: &[AvailabilitySlot], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    if start.date_naive() != end.date_naive() || start >= end {
        return false;
    }
    let dow = day_of_week(start.date_naive());
    let (from, to) = (start.time(), end.time());
    slots
        .iter()
        .any(|s| s.is_active && s.day_of_week == dow && s.start_time <= from && s.end_time >= to)
}

pub async fn add_slot(
    pool: &PgPool,
    astrologer_id: Uuid,
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> Result<AvailabilitySlot, MarketplaceError> {
    validate_slot(day_of_week, start_time, end_time)?;
    if get_profile(pool, astrologer_id).await?.is_none() {
        return Err(MarketplaceError::ProfileNotFound);
    }
    let slot = sqlx::query_as::<_, AvailabilitySlot>(&format!(
        r#"
        INSERT INTO astrologer_availability (id, astrologer_id, day_of_week, start_time, end_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SLOT_COLUMNS}
        "#
    ))
    .bind(uuidv7())
    .bind(astrologer_id)
    .bind(day_of_week)
    .bind(start_time)
    .bind(end_time)
    .fetch_one(pool)
    .await?;
    Ok(slot)
}

/// Slots for an astrologer, ordered by weekday then start time.
pub async fn list_slots<'e>(
    db: impl PgExecutor<'e>,
    astrologer_id: Uuid,
    active_only: bool,
) -> Result<Vec<AvailabilitySlot>, MarketplaceError> {
    let rows = sqlx::query_as::<_, AvailabilitySlot>(&format!(
        r#"
        SELECT {SLOT_COLUMNS} FROM astrologer_availability
        WHERE astrologer_id = $1 AND (is_active OR NOT $2)
        ORDER BY day_of_week, start_time
        "#
    ))
    .bind(astrologer_id)
    .bind(active_only)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Active slots for one weekday.
pub async fn active_slots_for_day<'e>(
    db: impl PgExecutor<'e>,
    astrologer_id: Uuid,
    day_of_week: i16,
) -> Result<Vec<AvailabilitySlot>, MarketplaceError> {
    let rows = sqlx::query_as::<_, AvailabilitySlot>(&format!(
        r#"
        SELECT {SLOT_COLUMNS} FROM astrologer_availability
        WHERE astrologer_id = $1 AND day_of_week = $2 AND is_active
        "#
    ))
    .bind(astrologer_id)
    .bind(day_of_week)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Deactivate one of the astrologer's own slots.
pub async fn disable_slot(
    pool: &PgPool,
    astrologer_id: Uuid,
    slot_id: Uuid,
) -> Result<(), MarketplaceError> {
    let result = sqlx::query(
        "UPDATE astrologer_availability SET is_active = FALSE \
         WHERE id = $1 AND astrologer_id = $2",
    )
    .bind(slot_id)
    .bind(astrologer_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(MarketplaceError::SlotNotFound);
    }
    Ok(())
}
