//! Chat session store: booking and lifecycle transitions.
//!
//! Bookings for one astrologer are serialized with a transaction-scoped
//! advisory lock, so the overlap check and the insert (or accept) cannot
//! interleave with another booking for the same calendar. Every lifecycle
//! transition is a single conditional update whose affected row decides the
//! outcome.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::ChatError;
use super::booking::booking_window;
use super::lifecycle::SessionAction;
use crate::billing::settlement::{SettlementOutcome, record_settlement};
use crate::locks::advisory_xact_lock;
use crate::marketplace::availability::{active_slots_for_day, day_of_week, window_fits};
use crate::marketplace::profiles::get_profile;
use crate::models::chat::{ChatSessionRecord, ChatStatus};
use crate::uuid::uuidv7;

const SESSION_COLUMNS: &str = "id, consumer_id, astrologer_id, scheduled_start, scheduled_end, \
                               status, price_per_minute_snapshot, platform_fee_pct_snapshot, \
                               astrologer_share_pct_snapshot, notes, created_at, accepted_at, \
                               started_at, ended_at, canceled_at";

const MAX_NOTES_LEN: usize = 1000;

/// A consumer's booking request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub consumer_id: Uuid,
    pub astrologer_id: Uuid,
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub notes: Option<String>,
}

fn booking_lock_key(astrologer_id: Uuid) -> String {
    format!("booking:{astrologer_id}")
}

fn booked_statuses() -> Vec<String> {
    ChatStatus::BOOKED.iter().map(|s| s.as_str().to_string()).collect()
}

/// Whether any booked session of the astrologer overlaps `[start, end)`.
/// Windows are half-open, so back-to-back bookings do not clash.
async fn has_overlap(
    conn: &mut PgConnection,
    astrologer_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<bool, ChatError> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM chat_sessions
            WHERE astrologer_id = $1
              AND status = ANY($4)
              AND scheduled_start < $3
              AND scheduled_end > $2
        )
        "#,
    )
    .bind(astrologer_id)
    .bind(start)
    .bind(end)
    .bind(booked_statuses())
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Book a session in `requested` status, snapshotting the astrologer's price
/// and fee split.
pub async fn create_session(
    pool: &PgPool,
    booking: &NewBooking,
) -> Result<ChatSessionRecord, ChatError> {
    if booking.astrologer_id.is_nil() || booking.astrologer_id == booking.consumer_id {
        return Err(ChatError::Validation("invalid_astrologer"));
    }
    if booking
        .notes
        .as_deref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
    {
        return Err(ChatError::Validation("invalid_notes"));
    }
    let window = booking_window(booking.start, booking.duration_minutes)?;

    let mut tx = pool.begin().await?;
    advisory_xact_lock(&mut tx, &booking_lock_key(booking.astrologer_id)).await?;

    let profile = get_profile(&mut *tx, booking.astrologer_id)
        .await?
        .ok_or(ChatError::AstrologerNotFound)?;
    if !profile.status.accepts_bookings() {
        return Err(ChatError::AstrologerNotVerified);
    }

    let slots = active_slots_for_day(
        &mut *tx,
        booking.astrologer_id,
        day_of_week(window.start.date_naive()),
    )
    .await?;
    if !window_fits(&slots, window.start, window.end) {
        return Err(ChatError::OutsideAvailability);
    }

    if has_overlap(&mut tx, booking.astrologer_id, window.start, window.end).await? {
        return Err(ChatError::SlotAlreadyBooked);
    }

    let session = sqlx::query_as::<_, ChatSessionRecord>(&format!(
        r#"
        INSERT INTO chat_sessions
            (id, consumer_id, astrologer_id, scheduled_start, scheduled_end, status,
             price_per_minute_snapshot, platform_fee_pct_snapshot,
             astrologer_share_pct_snapshot, notes)
        VALUES ($1, $2, $3, $4, $5, 'requested', $6, $7, $8, $9)
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(uuidv7())
    .bind(booking.consumer_id)
    .bind(booking.astrologer_id)
    .bind(window.start)
    .bind(window.end)
    .bind(profile.price_per_minute)
    .bind(profile.platform_fee_pct)
    .bind(Decimal::ONE_HUNDRED - profile.platform_fee_pct)
    .bind(booking.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        chat_session_id = %session.id,
        consumer_id = %session.consumer_id,
        astrologer_id = %session.astrologer_id,
        "chat session requested"
    );
    Ok(session)
}

pub async fn find_session<'e>(
    db: impl PgExecutor<'e>,
    session_id: Uuid,
) -> Result<Option<ChatSessionRecord>, ChatError> {
    let row = sqlx::query_as::<_, ChatSessionRecord>(&format!(
        "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
    ))
    .bind(session_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Load a session on behalf of one of its participants.
pub async fn get_for_participant(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<ChatSessionRecord, ChatError> {
    let session = find_session(pool, session_id)
        .await?
        .ok_or(ChatError::SessionNotFound)?;
    if !session.is_participant(user_id) {
        return Err(ChatError::NotParticipant);
    }
    Ok(session)
}

/// Sessions where the user is consumer or astrologer, latest start first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    take: i64,
) -> Result<Vec<ChatSessionRecord>, ChatError> {
    let rows = sqlx::query_as::<_, ChatSessionRecord>(&format!(
        r#"
        SELECT {SESSION_COLUMNS} FROM chat_sessions
        WHERE consumer_id = $1 OR astrologer_id = $1
        ORDER BY scheduled_start DESC
        LIMIT $2
        "#
    ))
    .bind(user_id)
    .bind(take)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Apply `action` iff the session is in one of its source statuses and the
/// caller may perform it.
async fn conditional_transition(
    conn: &mut PgConnection,
    session_id: Uuid,
    caller: Uuid,
    action: SessionAction,
) -> Result<Option<ChatSessionRecord>, ChatError> {
    let caller_clause = if action.astrologer_only() {
        "astrologer_id = $2"
    } else {
        "(consumer_id = $2 OR astrologer_id = $2)"
    };
    let allowed: Vec<String> = action
        .allowed_from()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    let row = sqlx::query_as::<_, ChatSessionRecord>(&format!(
        r#"
        UPDATE chat_sessions
        SET status = $3, {column} = now()
        WHERE id = $1 AND {caller_clause} AND status = ANY($4)
        RETURNING {SESSION_COLUMNS}
        "#,
        column = action.timestamp_column(),
    ))
    .bind(session_id)
    .bind(caller)
    .bind(action.target().as_str())
    .bind(allowed)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Explain why a conditional transition matched nothing.
async fn transition_failure(
    conn: &mut PgConnection,
    session_id: Uuid,
    caller: Uuid,
    action: SessionAction,
) -> Result<ChatError, ChatError> {
    Ok(match find_session(conn, session_id).await? {
        None => ChatError::SessionNotFound,
        Some(s) if !s.is_participant(caller) => ChatError::NotParticipant,
        Some(s) => ChatError::InvalidTransition {
            action,
            current: s.status,
        },
    })
}

/// Assigned astrologer confirms a requested session. The overlap check is
/// repeated against already-confirmed sessions.
pub async fn accept(
    pool: &PgPool,
    session_id: Uuid,
    astrologer_id: Uuid,
) -> Result<ChatSessionRecord, ChatError> {
    let mut tx = pool.begin().await?;
    advisory_xact_lock(&mut tx, &booking_lock_key(astrologer_id)).await?;

    let confirmed_clash = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM chat_sessions c
            JOIN chat_sessions o
              ON o.astrologer_id = c.astrologer_id
             AND o.id <> c.id
             AND o.status IN ('accepted', 'active')
             AND o.scheduled_start < c.scheduled_end
             AND o.scheduled_end > c.scheduled_start
            WHERE c.id = $1 AND c.astrologer_id = $2 AND c.status = 'requested'
        )
        "#,
    )
    .bind(session_id)
    .bind(astrologer_id)
    .fetch_one(&mut *tx)
    .await?;
    if confirmed_clash {
        return Err(ChatError::SlotAlreadyBooked);
    }

    let Some(session) =
        conditional_transition(&mut tx, session_id, astrologer_id, SessionAction::Accept).await?
    else {
        return Err(
            transition_failure(&mut tx, session_id, astrologer_id, SessionAction::Accept).await?,
        );
    };

    tx.commit().await?;
    info!(chat_session_id = %session.id, "chat session accepted");
    Ok(session)
}

/// Either participant moves an accepted session to active.
pub async fn start(
    pool: &PgPool,
    session_id: Uuid,
    caller: Uuid,
) -> Result<ChatSessionRecord, ChatError> {
    simple_transition(pool, session_id, caller, SessionAction::Start).await
}

/// Either participant cancels a session that has not started.
pub async fn cancel(
    pool: &PgPool,
    session_id: Uuid,
    caller: Uuid,
) -> Result<ChatSessionRecord, ChatError> {
    simple_transition(pool, session_id, caller, SessionAction::Cancel).await
}

async fn simple_transition(
    pool: &PgPool,
    session_id: Uuid,
    caller: Uuid,
    action: SessionAction,
) -> Result<ChatSessionRecord, ChatError> {
    let mut conn = pool.acquire().await?;
    match conditional_transition(&mut conn, session_id, caller, action).await? {
        Some(session) => {
            info!(
                chat_session_id = %session.id,
                status = %session.status,
                "chat session transitioned"
            );
            Ok(session)
        }
        None => Err(transition_failure(&mut conn, session_id, caller, action).await?),
    }
}

/// Either participant ends an active (or accepted) session. The session is
/// settled in the same transaction.
pub async fn end(
    pool: &PgPool,
    session_id: Uuid,
    caller: Uuid,
    currency: &str,
) -> Result<(ChatSessionRecord, SettlementOutcome), ChatError> {
    let mut tx = pool.begin().await?;

    let Some(session) =
        conditional_transition(&mut tx, session_id, caller, SessionAction::End).await?
    else {
        return Err(transition_failure(&mut tx, session_id, caller, SessionAction::End).await?);
    };

    let outcome = record_settlement(&mut tx, &session, currency).await?;
    tx.commit().await?;

    info!(chat_session_id = %session.id, "chat session ended");
    Ok((session, outcome))
}
