//! Astrologer payouts: `requested -> paid | rejected`.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::BillingError;
use super::estimate::validate_amount;
use super::ledger::{NewLedgerEntry, append, user_balance};
use crate::locks::advisory_xact_lock;
use crate::models::billing::{LedgerEntryType, PayoutRecord, PayoutStatus};
use crate::uuid::uuidv7;

const PAYOUT_COLUMNS: &str = "id, astrologer_user_id, amount, currency, status, notes, \
                              requested_at, paid_at, rejected_at";

const MAX_NOTES_LEN: usize = 1000;

/// Sum of payouts requested but not yet paid or rejected.
async fn outstanding<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    currency: &str,
) -> Result<Decimal, BillingError> {
    let amount = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(amount), 0) FROM payouts \
         WHERE astrologer_user_id = $1 AND currency = $2 AND status = 'requested'",
    )
    .bind(user_id)
    .bind(currency)
    .fetch_one(db)
    .await?;
    Ok(amount)
}

/// Request a payout of at most the available balance (ledger balance minus
/// outstanding requests). Requests by the same user are serialized.
pub async fn request_payout(
    pool: &PgPool,
    user_id: Uuid,
    amount: Decimal,
    currency: &str,
    notes: Option<&str>,
) -> Result<PayoutRecord, BillingError> {
    validate_amount(amount)?;
    if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(BillingError::Validation("invalid_notes"));
    }

    let mut tx = pool.begin().await?;
    advisory_xact_lock(&mut tx, &format!("payout:{user_id}")).await?;

    let balance = user_balance(&mut *tx, user_id, currency).await?;
    let available = balance - outstanding(&mut *tx, user_id, currency).await?;
    if amount > available {
        return Err(BillingError::InsufficientBalance {
            available: available.max(Decimal::ZERO),
            requested: amount,
        });
    }

    let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
        r#"
        INSERT INTO payouts (id, astrologer_user_id, amount, currency, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {PAYOUT_COLUMNS}
        "#
    ))
    .bind(uuidv7())
    .bind(user_id)
    .bind(amount)
    .bind(currency)
    .bind(notes.map(str::trim).filter(|n| !n.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(payout_id = %payout.id, %user_id, %amount, currency, "payout requested");
    Ok(payout)
}

pub async fn find_payout<'e>(
    db: impl PgExecutor<'e>,
    payout_id: Uuid,
) -> Result<Option<PayoutRecord>, BillingError> {
    let row = sqlx::query_as::<_, PayoutRecord>(&format!(
        "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1"
    ))
    .bind(payout_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<PayoutRecord>, BillingError> {
    let rows = sqlx::query_as::<_, PayoutRecord>(&format!(
        "SELECT {PAYOUT_COLUMNS} FROM payouts \
         WHERE astrologer_user_id = $1 ORDER BY requested_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All payouts, optionally filtered by status, newest first.
pub async fn list_all(
    pool: &PgPool,
    status: Option<PayoutStatus>,
    take: i64,
) -> Result<Vec<PayoutRecord>, BillingError> {
    let rows = sqlx::query_as::<_, PayoutRecord>(&format!(
        "SELECT {PAYOUT_COLUMNS} FROM payouts \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY requested_at DESC LIMIT $2"
    ))
    .bind(status.map(PayoutStatus::as_str))
    .bind(take)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Explain why a guarded payout update matched nothing.
async fn transition_failure<'e>(
    db: impl PgExecutor<'e>,
    payout_id: Uuid,
) -> Result<BillingError, BillingError> {
    Ok(match find_payout(db, payout_id).await? {
        None => BillingError::PayoutNotFound,
        Some(p) => BillingError::InvalidPayoutTransition { current: p.status },
    })
}

/// Admin action: `requested -> paid`, posting the payout ledger row in the
/// same transaction.
pub async fn mark_paid(pool: &PgPool, payout_id: Uuid) -> Result<PayoutRecord, BillingError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, PayoutRecord>(&format!(
        r#"
        UPDATE payouts SET status = 'paid', paid_at = now()
        WHERE id = $1 AND status = 'requested'
        RETURNING {PAYOUT_COLUMNS}
        "#
    ))
    .bind(payout_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(payout) = updated else {
        return Err(transition_failure(&mut *tx, payout_id).await?);
    };

    append(
        &mut tx,
        &NewLedgerEntry {
            chat_session_id: None,
            user_id: Some(payout.astrologer_user_id),
            entry_type: LedgerEntryType::Payout,
            amount: payout.amount,
            currency: &payout.currency,
            meta: json!({ "payoutId": payout.id }),
        },
    )
    .await?;

    tx.commit().await?;
    info!(payout_id = %payout.id, amount = %payout.amount, "payout marked paid");
    Ok(payout)
}

/// Admin action: `requested -> rejected`. Nothing is posted to the ledger.
pub async fn reject(pool: &PgPool, payout_id: Uuid) -> Result<PayoutRecord, BillingError> {
    let updated = sqlx::query_as::<_, PayoutRecord>(&format!(
        r#"
        UPDATE payouts SET status = 'rejected', rejected_at = now()
        WHERE id = $1 AND status = 'requested'
        RETURNING {PAYOUT_COLUMNS}
        "#
    ))
    .bind(payout_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(payout) => Ok(payout),
        None => Err(transition_failure(pool, payout_id).await?),
    }
}
