//! Idempotent three-way settlement of an ended session.

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use super::BillingError;
use super::estimate::estimate;
use super::ledger::{NewLedgerEntry, append, has_settlement};
use crate::models::billing::{Estimate, LedgerEntryType};
use crate::models::chat::ChatSessionRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Recorded(Estimate),
    /// A consumer debit already exists for the session; nothing was written.
    AlreadySettled,
}

/// Post consumer debit, astrologer credit and platform commission for the
/// session, unless it is already settled.
///
/// Runs on the caller's transaction. The session row is locked first so two
/// concurrent settlements of the same session serialize on it.
pub async fn record_settlement(
    conn: &mut PgConnection,
    session: &ChatSessionRecord,
    currency: &str,
) -> Result<SettlementOutcome, BillingError> {
    sqlx::query("SELECT id FROM chat_sessions WHERE id = $1 FOR UPDATE")
        .bind(session.id)
        .execute(&mut *conn)
        .await?;

    if has_settlement(&mut *conn, session.id).await? {
        debug!(chat_session_id = %session.id, "settlement already recorded");
        return Ok(SettlementOutcome::AlreadySettled);
    }

    let est = estimate(session, currency);
    let meta = json!({
        "minutes": est.minutes,
        "pricePerMinute": est.price_per_minute,
        "platformFeePct": est.platform_fee_pct,
    });
    let entries = [
        (Some(session.consumer_id), LedgerEntryType::ConsumerDebit, est.total_amount),
        (Some(session.astrologer_id), LedgerEntryType::AstrologerCredit, est.astrologer_earnings),
        (None, LedgerEntryType::PlatformCommission, est.platform_commission),
    ];
    for (user_id, entry_type, amount) in entries {
        append(
            &mut *conn,
            &NewLedgerEntry {
                chat_session_id: Some(session.id),
                user_id,
                entry_type,
                amount,
                currency,
                meta: meta.clone(),
            },
        )
        .await?;
    }

    info!(
        chat_session_id = %session.id,
        total = %est.total_amount,
        commission = %est.platform_commission,
        currency,
        "settlement recorded"
    );
    Ok(SettlementOutcome::Recorded(est))
}

/// Settle a session in its own transaction.
pub async fn settle(
    pool: &PgPool,
    session: &ChatSessionRecord,
    currency: &str,
) -> Result<SettlementOutcome, BillingError> {
    let mut tx = pool.begin().await?;
    let outcome = record_settlement(&mut tx, session, currency).await?;
    tx.commit().await?;
    Ok(outcome)
}
