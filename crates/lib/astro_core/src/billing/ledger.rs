//! Ledger rows and derived balances.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::BillingError;
use crate::models::billing::{LedgerEntryRecord, LedgerEntryType};
use crate::uuid::uuidv7;

const LEDGER_COLUMNS: &str =
    "id, chat_session_id, user_id, entry_type, amount, currency, created_at, meta";

/// A ledger row about to be appended.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry<'a> {
    pub chat_session_id: Option<Uuid>,
    /// `None` posts to the platform account.
    pub user_id: Option<Uuid>,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub currency: &'a str,
    pub meta: serde_json::Value,
}

pub async fn append(
    conn: &mut PgConnection,
    entry: &NewLedgerEntry<'_>,
) -> Result<LedgerEntryRecord, BillingError> {
    let row = sqlx::query_as::<_, LedgerEntryRecord>(&format!(
        r#"
        INSERT INTO ledger_transactions
            (id, chat_session_id, user_id, entry_type, amount, currency, meta)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {LEDGER_COLUMNS}
        "#
    ))
    .bind(uuidv7())
    .bind(entry.chat_session_id)
    .bind(entry.user_id)
    .bind(entry.entry_type.as_str())
    .bind(entry.amount)
    .bind(entry.currency)
    .bind(&entry.meta)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// A user's ledger, newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    take: i64,
) -> Result<Vec<LedgerEntryRecord>, BillingError> {
    let rows = sqlx::query_as::<_, LedgerEntryRecord>(&format!(
        "SELECT {LEDGER_COLUMNS} FROM ledger_transactions \
         WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(take)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Rows posted for one session, in posting order.
pub async fn list_for_session(
    pool: &PgPool,
    chat_session_id: Uuid,
) -> Result<Vec<LedgerEntryRecord>, BillingError> {
    let rows = sqlx::query_as::<_, LedgerEntryRecord>(&format!(
        "SELECT {LEDGER_COLUMNS} FROM ledger_transactions \
         WHERE chat_session_id = $1 ORDER BY id"
    ))
    .bind(chat_session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Whether the session has already been settled.
pub async fn has_settlement<'e>(
    db: impl PgExecutor<'e>,
    chat_session_id: Uuid,
) -> Result<bool, BillingError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM ledger_transactions \
         WHERE chat_session_id = $1 AND entry_type = 'consumer_debit')",
    )
    .bind(chat_session_id)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

/// `Σ astrologer_credit − Σ consumer_debit − Σ payout` for one user and currency.
pub async fn user_balance<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    currency: &str,
) -> Result<Decimal, BillingError> {
    let balance = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(CASE entry_type
                WHEN 'astrologer_credit' THEN amount
                WHEN 'consumer_debit' THEN -amount
                WHEN 'payout' THEN -amount
                ELSE 0
            END), 0)
        FROM ledger_transactions
        WHERE user_id = $1 AND currency = $2
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .fetch_one(db)
    .await?;
    Ok(balance)
}

/// `Σ platform_commission − Σ payout_platform_expense` on the platform account.
pub async fn platform_balance<'e>(
    db: impl PgExecutor<'e>,
    currency: &str,
) -> Result<Decimal, BillingError> {
    let balance = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(CASE entry_type
                WHEN 'platform_commission' THEN amount
                WHEN 'payout_platform_expense' THEN -amount
                ELSE 0
            END), 0)
        FROM ledger_transactions
        WHERE user_id IS NULL AND currency = $1
        "#,
    )
    .bind(currency)
    .fetch_one(db)
    .await?;
    Ok(balance)
}
