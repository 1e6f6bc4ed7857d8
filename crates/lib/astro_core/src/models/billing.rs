//! Ledger, payout and estimate models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Ledger amounts are positive magnitudes; the entry type decides the sign
    /// when balances are computed.
    pub enum LedgerEntryType {
        ConsumerDebit => "consumer_debit",
        AstrologerCredit => "astrologer_credit",
        PlatformCommission => "platform_commission",
        Payout => "payout",
        PayoutPlatformExpense => "payout_platform_expense",
    }
}

text_enum! {
    pub enum PayoutStatus {
        Requested => "requested",
        Paid => "paid",
        Rejected => "rejected",
    }
}

/// Immutable ledger row. `user_id = None` is the platform account.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryRecord {
    #[serde(rename = "ledgerTransactionId")]
    pub id: Uuid,
    pub chat_session_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "createdUtc")]
    pub created_at: DateTime<Utc>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    #[serde(rename = "payoutId")]
    pub id: Uuid,
    pub astrologer_user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PayoutStatus,
    pub notes: Option<String>,
    #[serde(rename = "requestedUtc")]
    pub requested_at: DateTime<Utc>,
    #[serde(rename = "paidUtc")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(rename = "rejectedUtc")]
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Billed amount for a session, split between astrologer and platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub chat_session_id: Uuid,
    pub minutes: i64,
    pub currency: String,
    pub price_per_minute: Decimal,
    pub platform_fee_pct: Decimal,
    pub total_amount: Decimal,
    pub platform_commission: Decimal,
    pub astrologer_earnings: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub user_id: Option<Uuid>,
    pub currency: String,
    pub balance: Decimal,
}
