//! Pricing arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use super::BillingError;
use crate::models::billing::Estimate;
use crate::models::chat::ChatSessionRecord;

/// Scheduled minutes, rounded up, never less than one.
pub fn billable_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = (end - start).num_seconds();
    if seconds <= 0 {
        return 1;
    }
    ((seconds + 59) / 60).max(1)
}

/// Round to cents, midpoint to even.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Billed amount for a session, computed from its snapshots.
pub fn estimate(session: &ChatSessionRecord, currency: &str) -> Estimate {
    let minutes = billable_minutes(session.scheduled_start, session.scheduled_end);
    let total = round_money(session.price_per_minute_snapshot * Decimal::from(minutes));
    let commission =
        round_money(total * session.platform_fee_pct_snapshot / Decimal::ONE_HUNDRED);
    Estimate {
        chat_session_id: session.id,
        minutes,
        currency: currency.to_string(),
        price_per_minute: session.price_per_minute_snapshot,
        platform_fee_pct: session.platform_fee_pct_snapshot,
        total_amount: total,
        platform_commission: commission,
        astrologer_earnings: total - commission,
    }
}

/// Upper-cased three-letter currency code, or `default` when absent.
pub fn normalize_currency(raw: Option<&str>, default: &str) -> Result<String, BillingError> {
    let code = raw
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default)
        .to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(BillingError::Validation("invalid_currency"));
    }
    Ok(code)
}

/// Positive amount with at most two decimal places that fits a ledger
/// `NUMERIC(14, 2)` column.
pub fn validate_amount(amount: Decimal) -> Result<(), BillingError> {
    let max_amount = Decimal::new(99_999_999_999_999, 2);
    if amount <= Decimal::ZERO || amount > max_amount || amount.normalize().scale() > 2 {
        return Err(BillingError::Validation("invalid_amount"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::models::chat::ChatStatus;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn session(price: &str, fee_pct: &str, minutes: i64) -> ChatSessionRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        ChatSessionRecord {
            id: Uuid::now_v7(),
            consumer_id: Uuid::now_v7(),
            astrologer_id: Uuid::now_v7(),
            scheduled_start: start,
            scheduled_end: start + Duration::minutes(minutes),
            status: ChatStatus::Ended,
            price_per_minute_snapshot: dec(price),
            platform_fee_pct_snapshot: dec(fee_pct),
            astrologer_share_pct_snapshot: Decimal::ONE_HUNDRED - dec(fee_pct),
            notes: None,
            created_at: start,
            accepted_at: None,
            started_at: None,
            ended_at: None,
            canceled_at: None,
        }
    }

    #[test]
    fn fifteen_minutes_at_ten_with_twenty_percent_fee() {
        let est = estimate(&session("10.00", "20", 15), "INR");
        assert_eq!(est.minutes, 15);
        assert_eq!(est.total_amount, dec("150.00"));
        assert_eq!(est.platform_commission, dec("30.00"));
        assert_eq!(est.astrologer_earnings, dec("120.00"));
        assert_eq!(est.currency, "INR");
    }

    #[test]
    fn shares_always_add_up_to_total() {
        for (price, fee, minutes) in [("7.33", "30", 17), ("0.99", "12.5", 5), ("49.99", "33.33", 240)] {
            let est = estimate(&session(price, fee, minutes), "INR");
            assert_eq!(est.platform_commission + est.astrologer_earnings, est.total_amount);
            assert!(est.astrologer_earnings >= Decimal::ZERO);
        }
    }

    #[test]
    fn commission_rounds_half_to_even() {
        // 0.25 * 10% = 0.025 -> 0.02; 0.35 * 10% = 0.035 -> 0.04.
        assert_eq!(round_money(dec("0.025")), dec("0.02"));
        assert_eq!(round_money(dec("0.035")), dec("0.04"));
        let est = estimate(&session("0.05", "10", 5), "INR");
        assert_eq!(est.total_amount, dec("0.25"));
        assert_eq!(est.platform_commission, dec("0.02"));
        assert_eq!(est.astrologer_earnings, dec("0.23"));
    }

    #[test]
    fn minutes_round_up_with_floor_of_one() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(billable_minutes(start, start + Duration::seconds(90)), 2);
        assert_eq!(billable_minutes(start, start + Duration::seconds(60)), 1);
        assert_eq!(billable_minutes(start, start), 1);
    }

    #[test]
    fn currency_normalization() {
        assert_eq!(normalize_currency(None, "INR").unwrap(), "INR");
        assert_eq!(normalize_currency(Some(" usd "), "INR").unwrap(), "USD");
        assert!(normalize_currency(Some("rupees"), "INR").is_err());
        assert!(normalize_currency(Some("U5D"), "INR").is_err());
    }

    #[test]
    fn amount_validation() {
        assert!(validate_amount(dec("10.50")).is_ok());
        assert!(validate_amount(dec("10.500")).is_ok());
        assert!(validate_amount(dec("0")).is_err());
        assert!(validate_amount(dec("-1")).is_err());
        assert!(validate_amount(dec("1.005")).is_err());
        assert!(validate_amount(dec("999999999999.99")).is_ok());
        assert!(validate_amount(dec("1000000000000.00")).is_err());
    }
}
