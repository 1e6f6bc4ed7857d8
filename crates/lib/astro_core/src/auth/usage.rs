//! Daily usage counters, quota decisions and the request log.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{UsageCounterRecord, UsageLogEntry};

/// Path prefixes whose requests are written to the usage log.
pub const LOGGED_PATH_PREFIXES: &[&str] = &["/v1", "/auth", "/api-keys"];

pub fn should_log_path(path: &str) -> bool {
    LOGGED_PATH_PREFIXES.iter().any(|prefix| {
        path == *prefix || path.starts_with(&format!("{prefix}/"))
    })
}

/// Outcome of comparing a post-increment counter against a key's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The key has no quota (unset or zero).
    Unlimited,
    Allowed { quota: i64, used: i64 },
    Exceeded { quota: i64, used: i64 },
}

impl QuotaDecision {
    /// The quota to enforce, if any. Zero and negative values disable it.
    pub fn effective_quota(daily_quota: Option<i32>) -> Option<i64> {
        daily_quota.filter(|q| *q > 0).map(i64::from)
    }

    pub fn evaluate(daily_quota: Option<i32>, used: i64) -> Self {
        match Self::effective_quota(daily_quota) {
            None => Self::Unlimited,
            Some(quota) if used > quota => Self::Exceeded { quota, used },
            Some(quota) => Self::Allowed { quota, used },
        }
    }
}

/// Increment today's counter and return the post-increment value, in one
/// statement so concurrent requests never lose an update.
pub async fn increment_daily(
    pool: &PgPool,
    api_key_id: Uuid,
    date_utc: NaiveDate,
) -> Result<i64, AuthError> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO api_usage_counters (api_key_id, date_utc, request_count)
        VALUES ($1, $2, 1)
        ON CONFLICT (api_key_id, date_utc)
        DO UPDATE SET request_count = api_usage_counters.request_count + 1
        RETURNING request_count
        "#,
    )
    .bind(api_key_id)
    .bind(date_utc)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn read_daily(
    pool: &PgPool,
    api_key_id: Uuid,
    date_utc: NaiveDate,
) -> Result<i64, AuthError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT request_count FROM api_usage_counters WHERE api_key_id = $1 AND date_utc = $2",
    )
    .bind(api_key_id)
    .bind(date_utc)
    .fetch_optional(pool)
    .await?;
    Ok(count.unwrap_or(0))
}

/// Per-day counters for the org's keys between `from` and `to` inclusive,
/// optionally narrowed to one key.
pub async fn daily_range(
    pool: &PgPool,
    org_id: Uuid,
    api_key_id: Option<Uuid>,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<UsageCounterRecord>, AuthError> {
    let rows = sqlx::query_as::<_, UsageCounterRecord>(
        r#"
        SELECT c.api_key_id, c.date_utc, c.request_count
        FROM api_usage_counters c
        JOIN api_keys k ON k.id = c.api_key_id
        WHERE k.org_id = $1
          AND ($2::uuid IS NULL OR c.api_key_id = $2)
          AND c.date_utc BETWEEN $3 AND $4
        ORDER BY c.date_utc, c.api_key_id
        "#,
    )
    .bind(org_id)
    .bind(api_key_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn append_log(pool: &PgPool, entry: &UsageLogEntry) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        INSERT INTO api_usage_logs
            (api_key_id, user_id, method, path, status_code, duration_ms, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.api_key_id)
    .bind(entry.user_id)
    .bind(&entry.method)
    .bind(&entry.path)
    .bind(entry.status_code)
    .bind(entry.duration_ms)
    .bind(entry.ip_address.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}
