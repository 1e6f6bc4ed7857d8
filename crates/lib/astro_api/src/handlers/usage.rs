//! Usage counters for the caller's organization.

use astro_core::auth::usage;
use astro_core::models::auth::UsageCounterRecord;
use axum::Json;
use axum::extract::State;
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::AppQuery;
use crate::middleware::auth::AuthenticatedUser;

const DEFAULT_SPAN_DAYS: u64 = 6;
const MAX_SPAN_DAYS: i64 = 366;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageQuery {
    pub api_key_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageResponse {
    pub api_key_id: Option<Uuid>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<UsageCounterRecord>,
}

/// Resolve the inclusive day range. Defaults to the last week ending today.
pub fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or(today);
    let from = match from {
        Some(from) => from,
        None => to
            .checked_sub_days(Days::new(DEFAULT_SPAN_DAYS))
            .ok_or_else(|| AppError::validation("invalid_range"))?,
    };
    if to < from || (to - from).num_days() > MAX_SPAN_DAYS {
        return Err(AppError::validation("invalid_range"));
    }
    Ok((from, to))
}

/// `GET /usage/daily?apiKeyId&from&to`
pub async fn daily_usage_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<DailyUsageQuery>,
) -> AppResult<Json<DailyUsageResponse>> {
    let org_id = user.org_id()?;
    let (from, to) = resolve_range(query.from, query.to, Utc::now().date_naive())?;
    let days = usage::daily_range(&state.pool, org_id, query.api_key_id, from, to).await?;
    Ok(Json(DailyUsageResponse {
        api_key_id: query.api_key_id,
        from,
        to,
        days,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_defaults_to_trailing_week() {
        let (from, to) = resolve_range(None, None, day(2026, 3, 10)).unwrap();
        assert_eq!(from, day(2026, 3, 4));
        assert_eq!(to, day(2026, 3, 10));
    }

    #[test]
    fn inverted_or_oversized_range_is_rejected() {
        let today = day(2026, 3, 10);
        let err = resolve_range(Some(day(2026, 3, 11)), Some(day(2026, 3, 10)), today).unwrap_err();
        assert_eq!(err.code(), "invalid_range");
        assert!(resolve_range(Some(day(2024, 1, 1)), Some(day(2026, 1, 1)), today).is_err());
        assert!(resolve_range(Some(day(2026, 3, 10)), Some(day(2026, 3, 10)), today).is_ok());
    }
}
