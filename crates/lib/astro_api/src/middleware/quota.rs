//! API key gateway, second stage: daily quota.

use astro_core::auth::usage::{QuotaDecision, increment_daily};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::info;

use super::api_key::ApiKeyContext;
use crate::AppState;
use crate::error::{AppError, QUOTA_HEADER, USAGE_HEADER};

/// Axum middleware: counts the request against today's (UTC) counter and
/// rejects it with 429 once the post-increment count exceeds the quota.
/// Usage headers are set on every metered response.
pub async fn enforce_quota(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = request
        .extensions()
        .get::<ApiKeyContext>()
        .cloned()
        .ok_or_else(|| AppError::Internal("quota stage reached without an api key".into()))?;

    if QuotaDecision::effective_quota(context.daily_quota).is_none() {
        return Ok(next.run(request).await);
    }

    let used = increment_daily(&state.pool, context.api_key_id, Utc::now().date_naive()).await?;
    match QuotaDecision::evaluate(context.daily_quota, used) {
        QuotaDecision::Exceeded { quota, used } => {
            info!(api_key_id = %context.api_key_id, quota, used, "daily quota exceeded");
            Err(AppError::RateLimited { quota, used })
        }
        QuotaDecision::Allowed { quota, used } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(QUOTA_HEADER, HeaderValue::from(quota));
            headers.insert(USAGE_HEADER, HeaderValue::from(used));
            Ok(response)
        }
        QuotaDecision::Unlimited => Ok(next.run(request).await),
    }
}
