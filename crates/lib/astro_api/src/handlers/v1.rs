//! Machine endpoints behind the API key gateway.

use astro_core::auth::usage;
use axum::Json;
use axum::extract::State;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::astrologers::{SlotResponse, public_slots};
use crate::AppState;
use crate::error::AppResult;
use crate::extract::AppPath;
use crate::middleware::api_key::ApiKeyContext;

pub const MARKETPLACE_READ_SCOPE: &str = "marketplace.read";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyContextResponse {
    pub api_key_id: Uuid,
    pub org_id: Uuid,
    pub scopes: Vec<String>,
    pub daily_quota: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayUsageResponse {
    pub api_key_id: Uuid,
    pub date_utc: NaiveDate,
    pub used: i64,
    pub daily_quota: Option<i32>,
}

/// `GET /v1/me`
pub async fn me_handler(
    axum::Extension(key): axum::Extension<ApiKeyContext>,
) -> Json<KeyContextResponse> {
    Json(KeyContextResponse {
        api_key_id: key.api_key_id,
        org_id: key.org_id,
        scopes: key.scopes.iter().map(str::to_owned).collect(),
        daily_quota: key.daily_quota,
    })
}

/// `GET /v1/usage/today`. The count includes the current request.
pub async fn usage_today_handler(
    State(state): State<AppState>,
    axum::Extension(key): axum::Extension<ApiKeyContext>,
) -> AppResult<Json<TodayUsageResponse>> {
    let today = Utc::now().date_naive();
    let used = usage::read_daily(&state.pool, key.api_key_id, today).await?;
    Ok(Json(TodayUsageResponse {
        api_key_id: key.api_key_id,
        date_utc: today,
        used,
        daily_quota: key.daily_quota,
    }))
}

/// `GET /v1/astrologers/{id}/availability` (scope `marketplace.read`)
pub async fn availability_handler(
    State(state): State<AppState>,
    axum::Extension(key): axum::Extension<ApiKeyContext>,
    AppPath(astrologer_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<SlotResponse>>> {
    key.require_scope(MARKETPLACE_READ_SCOPE)?;
    Ok(Json(public_slots(&state, astrologer_id).await?))
}
