//! API key management for the caller's organization.

use astro_core::auth::api_keys;
use astro_core::models::auth::ScopeSet;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{ApiKeySummary, OkResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub daily_quota: Option<i32>,
}

/// Returned once at creation. `secret` is the full `<prefix>.<secret>` key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyResponse {
    pub api_key_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub secret: String,
    pub scopes: Vec<String>,
    pub daily_quota: Option<i32>,
    pub created_utc: DateTime<Utc>,
}

/// `POST /api-keys`
pub async fn create_api_key_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    let org_id = user.org_id()?;
    let scopes = ScopeSet::normalize(&body.scopes);
    let created =
        api_keys::create_api_key(&state.pool, org_id, &body.name, &scopes, body.daily_quota)
            .await?;
    info!(api_key_id = %created.record.id, %org_id, "api key created");

    let record = created.record;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key_id: record.id,
            name: record.name,
            prefix: record.prefix,
            secret: created.key,
            scopes: scopes.iter().map(str::to_owned).collect(),
            daily_quota: record.daily_quota,
            created_utc: record.created_at,
        }),
    ))
}

/// `GET /api-keys`
pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<ApiKeySummary>>> {
    let org_id = user.org_id()?;
    let keys = api_keys::list_api_keys(&state.pool, org_id).await?;
    Ok(Json(keys.iter().map(ApiKeySummary::from).collect()))
}

/// `DELETE /api-keys/{id}`. Keys of other organizations read as missing.
pub async fn revoke_api_key_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppPath(key_id): AppPath<Uuid>,
) -> AppResult<Json<OkResponse>> {
    let org_id = user.org_id()?;
    if !api_keys::revoke_api_key(&state.pool, org_id, key_id).await? {
        return Err(AppError::not_found("not_found"));
    }
    info!(api_key_id = %key_id, %org_id, "api key revoked");
    Ok(Json(OkResponse::ok()))
}
