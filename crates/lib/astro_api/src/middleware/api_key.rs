//! API key gateway, first stage: authenticate `X-Api-Key: <prefix>.<secret>`.

use astro_core::auth::api_keys::{
    API_KEY_HEADER, ApiKeyHeaderError, find_active_by_prefix, parse_api_key, touch_last_used,
    verify_secret,
};
use astro_core::models::auth::{Principal, ScopeSet};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::usage_log::CallerIdentity;
use crate::AppState;
use crate::error::{AppError, AppResult};

/// Request-scoped context of a validated API key.
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub api_key_id: Uuid,
    pub org_id: Uuid,
    pub scopes: ScopeSet,
    pub daily_quota: Option<i32>,
    pub principal: Principal,
}

impl ApiKeyContext {
    pub fn require_scope(&self, scope: &str) -> AppResult<()> {
        if self.principal.has_scope(scope) {
            Ok(())
        } else {
            Err(AppError::forbidden("missing_scope"))
        }
    }
}

/// Axum middleware: resolves the key by prefix, checks the secret against the
/// stored hash, and injects `ApiKeyContext`. Last-used is touched in the
/// background.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (prefix, secret) = {
        let raw = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        let (prefix, secret) = parse_api_key(raw).map_err(|e| match e {
            ApiKeyHeaderError::Missing => AppError::unauthorized("missing_api_key"),
            ApiKeyHeaderError::Malformed => AppError::unauthorized("invalid_api_key_format"),
        })?;
        (prefix.to_owned(), secret.to_owned())
    };

    let record = find_active_by_prefix(&state.pool, &prefix)
        .await?
        .ok_or_else(|| {
            debug!(%prefix, "unknown or inactive api key prefix");
            AppError::unauthorized("invalid_api_key")
        })?;

    let checked = record.clone();
    let valid = tokio::task::spawn_blocking(move || verify_secret(&secret, &checked))
        .await
        .map_err(|e| AppError::Internal(format!("api key verification task: {e}")))??;
    if !valid {
        debug!(api_key_id = %record.id, "api key secret mismatch");
        return Err(AppError::unauthorized("invalid_api_key"));
    }

    let scopes = record.scopes();
    let context = ApiKeyContext {
        api_key_id: record.id,
        org_id: record.org_id,
        principal: Principal::for_api_key(record.id, record.org_id, scopes.clone()),
        scopes,
        daily_quota: record.daily_quota,
    };
    request.extensions_mut().insert(context);

    let pool = state.pool.clone();
    let key_id = record.id;
    tokio::spawn(async move {
        if let Err(e) = touch_last_used(&pool, key_id).await {
            warn!(api_key_id = %key_id, error = %e, "failed to touch api key last-used");
        }
    });

    let mut response = next.run(request).await;
    response.extensions_mut().insert(CallerIdentity {
        api_key_id: Some(key_id),
        user_id: None,
    });
    Ok(response)
}
