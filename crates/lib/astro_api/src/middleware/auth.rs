//! Authentication middleware: Bearer token extraction and JWT verification.

use astro_core::models::auth::{Principal, Role};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use super::usage_log::CallerIdentity;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::bearer_token;

/// Verified bearer identity, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub principal: Principal,
}

impl AuthenticatedUser {
    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.principal.has_role(role) {
            Ok(())
        } else {
            Err(AppError::forbidden("forbidden"))
        }
    }

    /// The organization claim. Tokens minted before the user had one carry none.
    pub fn org_id(&self) -> AppResult<Uuid> {
        self.principal
            .org_id
            .ok_or_else(|| AppError::unauthorized("missing_org"))
    }
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the JWT,
/// and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token =
        bearer_token(request.headers()).ok_or_else(|| AppError::unauthorized("missing_token"))?;

    let principal = state
        .tokens
        .verify_access_token(token)
        .and_then(|claims| claims.principal())
        .map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            AppError::unauthorized("invalid_token")
        })?;
    let user_id = principal
        .user_id()
        .ok_or_else(|| AppError::unauthorized("invalid_token"))?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id, principal });

    let mut response = next.run(request).await;
    response.extensions_mut().insert(CallerIdentity {
        api_key_id: None,
        user_id: Some(user_id),
    });
    Ok(response)
}
