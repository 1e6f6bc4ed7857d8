//! Application error types.
//!
//! Every failure leaves the API as `{"error": <machine_code>, ...context}`.
//! Core errors are mapped here, once, so handlers can use `?` throughout.

use astro_core::auth::AuthError;
use astro_core::auth::google::GoogleError;
use astro_core::billing::BillingError;
use astro_core::chat::ChatError;
use astro_core::marketplace::MarketplaceError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, warn};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

pub const QUOTA_HEADER: &str = "x-quota-daily";
pub const USAGE_HEADER: &str = "x-usage-daily";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {code}")]
    Validation {
        code: String,
        message: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A state guard failed or the resource already exists. `context` is
    /// merged into the response body.
    #[error("Conflict: {code}")]
    Conflict { code: String, context: Map<String, Value> },

    #[error("Daily quota of {quota} exceeded ({used} used)")]
    RateLimited { quota: i64, used: i64 },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn validation(code: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: None,
        }
    }

    pub fn unauthorized(code: impl Into<String>) -> Self {
        Self::Unauthorized(code.into())
    }

    pub fn forbidden(code: impl Into<String>) -> Self {
        Self::Forbidden(code.into())
    }

    pub fn not_found(code: impl Into<String>) -> Self {
        Self::NotFound(code.into())
    }

    pub fn conflict(code: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            context: Map::new(),
        }
    }

    /// Conflict carrying extra fields, e.g. the current status.
    pub fn conflict_with(code: impl Into<String>, context: Value) -> Self {
        let context = match context {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::Conflict {
            code: code.into(),
            context,
        }
    }

    /// The stable machine code sent to clients.
    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Unauthorized(code)
            | Self::Forbidden(code)
            | Self::NotFound(code)
            | Self::Unavailable(code) => code,
            Self::Conflict { code, .. } => code,
            Self::RateLimited { .. } => "quota_exceeded",
            Self::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = Map::new();
        body.insert("error".into(), Value::String(self.code().to_string()));

        match &self {
            Self::Validation {
                message: Some(message),
                ..
            } => {
                body.insert("message".into(), Value::String(message.clone()));
            }
            Self::Conflict { context, .. } => {
                for (k, v) in context {
                    body.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            Self::RateLimited { quota, used } => {
                body.insert("quota".into(), json!(quota));
                body.insert("used".into(), json!(used));
            }
            Self::Internal(detail) => {
                error!(error = %detail, "internal error");
            }
            _ => {}
        }

        let mut response = (status, Json(Value::Object(body))).into_response();
        if let Self::RateLimited { quota, used } = self {
            let headers = response.headers_mut();
            headers.insert(QUOTA_HEADER, HeaderValue::from(quota));
            headers.insert(USAGE_HEADER, HeaderValue::from(used));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(format!("database: {e}"))
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::unauthorized("invalid_credentials"),
            AuthError::TokenError(_) => AppError::unauthorized("invalid_token"),
            AuthError::ValidationError(message) => AppError::Validation {
                code: "validation_error".into(),
                message: Some(message),
            },
            AuthError::EmailTaken => AppError::conflict("email_already_exists"),
            AuthError::UnknownRole(role) => {
                AppError::Internal(format!("role '{role}' is not configured"))
            }
            AuthError::DbError(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<GoogleError> for AppError {
    fn from(e: GoogleError) -> Self {
        match e {
            GoogleError::NotConfigured => AppError::Unavailable(e.code().into()),
            GoogleError::InvalidRequest => AppError::validation(e.code()),
            GoogleError::ExchangeFailed(ref detail) | GoogleError::InvalidIdToken(ref detail) => {
                warn!(code = e.code(), %detail, "google sign-in failed");
                AppError::unauthorized(e.code())
            }
            GoogleError::MissingClaims
            | GoogleError::EmailNotVerified
            | GoogleError::NonceMismatch => AppError::unauthorized(e.code()),
        }
    }
}

impl From<MarketplaceError> for AppError {
    fn from(e: MarketplaceError) -> Self {
        match e {
            MarketplaceError::Validation(code) => AppError::validation(code),
            MarketplaceError::AlreadyApplied => AppError::conflict("already_applied"),
            MarketplaceError::ProfileNotFound => AppError::not_found("astrologer_not_found"),
            MarketplaceError::SlotNotFound => AppError::not_found("slot_not_found"),
            MarketplaceError::InvalidStatus(current) => {
                AppError::conflict_with("invalid_status", json!({ "status": current }))
            }
            MarketplaceError::NotVerified => AppError::validation("not_verified"),
            MarketplaceError::Auth(e) => AppError::from(e),
            MarketplaceError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Validation(code) => AppError::validation(code),
            ChatError::AstrologerNotFound => AppError::not_found("astrologer_not_found"),
            ChatError::AstrologerNotVerified => AppError::validation("astrologer_not_verified"),
            ChatError::OutsideAvailability => AppError::conflict("outside_availability"),
            ChatError::SlotAlreadyBooked => AppError::conflict("slot_already_booked"),
            ChatError::SessionNotFound => AppError::not_found("session_not_found"),
            ChatError::NotParticipant => AppError::forbidden("not_participant"),
            ChatError::InvalidTransition { action, current } => {
                AppError::conflict_with(action.failure_code(), json!({ "status": current }))
            }
            ChatError::NotAcceptingMessages(current) => {
                AppError::conflict_with("session_not_active", json!({ "status": current }))
            }
            ChatError::Marketplace(e) => AppError::from(e),
            ChatError::Billing(e) => AppError::from(e),
            ChatError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Validation(code) => AppError::validation(code),
            BillingError::InsufficientBalance {
                available,
                requested,
            } => AppError::conflict_with(
                "insufficient_balance",
                json!({ "available": available, "requested": requested }),
            ),
            BillingError::PayoutNotFound => AppError::not_found("payout_not_found"),
            BillingError::InvalidPayoutTransition { current } => {
                AppError::conflict_with("invalid_payout_status", json!({ "status": current }))
            }
            BillingError::DbError(e) => AppError::from(e),
        }
    }
}
