//! Response bodies shared across handlers.

use astro_core::auth::jwt::IssuedTokens;
use astro_core::models::auth::ApiKeyRecord;
use astro_core::models::chat::ChatStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Access token plus expiry instants. The refresh token itself only travels
/// in the cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub access_token_expires_utc: DateTime<Utc>,
    pub refresh_token_expires_utc: DateTime<Utc>,
}

impl From<&IssuedTokens> for TokenResponse {
    fn from(tokens: &IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            token_type: "Bearer",
            access_token_expires_utc: tokens.access_expires_at,
            refresh_token_expires_utc: tokens.refresh_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Result of a session state transition.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub status: ChatStatus,
}

impl From<ChatStatus> for StatusResponse {
    fn from(status: ChatStatus) -> Self {
        Self { ok: true, status }
    }
}

/// API key as listed to its organization. Never carries the secret hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub api_key_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    pub daily_quota: Option<i32>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub last_used_utc: Option<DateTime<Utc>>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl From<&ApiKeyRecord> for ApiKeySummary {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            api_key_id: record.id,
            name: record.name.clone(),
            prefix: record.prefix.clone(),
            scopes: record.scopes().iter().map(str::to_owned).collect(),
            daily_quota: record.daily_quota,
            is_active: record.is_active,
            created_utc: record.created_at,
            last_used_utc: record.last_used_at,
            revoked_utc: record.revoked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn token_response_omits_refresh_token() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let tokens = IssuedTokens {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            access_expires_at: at,
            refresh_expires_at: at,
        };
        let body = serde_json::to_value(TokenResponse::from(&tokens)).unwrap();
        assert_eq!(body["accessToken"], "access");
        assert_eq!(body["tokenType"], "Bearer");
        assert!(body.get("refreshToken").is_none());
        assert!(body.get("refreshTokenExpiresUtc").is_some());
    }

    #[test]
    fn status_response_uses_wire_status() {
        let body = serde_json::to_value(StatusResponse::from(ChatStatus::Accepted)).unwrap();
        assert_eq!(body, serde_json::json!({ "ok": true, "status": "accepted" }));
    }
}
