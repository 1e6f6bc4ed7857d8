//! Access-token issuing and verification.
//!
//! Access tokens are short-lived HS256 JWTs. Refresh tokens are opaque random
//! strings that only the session store can interpret.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::AuthError;
use super::secrets::random_token;
use crate::models::auth::{AccessClaims, Principal, Role, RoleSet, ScopeSet, Subject};

/// Entropy of a refresh token, in bytes.
const REFRESH_TOKEN_BYTES: usize = 48;

/// Token issuer settings, read once at startup.
#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

/// Identity embedded into a freshly minted access token.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub email: &'a str,
    pub roles: &'a RoleSet,
    pub scopes: &'a ScopeSet,
}

/// Result of `TokenIssuer::create_tokens`. `refresh_token` is the only copy
/// of the plaintext refresh secret.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_ttl: Duration::minutes(settings.access_token_minutes),
            refresh_ttl: Duration::days(settings.refresh_token_days),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token and a new opaque refresh token.
    pub fn create_tokens(&self, subject: &TokenSubject<'_>) -> Result<IssuedTokens, AuthError> {
        self.create_tokens_at(subject, Utc::now())
    }

    pub(crate) fn create_tokens_at(
        &self,
        subject: &TokenSubject<'_>,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, AuthError> {
        let access_expires_at = now + self.access_ttl;
        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            org_id: Some(subject.org_id.to_string()),
            email: subject.email.to_string(),
            roles: subject.roles.codes(),
            scope: subject.scopes.iter().map(str::to_string).collect(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: access_expires_at.timestamp(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
        Ok(IssuedTokens {
            access_token,
            refresh_token: random_token(REFRESH_TOKEN_BYTES),
            access_expires_at,
            refresh_expires_at: now + self.refresh_ttl,
        })
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.decode_claims(token, true)
    }

    /// Verify everything except expiry. Used only to recover who a stale
    /// access token belonged to while rotating a refresh token.
    pub fn principal_from_expired_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.decode_claims(token, false)
    }

    fn decode_claims(&self, token: &str, check_expiry: bool) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.validate_exp = check_expiry;
        validation.validate_nbf = check_expiry;
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::TokenError(format!("invalid token: {e}")))
    }
}

impl AccessClaims {
    /// Validate the loosely typed claim bag into a `Principal`.
    pub fn principal(&self) -> Result<Principal, AuthError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AuthError::TokenError("subject is not a user id".into()))?;
        let org_id = self
            .org_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AuthError::TokenError("org_id is not a uuid".into()))?;
        let roles = self
            .roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<RoleSet, _>>()
            .map_err(|e| AuthError::TokenError(e.to_string()))?;
        Ok(Principal {
            subject: Subject::User(user_id),
            org_id,
            email: Some(self.email.clone()),
            roles,
            scopes: ScopeSet::normalize(&self.scope),
        })
    }
}
