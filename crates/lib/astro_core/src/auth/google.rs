//! Google sign-in: authorization-code exchange and ID token validation.
//!
//! The code is exchanged (with its PKCE verifier) at Google's token endpoint.
//! The returned ID token is verified against Google's published JWKS, which is
//! cached for an hour and refetched when an unknown `kid` shows up.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Deserializer};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

pub const PROVIDER: &str = "google";

const JWKS_TTL: Duration = Duration::from_secs(3600);
const ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];

/// Google sign-in failures. Each maps to a stable machine code.
#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("code, codeVerifier and an absolute http(s) redirectUri are required")]
    InvalidRequest,

    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("invalid id token: {0}")]
    InvalidIdToken(String),

    #[error("id token is missing required claims")]
    MissingClaims,

    #[error("email is not verified by Google")]
    EmailNotVerified,

    #[error("nonce mismatch")]
    NonceMismatch,
}

impl GoogleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "google_not_configured",
            Self::InvalidRequest => "invalid_google_request",
            Self::ExchangeFailed(_) => "google_exchange_failed",
            Self::InvalidIdToken(_) => "google_invalid_id_token",
            Self::MissingClaims => "google_missing_claims",
            Self::EmailNotVerified => "google_email_not_verified",
            Self::NonceMismatch => "google_nonce_mismatch",
        }
    }
}

/// Reject exchange requests Google would refuse anyway.
pub fn check_exchange_request(
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<(), GoogleError> {
    if code.trim().is_empty() || code_verifier.trim().is_empty() {
        return Err(GoogleError::InvalidRequest);
    }
    match Url::parse(redirect_uri) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(GoogleError::InvalidRequest),
    }
}

#[derive(Clone, Debug, Default)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Extra `aud` values accepted besides `client_id` (e.g. mobile clients).
    pub allowed_audiences: Vec<String>,
    pub token_endpoint: String,
    pub jwks_url: String,
}

impl GoogleSettings {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn audiences(&self) -> Vec<&str> {
        std::iter::once(self.client_id.as_str())
            .chain(self.allowed_audiences.iter().map(String::as_str))
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// Claims of a Google ID token that sign-in relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: bool,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Verified Google account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
}

fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.eq_ignore_ascii_case("true"),
    })
}

/// Post-signature checks: required claims, verified email, nonce.
pub fn check_identity_claims(
    claims: &GoogleIdClaims,
    expected_nonce: Option<&str>,
) -> Result<GoogleIdentity, GoogleError> {
    let email = claims
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let (Some(email), false) = (email, claims.sub.is_empty()) else {
        return Err(GoogleError::MissingClaims);
    };
    if !claims.email_verified {
        return Err(GoogleError::EmailNotVerified);
    }
    if let Some(expected) = expected_nonce.filter(|n| !n.is_empty()) {
        let presented = claims.nonce.as_deref().unwrap_or_default();
        if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(GoogleError::NonceMismatch);
        }
    }
    Ok(GoogleIdentity {
        subject: claims.sub.clone(),
        email: super::normalize_email(email),
    })
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
}

pub struct GoogleVerifier {
    http: reqwest::Client,
    settings: GoogleSettings,
    jwks: RwLock<Option<(Instant, JwkSet)>>,
}

impl GoogleVerifier {
    pub fn new(settings: GoogleSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            jwks: RwLock::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Exchange an authorization code for a verified Google identity.
    pub async fn sign_in(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
        nonce: Option<&str>,
    ) -> Result<GoogleIdentity, GoogleError> {
        if !self.is_configured() {
            return Err(GoogleError::NotConfigured);
        }
        check_exchange_request(code, code_verifier, redirect_uri)?;
        let id_token = self.exchange_code(code, code_verifier, redirect_uri).await?;
        let claims = self.verify_id_token(&id_token).await?;
        check_identity_claims(&claims, nonce)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<String, GoogleError> {
        let params = [
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", code_verifier),
        ];
        let response = self
            .http
            .post(&self.settings.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleError::ExchangeFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %body, "google token endpoint rejected the code");
            return Err(GoogleError::ExchangeFailed(format!("token endpoint returned {status}")));
        }
        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| GoogleError::ExchangeFailed(e.to_string()))?;
        body.id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GoogleError::ExchangeFailed("response has no id_token".into()))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleIdClaims, GoogleError> {
        let header =
            decode_header(id_token).map_err(|e| GoogleError::InvalidIdToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| GoogleError::InvalidIdToken("missing kid".into()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(ISSUERS);
        validation.set_audience(self.settings.audiences().as_slice());
        decode::<GoogleIdClaims>(id_token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| GoogleError::InvalidIdToken(e.to_string()))
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, GoogleError> {
        {
            let cache = self.jwks.read().await;
            if let Some((fetched_at, set)) = cache.as_ref()
                && fetched_at.elapsed() < JWKS_TTL
                && let Some(jwk) = set.find(kid)
            {
                return DecodingKey::from_jwk(jwk)
                    .map_err(|e| GoogleError::InvalidIdToken(e.to_string()));
            }
        }

        let set: JwkSet = self
            .http
            .get(&self.settings.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GoogleError::InvalidIdToken(format!("jwks fetch: {e}")))?
            .json()
            .await
            .map_err(|e| GoogleError::InvalidIdToken(format!("jwks decode: {e}")))?;

        let key = match set.find(kid) {
            Some(jwk) => DecodingKey::from_jwk(jwk)
                .map_err(|e| GoogleError::InvalidIdToken(e.to_string()))?,
            None => {
                warn!(kid, "id token signed with unknown key");
                return Err(GoogleError::InvalidIdToken("unknown kid".into()));
            }
        };
        *self.jwks.write().await = Some((Instant::now(), set));
        Ok(key)
    }
}
