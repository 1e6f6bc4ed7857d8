//! Authentication and authorization logic.
//!
//! Provides password hashing, access-token issuing, refresh-token hashing,
//! API key material, and the credential/session store queries shared by the
//! HTTP layer.

pub mod api_keys;
pub mod google;
pub mod jwt;
pub mod password;
pub mod queries;
pub mod refresh;
pub mod secrets;
pub mod sessions;
pub mod usage;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Email already registered")]
    EmailTaken,

    /// The role code is missing from (or disabled in) the `roles` table.
    #[error("Role '{0}' is not configured")]
    UnknownRole(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Canonical form of an email address: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural check applied before touching the store.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::ValidationError("email".into()));
    };
    if local.is_empty() || domain.is_empty() || email.len() > 320 || email.contains(' ') {
        return Err(AuthError::ValidationError("email".into()));
    }
    Ok(())
}
