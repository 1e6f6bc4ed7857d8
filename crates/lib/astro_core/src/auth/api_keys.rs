//! API keys for machine clients.
//!
//! A key is presented as `<prefix>.<secret>`. The prefix is public and indexed
//! for lookup; only a bcrypt hash of the secret is stored, and the full key is
//! returned exactly once at creation.

use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use super::password::{hash_password, verify_password};
use super::secrets::random_token;
use crate::models::auth::{ApiKeyRecord, ScopeSet};
use crate::uuid::uuidv7;

/// Header carrying the key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Every prefix starts with this marker.
pub const KEY_PREFIX_MARKER: &str = "ak_live_";

const PREFIX_RANDOM_BYTES: usize = 6;
const SECRET_BYTES: usize = 32;
const MAX_NAME_LEN: usize = 100;

const KEY_COLUMNS: &str = "id, org_id, name, prefix, secret_hash, scopes_csv, daily_quota, \
                           is_active, created_at, last_used_at, revoked_at";

/// A newly created key together with the only copy of its secret.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub record: ApiKeyRecord,
    /// `<prefix>.<secret>`, shown once.
    pub key: String,
}

/// Why an `X-Api-Key` header could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyHeaderError {
    Missing,
    Malformed,
}

/// Split a raw header value into `(prefix, secret)`.
pub fn parse_api_key(raw: Option<&str>) -> Result<(&str, &str), ApiKeyHeaderError> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty());
    let Some(raw) = raw else {
        return Err(ApiKeyHeaderError::Missing);
    };
    match raw.split_once('.') {
        Some((prefix, secret))
            if !prefix.is_empty() && !secret.is_empty() && !secret.contains('.') =>
        {
            Ok((prefix, secret))
        }
        _ => Err(ApiKeyHeaderError::Malformed),
    }
}

/// Fresh `(prefix, secret)` pair.
pub fn generate_key_material() -> (String, String) {
    (
        format!("{KEY_PREFIX_MARKER}{}", random_token(PREFIX_RANDOM_BYTES)),
        random_token(SECRET_BYTES),
    )
}

/// Validate the user-supplied parts of a new key.
pub fn validate_new_key(name: &str, daily_quota: Option<i32>) -> Result<(), AuthError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::ValidationError("name".into()));
    }
    if daily_quota.is_some_and(|q| q < 0) {
        return Err(AuthError::ValidationError("dailyQuota".into()));
    }
    Ok(())
}

pub async fn create_api_key(
    pool: &PgPool,
    org_id: Uuid,
    name: &str,
    scopes: &ScopeSet,
    daily_quota: Option<i32>,
) -> Result<NewApiKey, AuthError> {
    validate_new_key(name, daily_quota)?;
    let (prefix, secret) = generate_key_material();
    let secret_hash = hash_password(&secret)?;

    let record = sqlx::query_as::<_, ApiKeyRecord>(&format!(
        r#"
        INSERT INTO api_keys (id, org_id, name, prefix, secret_hash, scopes_csv, daily_quota)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {KEY_COLUMNS}
        "#
    ))
    .bind(uuidv7())
    .bind(org_id)
    .bind(name.trim())
    .bind(&prefix)
    .bind(&secret_hash)
    .bind(scopes.to_csv())
    .bind(daily_quota)
    .fetch_one(pool)
    .await?;

    Ok(NewApiKey {
        key: format!("{prefix}.{secret}"),
        record,
    })
}

pub async fn list_api_keys(pool: &PgPool, org_id: Uuid) -> Result<Vec<ApiKeyRecord>, AuthError> {
    let rows = sqlx::query_as::<_, ApiKeyRecord>(&format!(
        "SELECT {KEY_COLUMNS} FROM api_keys WHERE org_id = $1 ORDER BY created_at DESC"
    ))
    .bind(org_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Revoke a key owned by `org_id`. Returns `false` when no such live key exists.
pub async fn revoke_api_key(pool: &PgPool, org_id: Uuid, key_id: Uuid) -> Result<bool, AuthError> {
    let result = sqlx::query(
        r#"
        UPDATE api_keys SET is_active = FALSE, revoked_at = now()
        WHERE id = $1 AND org_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(key_id)
    .bind(org_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_active_by_prefix(
    pool: &PgPool,
    prefix: &str,
) -> Result<Option<ApiKeyRecord>, AuthError> {
    let row = sqlx::query_as::<_, ApiKeyRecord>(&format!(
        "SELECT {KEY_COLUMNS} FROM api_keys \
         WHERE prefix = $1 AND is_active AND revoked_at IS NULL"
    ))
    .bind(prefix)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Check a presented secret against the stored hash. bcrypt compares the
/// derived hashes in constant time.
pub fn verify_secret(secret: &str, record: &ApiKeyRecord) -> Result<bool, AuthError> {
    verify_password(secret, &record.secret_hash)
}

pub async fn touch_last_used(pool: &PgPool, key_id: Uuid) -> Result<(), AuthError> {
    sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
        .bind(key_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_prefix_dot_secret() {
        assert_eq!(
            parse_api_key(Some(" ak_live_abc.s3cr3t ")),
            Ok(("ak_live_abc", "s3cr3t"))
        );
    }

    #[test]
    fn parse_distinguishes_missing_from_malformed() {
        assert_eq!(parse_api_key(None), Err(ApiKeyHeaderError::Missing));
        assert_eq!(parse_api_key(Some("   ")), Err(ApiKeyHeaderError::Missing));
        assert_eq!(parse_api_key(Some("nodot")), Err(ApiKeyHeaderError::Malformed));
        assert_eq!(parse_api_key(Some(".secret")), Err(ApiKeyHeaderError::Malformed));
        assert_eq!(parse_api_key(Some("prefix.")), Err(ApiKeyHeaderError::Malformed));
        assert_eq!(parse_api_key(Some("a.b.c")), Err(ApiKeyHeaderError::Malformed));
    }

    #[test]
    fn generated_material_parses_back() {
        let (prefix, secret) = generate_key_material();
        assert!(prefix.starts_with(KEY_PREFIX_MARKER));
        // 6 bytes -> 8 base64url chars.
        assert_eq!(prefix.len(), KEY_PREFIX_MARKER.len() + 8);
        assert_eq!(secret.len(), 43);
        let full = format!("{prefix}.{secret}");
        assert_eq!(parse_api_key(Some(&full)), Ok((prefix.as_str(), secret.as_str())));
    }

    #[test]
    fn new_key_validation() {
        assert!(validate_new_key("reporting", Some(100)).is_ok());
        assert!(validate_new_key("reporting", None).is_ok());
        assert!(validate_new_key("  ", None).is_err());
        assert!(validate_new_key("reporting", Some(-1)).is_err());
        assert!(validate_new_key(&"x".repeat(101), None).is_err());
    }
}
