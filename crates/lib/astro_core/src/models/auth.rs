//! Identity domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! bodies in `astro_api` (which use camelCase field names).

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Roles are additive. `Consumer` is granted at onboarding, `Astrologer`
    /// only through admin verification.
    pub enum Role {
        Consumer => "consumer",
        Astrologer => "astrologer",
        Admin => "admin",
    }
}

/// Closed set of roles held by a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Role codes in stable order, as embedded in access tokens.
    pub fn codes(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_str().to_string()).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Open set of capability tags attached to an API key or access token.
///
/// Tags are trimmed, lowercased and de-duplicated on construction, so two
/// sets built from differently-cased input compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn normalize<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            scopes
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn from_csv(csv: &str) -> Self {
        Self::normalize(csv.split(','))
    }

    pub fn to_csv(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(&scope.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(value: Vec<String>) -> Self {
        Self::normalize(value)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(value: ScopeSet) -> Self {
        value.0.into_iter().collect()
    }
}

/// Who is calling: a person holding an access token, or a machine holding an
/// API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    User(Uuid),
    ApiKey(Uuid),
}

/// Authenticated caller. Built once per request at the edge and carried
/// read-only in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: Subject,
    pub org_id: Option<Uuid>,
    pub email: Option<String>,
    pub roles: RoleSet,
    pub scopes: ScopeSet,
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self.subject {
            Subject::User(id) => Some(id),
            Subject::ApiKey(_) => None,
        }
    }

    pub fn api_key_id(&self) -> Option<Uuid> {
        match self.subject {
            Subject::ApiKey(id) => Some(id),
            Subject::User(_) => None,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Principal synthesised for a validated API key.
    pub fn for_api_key(api_key_id: Uuid, org_id: Uuid, scopes: ScopeSet) -> Self {
        Self {
            subject: Subject::ApiKey(api_key_id),
            org_id: Some(org_id),
            email: None,
            roles: RoleSet::default(),
            scopes,
        }
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID.
    pub sub: String,
    /// Primary organization of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    /// Unique token ID.
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Stored user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Link between a user and an external identity provider account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExternalIdentityRecord {
    pub id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub user_id: Uuid,
    pub email_snapshot: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Refresh-token session. Rows form a rotation chain through
/// `replaced_by_token_hash`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_token_hash: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Whether a refresh session may still be exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Live,
    /// Revoked by logout or by rotation. `rotated` is set when a successor
    /// exists, which makes a second presentation a reuse.
    Revoked { rotated: bool },
    Expired,
}

impl SessionRecord {
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked_at.is_some() {
            SessionState::Revoked {
                rotated: self.replaced_by_token_hash.is_some(),
            }
        } else if self.expires_at <= now {
            SessionState::Expired
        } else {
            SessionState::Live
        }
    }
}

/// Client metadata recorded on refresh sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Stored API key. The secret itself is never persisted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub secret_hash: String,
    pub scopes_csv: String,
    pub daily_quota: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::from_csv(&self.scopes_csv)
    }
}

/// One key's request count for one UTC day.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounterRecord {
    pub api_key_id: Uuid,
    pub date_utc: NaiveDate,
    pub request_count: i64,
}

/// Row appended to the request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLogEntry {
    pub api_key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub duration_ms: i64,
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(revoked: bool, replaced: bool, expires_in: Duration) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            refresh_token_hash: "h".into(),
            expires_at: now + expires_in,
            created_at: now,
            revoked_at: revoked.then_some(now),
            replaced_by_token_hash: replaced.then(|| "next".to_string()),
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn scopes_are_trimmed_lowercased_and_deduplicated() {
        let scopes = ScopeSet::from_csv(" Ephemeris.Read, ephemeris.read ,,usage.read ");
        assert_eq!(scopes.to_csv(), "ephemeris.read,usage.read");
        assert!(scopes.contains("EPHEMERIS.READ"));
        assert!(!scopes.contains("billing.write"));
    }

    #[test]
    fn empty_scope_csv_is_empty_set() {
        assert!(ScopeSet::from_csv("").is_empty());
        assert!(ScopeSet::from_csv(" , ,").is_empty());
    }

    #[test]
    fn principal_for_api_key_has_no_user() {
        let key = Uuid::now_v7();
        let principal =
            Principal::for_api_key(key, Uuid::now_v7(), ScopeSet::from_csv("usage.read"));
        assert_eq!(principal.user_id(), None);
        assert_eq!(principal.api_key_id(), Some(key));
        assert!(principal.has_scope("usage.read"));
        assert!(!principal.has_role(Role::Consumer));
    }

    #[test]
    fn session_state_prefers_revocation_over_expiry() {
        assert_eq!(
            session(false, false, Duration::days(1)).state(Utc::now()),
            SessionState::Live
        );
        assert_eq!(
            session(false, false, Duration::seconds(-1)).state(Utc::now()),
            SessionState::Expired
        );
        assert_eq!(
            session(true, true, Duration::seconds(-1)).state(Utc::now()),
            SessionState::Revoked { rotated: true }
        );
        assert_eq!(
            session(true, false, Duration::days(1)).state(Utc::now()),
            SessionState::Revoked { rotated: false }
        );
    }
}
