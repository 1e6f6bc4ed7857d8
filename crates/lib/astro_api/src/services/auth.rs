//! Authentication orchestrator: register, login, refresh rotation, logout,
//! and Google sign-in, delegating storage to `astro_core::auth`.

use astro_core::auth::google::PROVIDER as GOOGLE;
use astro_core::auth::jwt::{IssuedTokens, TokenSubject};
use astro_core::auth::password::{
    hash_password, validate_password, verify_against_dummy, verify_password,
};
use astro_core::auth::queries::{
    create_external_identity, ensure_role, find_external_identity, find_user_by_email,
    find_user_by_id, get_user_roles, primary_org_id, provision_user,
};
use astro_core::auth::sessions::{
    create_session, find_session_by_hash, revoke_all_sessions, revoke_descendants,
    revoke_session_by_hash, rotate_session,
};
use astro_core::auth::{normalize_email, validate_email};
use astro_core::models::auth::{ClientMeta, Role, RoleSet, ScopeSet, SessionState, UserRecord};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};

const MAX_ORG_NAME_LEN: usize = 200;
const MAX_GENERATED_ORG_PREFIX: usize = 64;

/// Run a CPU-bound closure (bcrypt) off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task: {e}")))
}

fn invalid_credentials() -> AppError {
    AppError::unauthorized("invalid_credentials")
}

/// Current roles, granting the default consumer role to accounts that have
/// none.
async fn roles_with_default(state: &AppState, user_id: Uuid) -> AppResult<RoleSet> {
    let mut roles = get_user_roles(&state.pool, user_id).await?;
    if roles.is_empty() {
        ensure_role(&state.pool, user_id, Role::Consumer).await?;
        roles.insert(Role::Consumer);
    }
    Ok(roles)
}

/// Mint tokens and persist the refresh session.
async fn open_session(
    state: &AppState,
    user: &UserRecord,
    org_id: Uuid,
    roles: &RoleSet,
    client: &ClientMeta,
) -> AppResult<IssuedTokens> {
    let tokens = state.tokens.create_tokens(&TokenSubject {
        user_id: user.id,
        org_id,
        email: &user.email,
        roles,
        scopes: &ScopeSet::default(),
    })?;
    let hash = state.refresh_hasher.hash(&tokens.refresh_token);
    create_session(&state.pool, user.id, &hash, tokens.refresh_expires_at, client).await?;
    Ok(tokens)
}

/// Register a new account with its own organization.
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    organization_name: &str,
    client: &ClientMeta,
) -> AppResult<IssuedTokens> {
    let email = normalize_email(email);
    validate_email(&email)?;
    validate_password(password)?;
    let organization_name = organization_name.trim();
    if organization_name.is_empty() || organization_name.chars().count() > MAX_ORG_NAME_LEN {
        return Err(AppError::Validation {
            code: "validation_error".into(),
            message: Some("organizationName".into()),
        });
    }

    let password = password.to_owned();
    let password_hash = blocking(move || hash_password(&password)).await??;

    let mut tx = state.pool.begin().await?;
    let (user, org_id) =
        provision_user(&mut tx, &email, Some(&password_hash), organization_name).await?;
    let roles: RoleSet = [Role::Consumer].into_iter().collect();
    let tokens = state.tokens.create_tokens(&TokenSubject {
        user_id: user.id,
        org_id,
        email: &user.email,
        roles: &roles,
        scopes: &ScopeSet::default(),
    })?;
    let hash = state.refresh_hasher.hash(&tokens.refresh_token);
    create_session(&mut *tx, user.id, &hash, tokens.refresh_expires_at, client).await?;
    tx.commit().await?;

    info!(user_id = %user.id, %org_id, "user registered");
    Ok(tokens)
}

/// Password login. Every failure is the same 401, and an unknown email costs
/// one bcrypt verification like a wrong password does.
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    client: &ClientMeta,
) -> AppResult<IssuedTokens> {
    let email = normalize_email(email);
    let user = find_user_by_email(&state.pool, &email).await?;

    let password = password.to_owned();
    let verified = match user {
        Some(user) if user.is_active => match user.password_hash.clone() {
            Some(hash) => {
                let matched = blocking(move || verify_password(&password, &hash)).await??;
                matched.then_some(user)
            }
            None => {
                blocking(move || verify_against_dummy(&password)).await?;
                None
            }
        },
        _ => {
            blocking(move || verify_against_dummy(&password)).await?;
            None
        }
    };
    let Some(user) = verified else {
        debug!("login rejected");
        return Err(invalid_credentials());
    };

    let org_id = primary_org_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("no_org_assigned"))?;
    let roles = roles_with_default(state, user.id).await?;
    let tokens = open_session(state, &user, org_id, &roles, client).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(tokens)
}

/// Exchange a refresh token for a new pair, revoking the presented one.
///
/// `bearer` is an optional (possibly expired) access token; when given, it
/// must belong to the session's owner.
pub async fn refresh(
    state: &AppState,
    refresh_token: Option<&str>,
    bearer: Option<&str>,
    client: &ClientMeta,
) -> AppResult<IssuedTokens> {
    let refresh_token = refresh_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing_refresh_cookie"))?;

    let hash = state.refresh_hasher.hash(refresh_token);
    let session = find_session_by_hash(&state.pool, &hash)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid_refresh_cookie"))?;

    match session.state(Utc::now()) {
        SessionState::Live => {}
        SessionState::Revoked { rotated } => {
            if rotated {
                let revoked = revoke_descendants(&state.pool, &hash).await?;
                warn!(
                    user_id = %session.user_id,
                    session_id = %session.id,
                    revoked,
                    "refresh token reuse detected"
                );
            }
            return Err(AppError::unauthorized("refresh_revoked"));
        }
        SessionState::Expired => return Err(AppError::unauthorized("refresh_expired")),
    }

    if let Some(bearer) = bearer {
        let claims = state
            .tokens
            .principal_from_expired_token(bearer)
            .map_err(|_| AppError::unauthorized("invalid_token"))?;
        if claims.sub != session.user_id.to_string() {
            return Err(AppError::unauthorized("invalid_refresh_cookie"));
        }
    }

    let user = find_user_by_id(&state.pool, session.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::unauthorized("user_inactive"))?;
    let org_id = primary_org_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("no_org_assigned"))?;
    let roles = roles_with_default(state, user.id).await?;

    let tokens = state.tokens.create_tokens(&TokenSubject {
        user_id: user.id,
        org_id,
        email: &user.email,
        roles: &roles,
        scopes: &ScopeSet::default(),
    })?;
    let new_hash = state.refresh_hasher.hash(&tokens.refresh_token);
    let rotated = rotate_session(
        &state.pool,
        &session,
        &new_hash,
        tokens.refresh_expires_at,
        client,
    )
    .await?;
    if rotated.is_none() {
        debug!(session_id = %session.id, "lost refresh rotation race");
        return Err(AppError::unauthorized("refresh_revoked"));
    }

    debug!(user_id = %user.id, "refresh token rotated");
    Ok(tokens)
}

/// Revoke the session behind a refresh token. Unknown or missing tokens are
/// not an error, and store failures are only logged.
pub async fn logout(state: &AppState, refresh_token: Option<&str>) {
    let Some(token) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    let hash = state.refresh_hasher.hash(token);
    if let Err(e) = revoke_session_by_hash(&state.pool, &hash).await {
        warn!(error = %e, "logout could not revoke session");
    }
}

/// Revoke every live session of a user.
pub async fn logout_all(state: &AppState, user_id: Uuid) -> AppResult<u64> {
    let revoked = revoke_all_sessions(&state.pool, user_id).await?;
    info!(%user_id, revoked, "all sessions revoked");
    Ok(revoked)
}

/// Organization name given to accounts created through an external provider.
pub fn default_org_name(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let local: String = local.chars().take(MAX_GENERATED_ORG_PREFIX).collect();
    format!("{local}'s Org")
}

/// Google sign-in. Resolves the Google account to a local user by existing
/// link, then by verified email (linking it), and otherwise provisions a new
/// user with its own organization.
pub async fn google_exchange(
    state: &AppState,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
    nonce: Option<&str>,
    client: &ClientMeta,
) -> AppResult<IssuedTokens> {
    let nonce = nonce.map(str::trim).filter(|n| !n.is_empty());
    let identity = state
        .google
        .sign_in(code, code_verifier, redirect_uri, nonce)
        .await?;

    let user_id = match find_external_identity(&state.pool, GOOGLE, &identity.subject).await? {
        Some(link) => link.user_id,
        None => match find_user_by_email(&state.pool, &identity.email).await? {
            Some(user) => {
                create_external_identity(
                    &state.pool,
                    GOOGLE,
                    &identity.subject,
                    user.id,
                    Some(&identity.email),
                )
                .await?;
                info!(user_id = %user.id, "google account linked by email");
                user.id
            }
            None => {
                let mut tx = state.pool.begin().await?;
                let (user, _) = provision_user(
                    &mut tx,
                    &identity.email,
                    None,
                    &default_org_name(&identity.email),
                )
                .await?;
                create_external_identity(
                    &mut *tx,
                    GOOGLE,
                    &identity.subject,
                    user.id,
                    Some(&identity.email),
                )
                .await?;
                tx.commit().await?;
                info!(user_id = %user.id, "user provisioned from google");
                user.id
            }
        },
    };

    let user = find_user_by_id(&state.pool, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::unauthorized("user_inactive"))?;
    let org_id = primary_org_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("no_org_assigned"))?;
    let roles = roles_with_default(state, user.id).await?;
    open_session(state, &user, org_id, &roles, client).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_org_name_uses_local_part() {
        assert_eq!(default_org_name("ana@example.com"), "ana's Org");
    }

    #[test]
    fn generated_org_name_is_capped() {
        let email = format!("{}@example.com", "x".repeat(100));
        let name = default_org_name(&email);
        assert_eq!(name, format!("{}'s Org", "x".repeat(64)));
    }
}
