//! Credential store queries: users, organizations, roles and external identities.
//!
//! Functions take any `PgExecutor` so callers can compose them inside one
//! transaction (`&mut *tx`) or run them directly against the pool.

use sqlx::{PgConnection, PgExecutor};
use tracing::warn;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{ExternalIdentityRecord, Role, RoleSet, UserRecord};
use crate::uuid::uuidv7;

const USER_COLUMNS: &str = "id, email, password_hash, is_active, created_at";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Case-insensitive lookup by email.
pub async fn find_user_by_email<'e>(
    db: impl PgExecutor<'e>,
    email: &str,
) -> Result<Option<UserRecord>, AuthError> {
    let row = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
    ))
    .bind(email.trim())
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn find_user_by_id<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<UserRecord>, AuthError> {
    let row = sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Create a user. The email is stored lowercased; a duplicate yields
/// `AuthError::EmailTaken`.
pub async fn create_user<'e>(
    db: impl PgExecutor<'e>,
    email: &str,
    password_hash: Option<&str>,
) -> Result<UserRecord, AuthError> {
    sqlx::query_as::<_, UserRecord>(&format!(
        "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(uuidv7())
    .bind(super::normalize_email(email))
    .bind(password_hash)
    .fetch_one(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AuthError::EmailTaken
        } else {
            AuthError::DbError(e)
        }
    })
}

pub async fn create_organization<'e>(
    db: impl PgExecutor<'e>,
    name: &str,
) -> Result<Uuid, AuthError> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO organizations (id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(uuidv7())
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn add_user_to_org<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    org_id: Uuid,
    membership_role: &str,
) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        INSERT INTO user_organizations (user_id, org_id, membership_role)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, org_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(org_id)
    .bind(membership_role)
    .execute(db)
    .await?;
    Ok(())
}

/// The user's primary organization: the earliest membership.
pub async fn primary_org_id<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<Uuid>, AuthError> {
    let org_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT org_id FROM user_organizations
        WHERE user_id = $1
        ORDER BY created_at, org_id
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(org_id)
}

/// Active roles held by a user. Codes the binary does not know are skipped.
pub async fn get_user_roles<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<RoleSet, AuthError> {
    let codes = sqlx::query_scalar::<_, String>(
        r#"
        SELECT ur.role_code FROM user_roles ur
        JOIN roles r ON r.code = ur.role_code
        WHERE ur.user_id = $1 AND r.is_active
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(codes
        .iter()
        .filter_map(|code| match code.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(%user_id, error = %e, "ignoring unrecognised role");
                None
            }
        })
        .collect())
}

/// Grant a role. Idempotent; fails only when the role code itself is not
/// configured in the `roles` table.
pub async fn ensure_role<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    role: Role,
) -> Result<(), AuthError> {
    let role_exists = sqlx::query_scalar::<_, bool>(
        r#"
        WITH role AS (
            SELECT code FROM roles WHERE code = $2 AND is_active
        ), granted AS (
            INSERT INTO user_roles (user_id, role_code)
            SELECT $1, code FROM role
            ON CONFLICT (user_id, role_code) DO NOTHING
            RETURNING 1
        )
        SELECT EXISTS (SELECT 1 FROM role)
        "#,
    )
    .bind(user_id)
    .bind(role.as_str())
    .fetch_one(db)
    .await?;
    if !role_exists {
        return Err(AuthError::UnknownRole(role.as_str().to_string()));
    }
    Ok(())
}

/// Create a user with its own organization (owner membership) and the
/// default consumer role. Runs on the caller's connection so it can be part
/// of a larger transaction.
pub async fn provision_user(
    conn: &mut PgConnection,
    email: &str,
    password_hash: Option<&str>,
    org_name: &str,
) -> Result<(UserRecord, Uuid), AuthError> {
    let user = create_user(&mut *conn, email, password_hash).await?;
    let org_id = create_organization(&mut *conn, org_name).await?;
    add_user_to_org(&mut *conn, user.id, org_id, "owner").await?;
    ensure_role(&mut *conn, user.id, Role::Consumer).await?;
    Ok((user, org_id))
}

pub async fn find_external_identity<'e>(
    db: impl PgExecutor<'e>,
    provider: &str,
    provider_user_id: &str,
) -> Result<Option<ExternalIdentityRecord>, AuthError> {
    let row = sqlx::query_as::<_, ExternalIdentityRecord>(
        r#"
        SELECT id, provider, provider_user_id, user_id, email_snapshot, created_at
        FROM external_identities
        WHERE provider = $1 AND provider_user_id = $2
        "#,
    )
    .bind(provider)
    .bind(provider_user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Link an external account to a user. A link that already exists is kept.
pub async fn create_external_identity<'e>(
    db: impl PgExecutor<'e>,
    provider: &str,
    provider_user_id: &str,
    user_id: Uuid,
    email_snapshot: Option<&str>,
) -> Result<(), AuthError> {
    sqlx::query(
        r#"
        INSERT INTO external_identities (id, provider, provider_user_id, user_id, email_snapshot)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (provider, provider_user_id) DO NOTHING
        "#,
    )
    .bind(uuidv7())
    .bind(provider)
    .bind(provider_user_id)
    .bind(user_id)
    .bind(email_snapshot)
    .execute(db)
    .await?;
    Ok(())
}
