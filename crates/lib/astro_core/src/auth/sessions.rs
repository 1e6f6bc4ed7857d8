//! Refresh-token session store.
//!
//! Sessions are keyed by the HMAC of the refresh token. Rotation revokes the
//! presented row and inserts its successor in one transaction, linking the
//! two through `replaced_by_token_hash`.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{ClientMeta, SessionRecord};
use crate::uuid::uuidv7;

pub async fn create_session<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    refresh_token_hash: &str,
    expires_at: DateTime<Utc>,
    client: &ClientMeta,
) -> Result<Uuid, AuthError> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO user_sessions (id, user_id, refresh_token_hash, expires_at, user_agent, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(uuidv7())
    .bind(user_id)
    .bind(refresh_token_hash)
    .bind(expires_at)
    .bind(client.user_agent.as_deref())
    .bind(client.ip_address.as_deref())
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn find_session_by_hash<'e>(
    db: impl PgExecutor<'e>,
    refresh_token_hash: &str,
) -> Result<Option<SessionRecord>, AuthError> {
    let row = sqlx::query_as::<_, SessionRecord>(
        r#"
        SELECT id, user_id, refresh_token_hash, expires_at, created_at, revoked_at,
               replaced_by_token_hash, user_agent, ip_address
        FROM user_sessions
        WHERE refresh_token_hash = $1
        "#,
    )
    .bind(refresh_token_hash)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Revoke the live session with this hash. Returns whether a row changed.
pub async fn revoke_session_by_hash<'e>(
    db: impl PgExecutor<'e>,
    refresh_token_hash: &str,
) -> Result<bool, AuthError> {
    let result = sqlx::query(
        "UPDATE user_sessions SET revoked_at = now() \
         WHERE refresh_token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(refresh_token_hash)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Revoke every live session of a user.
pub async fn revoke_all_sessions<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<u64, AuthError> {
    let result = sqlx::query(
        "UPDATE user_sessions SET revoked_at = now() \
         WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Atomically replace `current` with a new session keyed by `new_hash`.
///
/// Returns `None` when `current` was already revoked by the time the update
/// ran, which means a concurrent refresh with the same token won.
pub async fn rotate_session(
    pool: &PgPool,
    current: &SessionRecord,
    new_hash: &str,
    new_expires_at: DateTime<Utc>,
    client: &ClientMeta,
) -> Result<Option<Uuid>, AuthError> {
    let mut tx = pool.begin().await?;

    let revoked = sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = now(), replaced_by_token_hash = $2
        WHERE id = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(current.id)
    .bind(new_hash)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let carried = ClientMeta {
        user_agent: client.user_agent.clone().or_else(|| current.user_agent.clone()),
        ip_address: client.ip_address.clone().or_else(|| current.ip_address.clone()),
    };
    let id = create_session(&mut *tx, current.user_id, new_hash, new_expires_at, &carried).await?;

    tx.commit().await?;
    Ok(Some(id))
}

/// Revoke every still-live session descended from `refresh_token_hash` through
/// the rotation chain. Used when a rotated token is presented again.
pub async fn revoke_descendants(
    pool: &PgPool,
    refresh_token_hash: &str,
) -> Result<u64, AuthError> {
    let result = sqlx::query(
        r#"
        WITH RECURSIVE chain (hash) AS (
            SELECT replaced_by_token_hash
            FROM user_sessions
            WHERE refresh_token_hash = $1 AND replaced_by_token_hash IS NOT NULL
            UNION
            SELECT s.replaced_by_token_hash
            FROM user_sessions s
            JOIN chain c ON s.refresh_token_hash = c.hash
            WHERE s.replaced_by_token_hash IS NOT NULL
        )
        UPDATE user_sessions
        SET revoked_at = now()
        WHERE refresh_token_hash IN (SELECT hash FROM chain)
          AND revoked_at IS NULL
        "#,
    )
    .bind(refresh_token_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
