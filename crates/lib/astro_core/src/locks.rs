//! Transaction-scoped advisory locks.

use sqlx::PgConnection;

/// Block until the transaction holds the advisory lock for `key`. The lock is
/// released automatically at commit or rollback.
pub(crate) async fn advisory_xact_lock(
    conn: &mut PgConnection,
    key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}
