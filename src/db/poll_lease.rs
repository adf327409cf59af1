//! Cycle lease: cross-process mutual exclusion for poll cycles.
//!
//! The `run` daemon and a one-off `poll` are separate processes over the same
//! database. Whoever holds the single `poll_lease` row runs the cycle; the
//! other waits until it is released or expires.

use super::pool::DbPool;
use super::DbError;
use chrono::{DateTime, Utc};

/// Take the lease for `holder` until `expires_at`.
///
/// Succeeds when the lease is free, expired at `now`, or already held by
/// `holder`. The upsert is a single statement, so two processes racing for a
/// free lease cannot both win.
pub async fn try_acquire(
    pool: &DbPool,
    holder: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO poll_lease (id, holder, expires_at) VALUES (1, ?, ?)
        ON CONFLICT (id) DO UPDATE
            SET holder = excluded.holder, expires_at = excluded.expires_at
            WHERE poll_lease.expires_at <= ? OR poll_lease.holder = excluded.holder
        "#,
    )
    .bind(holder)
    .bind(expires_at.timestamp_millis())
    .bind(now.timestamp_millis())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Give the lease up. A no-op when `holder` no longer holds it.
pub async fn release(pool: &DbPool, holder: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM poll_lease WHERE id = 1 AND holder = ?")
        .bind(holder)
        .execute(pool)
        .await?;
    Ok(())
}
