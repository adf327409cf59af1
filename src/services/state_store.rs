//! Poll-state persistence seam.

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use crate::models::{PollState, PrSnapshot, SeenPrRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Storage for the state one cycle hands to the next.
#[async_trait]
pub trait PollStateStore: Send + Sync {
    async fn load(&self) -> Result<PollState, AppError>;

    /// Replace snapshots and seen-history and record the cycle's completion
    /// time, atomically.
    async fn save(
        &self,
        snapshots: &[PrSnapshot],
        seen_prs: &[SeenPrRecord],
        completed_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Record that the user acknowledged merges at `at`.
    async fn set_merged_ack(&self, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Try to take the cycle lease for `holder` for `ttl` from `now`.
    ///
    /// Returns `false` while another holder has an unexpired lease.
    async fn try_acquire_lease(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    async fn release_lease(&self, holder: &str) -> Result<(), AppError>;
}

/// `now + ttl`, saturating on overflow.
pub fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: DbPool,
}

impl SqliteStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn db_error(operation: &'static str) -> impl FnOnce(db::DbError) -> AppError {
    move |e| AppError::database_with_op(e.to_string(), operation)
}

#[async_trait]
impl PollStateStore for SqliteStateStore {
    async fn load(&self) -> Result<PollState, AppError> {
        db::poll_state::load_poll_state(&self.pool)
            .await
            .map_err(db_error("load poll state"))
    }

    async fn save(
        &self,
        snapshots: &[PrSnapshot],
        seen_prs: &[SeenPrRecord],
        completed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        db::poll_state::save_cycle(&self.pool, snapshots, seen_prs, completed_at)
            .await
            .map_err(db_error("save poll state"))
    }

    async fn set_merged_ack(&self, at: DateTime<Utc>) -> Result<(), AppError> {
        db::poll_state::set_merged_ack(&self.pool, at)
            .await
            .map_err(db_error("acknowledge merges"))
    }

    async fn try_acquire_lease(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        db::poll_lease::try_acquire(&self.pool, holder, now, lease_expiry(now, ttl))
            .await
            .map_err(db_error("acquire cycle lease"))
    }

    async fn release_lease(&self, holder: &str) -> Result<(), AppError> {
        db::poll_lease::release(&self.pool, holder)
            .await
            .map_err(db_error("release cycle lease"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LifecycleState;
    use crate::test_utils::{make_snapshot, test_now};
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStateStore) {
        let dir = TempDir::new().unwrap();
        let pool = db::initialize(&db::get_db_path(dir.path())).await.unwrap();
        (dir, SqliteStateStore::new(pool))
    }

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let (_dir, store) = store().await;
        assert_eq!(store.load().await.unwrap(), PollState::default());
    }

    #[tokio::test]
    async fn test_save_and_ack_are_visible_on_load() {
        let (_dir, store) = store().await;
        let now = test_now();
        let snapshot = make_snapshot(1);
        let seen = SeenPrRecord::from_snapshot(&snapshot, LifecycleState::Merged, now);

        store
            .save(std::slice::from_ref(&snapshot), std::slice::from_ref(&seen), now)
            .await
            .unwrap();
        store.set_merged_ack(now).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.snapshots, vec![snapshot]);
        assert_eq!(state.seen_prs, vec![seen]);
        assert_eq!(state.last_poll_at, Some(now));
        assert_eq!(state.merged_ack_at, Some(now));
    }

    #[tokio::test]
    async fn test_stores_on_one_database_share_the_lease() {
        let dir = TempDir::new().unwrap();
        let path = db::get_db_path(dir.path());
        let daemon = SqliteStateStore::new(db::initialize(&path).await.unwrap());
        let cli = SqliteStateStore::new(db::initialize(&path).await.unwrap());
        let now = test_now();
        let ttl = Duration::from_secs(120);

        assert!(daemon.try_acquire_lease("daemon", now, ttl).await.unwrap());
        assert!(!cli.try_acquire_lease("cli", now, ttl).await.unwrap());

        daemon.release_lease("daemon").await.unwrap();
        assert!(cli.try_acquire_lease("cli", now, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_errors_name_the_failed_operation() {
        let (_dir, store) = store().await;
        store.pool().close().await;

        match store.load().await.unwrap_err() {
            AppError::Database { operation, .. } => {
                assert_eq!(operation.as_deref(), Some("load poll state"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lease_expiry_saturates() {
        let now = test_now();
        assert_eq!(
            lease_expiry(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(lease_expiry(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
