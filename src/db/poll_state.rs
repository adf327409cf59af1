//! Database queries for the persisted poll state.

use super::pool::DbPool;
use super::DbError;
use crate::models::{LifecycleState, PollState, PrIdentity, PrSnapshot, SeenPrRecord};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct SnapshotRow {
    snapshot_json: String,
}

#[derive(Debug, FromRow)]
struct SeenPrRow {
    organization: String,
    project: String,
    pull_request_id: i64,
    repository_name: String,
    title: String,
    last_known_state: String,
    last_seen_at: i64,
}

#[derive(Debug, FromRow)]
struct MetaRow {
    last_poll_at: Option<i64>,
    merged_ack_at: Option<i64>,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::CorruptRow(format!("timestamp out of range: {}", ms)))
}

impl TryFrom<SeenPrRow> for SeenPrRecord {
    type Error = DbError;

    fn try_from(row: SeenPrRow) -> Result<Self, Self::Error> {
        Ok(Self {
            identity: PrIdentity::new(row.organization, row.project, row.pull_request_id),
            repository_name: row.repository_name,
            title: row.title,
            last_known_state: LifecycleState::from(row.last_known_state.as_str()),
            last_seen_at: from_millis(row.last_seen_at)?,
        })
    }
}

/// Load the whole poll state, snapshots in the order they were saved.
pub async fn load_poll_state(pool: &DbPool) -> Result<PollState, DbError> {
    let snapshot_rows: Vec<SnapshotRow> =
        sqlx::query_as("SELECT snapshot_json FROM pr_snapshots ORDER BY position")
            .fetch_all(pool)
            .await?;

    let snapshots = snapshot_rows
        .into_iter()
        .map(|row| {
            serde_json::from_str::<PrSnapshot>(&row.snapshot_json)
                .map_err(|e| DbError::CorruptRow(format!("snapshot: {}", e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let seen_rows: Vec<SeenPrRow> = sqlx::query_as(
        r#"
        SELECT organization, project, pull_request_id, repository_name, title,
               last_known_state, last_seen_at
        FROM seen_prs
        ORDER BY last_seen_at DESC, organization, project, pull_request_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let seen_prs = seen_rows
        .into_iter()
        .map(SeenPrRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let meta: MetaRow =
        sqlx::query_as("SELECT last_poll_at, merged_ack_at FROM poll_meta WHERE id = 1")
            .fetch_one(pool)
            .await?;

    Ok(PollState {
        snapshots,
        seen_prs,
        last_poll_at: meta.last_poll_at.map(from_millis).transpose()?,
        merged_ack_at: meta.merged_ack_at.map(from_millis).transpose()?,
    })
}

/// Replace snapshots and seen-history and stamp the cycle completion time.
///
/// Runs in a single transaction so a reader never sees a half-written cycle.
pub async fn save_cycle(
    pool: &DbPool,
    snapshots: &[PrSnapshot],
    seen_prs: &[SeenPrRecord],
    completed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM pr_snapshots")
        .execute(&mut *tx)
        .await?;

    for (position, snapshot) in snapshots.iter().enumerate() {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| DbError::CorruptRow(format!("snapshot: {}", e)))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pr_snapshots (
                organization, project, pull_request_id, position, snapshot_json, last_seen_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.identity.organization)
        .bind(&snapshot.identity.project)
        .bind(snapshot.identity.pull_request_id)
        .bind(position as i64)
        .bind(json)
        .bind(snapshot.last_seen_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM seen_prs").execute(&mut *tx).await?;

    for record in seen_prs {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO seen_prs (
                organization, project, pull_request_id, repository_name, title,
                last_known_state, last_seen_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.identity.organization)
        .bind(&record.identity.project)
        .bind(record.identity.pull_request_id)
        .bind(&record.repository_name)
        .bind(&record.title)
        .bind(record.last_known_state.to_string())
        .bind(record.last_seen_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE poll_meta SET last_poll_at = ? WHERE id = 1")
        .bind(completed_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Record that the user has acknowledged merged PRs up to `at`.
pub async fn set_merged_ack(pool: &DbPool, at: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query("UPDATE poll_meta SET merged_ack_at = ? WHERE id = 1")
        .bind(at.timestamp_millis())
        .execute(pool)
        .await?;
    Ok(())
}
