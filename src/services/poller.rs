//! Poll orchestrator.
//!
//! One call to [`Poller::run_cycle`] is one poll cycle:
//! 1. Load settings (no projects: skip)
//! 2. Load the previous cycle's state
//! 3. Fetch every connected project concurrently
//! 4. Diff snapshots and resolve disappearances into merge events
//! 5. Notify
//! 6. Update the seen-history
//! 7. Persist and refresh the summary indicator
//!
//! All collaborators are injected, so a cycle is a function of
//! (previous state, fetch results, now).
//!
//! Steps 2-7 run under the store's cycle lease, so a daemon and a one-off
//! `poll` in another process never diff against the same previous state.

use crate::error::AppError;
use crate::models::{ChangeEvent, PrSnapshot, ProjectConfig, Settings};
use crate::services::badge::{BadgeSummary, SummarySink};
use crate::services::fetcher::PullRequestSource;
use crate::services::merge_resolver::detect_merged_prs;
use crate::services::notifier::{build_notifications, NotificationSink};
use crate::services::seen_history::{has_unseen_merge, update_seen_history};
use crate::services::settings_store::SettingsStore;
use crate::services::snapshot_builder::build_snapshot;
use crate::services::state_diff::diff_snapshots;
use crate::services::state_store::PollStateStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default budget for one project fetch or one merge lookup.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum concurrent status-check requests within one project.
const STATUS_FAN_OUT: usize = 8;

/// Pause between attempts to take a lease held by another process.
const LEASE_RETRY: Duration = Duration::from_millis(200);

/// Lease headroom beyond the fetch and lookup budgets, for persistence.
const LEASE_SLACK: Duration = Duration::from_secs(60);

/// Per-call time budgets.
#[derive(Debug, Clone, Copy)]
pub struct PollerTimeouts {
    pub project_fetch: Duration,
    pub lookup: Duration,
}

impl Default for PollerTimeouts {
    fn default() -> Self {
        Self {
            project_fetch: DEFAULT_CALL_TIMEOUT,
            lookup: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// A project that contributed no snapshots this cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFailure {
    pub organization: String,
    pub project: String,
    /// `auth-expired`, `rate-limited`, `timeout`, ...
    pub category: &'static str,
    pub message: String,
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ProjectFailure {
    fn new(project: &ProjectConfig, error: &AppError) -> Self {
        Self {
            organization: project.organization.clone(),
            project: project.project.clone(),
            category: error.category(),
            message: error.to_string(),
            retry_after: error.retry_after(),
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        self.category == "auth-expired"
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// No projects were configured; nothing ran.
    pub skipped: bool,
    pub snapshot_count: usize,
    pub events: Vec<ChangeEvent>,
    pub failures: Vec<ProjectFailure>,
    /// Longest rate-limit hint among failed projects.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
    pub has_unseen_merge: bool,
}

impl CycleReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct Poller {
    settings: Arc<SettingsStore>,
    state: Arc<dyn PollStateStore>,
    source: Arc<dyn PullRequestSource>,
    notifier: Arc<dyn NotificationSink>,
    summary: Arc<dyn SummarySink>,
    timeouts: PollerTimeouts,
    /// Held for the whole cycle so load/persist never interleave.
    cycle_lock: Mutex<()>,
    /// Identifies this poller in the cross-process cycle lease.
    lease_holder: String,
}

impl Poller {
    pub fn new(
        settings: Arc<SettingsStore>,
        state: Arc<dyn PollStateStore>,
        source: Arc<dyn PullRequestSource>,
        notifier: Arc<dyn NotificationSink>,
        summary: Arc<dyn SummarySink>,
    ) -> Self {
        Self {
            settings,
            state,
            source,
            notifier,
            summary,
            timeouts: PollerTimeouts::default(),
            cycle_lock: Mutex::new(()),
            lease_holder: format!("{}:{}", std::process::id(), Uuid::new_v4()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PollerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn settings_store(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn state_store(&self) -> &Arc<dyn PollStateStore> {
        &self.state
    }

    /// Run one poll cycle.
    ///
    /// Only settings and state-store failures (including waiting too long for
    /// another process's cycle) surface as `Err`; in that case nothing is
    /// persisted. Per-project failures land in the report.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, AppError> {
        let _guard = self.cycle_lock.lock().await;

        let settings = self.settings.load().await?;
        if settings.projects.is_empty() {
            log::debug!("[poll] No projects configured, skipping cycle");
            return Ok(CycleReport::skipped());
        }

        self.acquire_lease().await?;
        let outcome = self.run_leased(settings, now).await;
        if let Err(e) = self.state.release_lease(&self.lease_holder).await {
            log::warn!("[poll] Could not release cycle lease: {}", e);
        }
        outcome
    }

    /// Longest a cycle may hold the lease: every project fetch and every
    /// lookup hitting its timeout, plus persistence.
    fn lease_ttl(&self) -> Duration {
        self.timeouts.project_fetch + self.timeouts.lookup + LEASE_SLACK
    }

    /// Wait for the cycle lease. Gives up once a full lease lifetime has
    /// passed, by which point any holder's lease has expired.
    async fn acquire_lease(&self) -> Result<(), AppError> {
        let ttl = self.lease_ttl();
        let deadline = tokio::time::Instant::now() + ttl;
        let mut announced = false;

        loop {
            if self
                .state
                .try_acquire_lease(&self.lease_holder, Utc::now(), ttl)
                .await?
            {
                return Ok(());
            }
            if !announced {
                log::info!("[poll] Another cycle is running, waiting for it to finish");
                announced = true;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::timeout("waiting for another poll cycle"));
            }
            tokio::time::sleep(LEASE_RETRY).await;
        }
    }

    async fn run_leased(
        &self,
        settings: Settings,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, AppError> {
        let previous = self.state.load().await?;

        let (current, failures) = self.fetch_all(&settings.projects, now).await;

        let mut events = diff_snapshots(&previous.snapshots, &current);
        let merged = detect_merged_prs(
            self.source.as_ref(),
            &previous.snapshots,
            &current,
            &settings.projects,
            self.timeouts.lookup,
        )
        .await;
        events.extend(merged);

        if settings.notifications_enabled && !events.is_empty() {
            self.notifier.notify(&build_notifications(&events)).await;
        }

        let seen_prs = update_seen_history(&previous.seen_prs, &current, &events, now);

        self.state.save(&current, &seen_prs, now).await?;

        let unseen_merge = has_unseen_merge(&seen_prs, previous.merged_ack_at);
        self.summary
            .update(&BadgeSummary::from_snapshots(&current, unseen_merge))
            .await;

        log::info!(
            "[poll] Cycle complete: {} PRs, {} events, {} failed projects",
            current.len(),
            events.len(),
            failures.len()
        );

        let retry_after = failures.iter().filter_map(|f| f.retry_after).max();

        Ok(CycleReport {
            skipped: false,
            snapshot_count: current.len(),
            events,
            failures,
            retry_after,
            has_unseen_merge: unseen_merge,
        })
    }

    /// Fetch every connected project concurrently. Snapshots keep project
    /// order; a failed project contributes none.
    async fn fetch_all(
        &self,
        projects: &[ProjectConfig],
        now: DateTime<Utc>,
    ) -> (Vec<PrSnapshot>, Vec<ProjectFailure>) {
        let fetches = projects.iter().filter_map(|project| {
            let user_id = match project.connected_user() {
                Some(id) => id,
                None => {
                    log::debug!("[poll] {} is not connected yet, skipping", project.label());
                    return None;
                }
            };
            Some(async move {
                let fetch = self.fetch_project(project, user_id, now);
                let result = tokio::time::timeout(self.timeouts.project_fetch, fetch)
                    .await
                    .map_err(|_| AppError::timeout(format!("fetch of {}", project.label())))
                    .and_then(|r| r);
                (project, result)
            })
        });

        let mut snapshots = Vec::new();
        let mut failures = Vec::new();

        for (project, result) in join_all(fetches).await {
            match result {
                Ok(project_snapshots) => snapshots.extend(project_snapshots),
                Err(e) => {
                    if e.is_authentication_expired() {
                        log::warn!(
                            "[poll] Auth failed for {} (auth-expired), PAT may be expired",
                            project.label()
                        );
                    } else {
                        log::error!(
                            "[poll] Poll failed for {} ({}): {}",
                            project.label(),
                            e.category(),
                            e
                        );
                    }
                    failures.push(ProjectFailure::new(project, &e));
                }
            }
        }

        (snapshots, failures)
    }

    async fn fetch_project(
        &self,
        project: &ProjectConfig,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrSnapshot>, AppError> {
        let prs = self.source.fetch_active_prs(project, user_id).await?;

        stream::iter(prs)
            .map(|pr| async move {
                let statuses = self
                    .source
                    .fetch_statuses(project, &pr.repository.id, pr.pull_request_id)
                    .await?;
                Ok::<_, AppError>(build_snapshot(
                    &pr,
                    &statuses,
                    &project.organization,
                    &project.project,
                    user_id,
                    now,
                ))
            })
            .buffered(STATUS_FAN_OUT)
            .try_collect()
            .await
    }
}
