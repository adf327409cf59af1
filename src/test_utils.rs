//! Shared fixtures for unit tests.

use crate::error::AppError;
use crate::models::{
    GitPullRequest, GitPullRequestStatus, MergeStatus, PollState, PrIdentity, PrSnapshot,
    ProjectConfig, SeenPrRecord, Settings, StatusState,
};
use crate::services::badge::{BadgeSummary, SummarySink};
use crate::services::fetcher::{PullRequestSource, UserIdentity};
use crate::services::notifier::{Notification, NotificationSink};
use crate::services::poller::{Poller, PollerTimeouts};
use crate::services::settings_store::SettingsStore;
use crate::services::state_store::{lease_expiry, PollStateStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::TempDir;

/// Fixed instant used as "now" in tests.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// Connected project `myorg/Platform` for user `me`.
pub fn test_project() -> ProjectConfig {
    let mut project = ProjectConfig::new("myorg", "Platform", "secret");
    project.user_id = Some("me".to_string());
    project.user_display_name = Some("Me".to_string());
    project
}

/// An authored, conflict-free PR in `myorg/Platform` with no checks or votes.
pub fn make_snapshot(id: i64) -> PrSnapshot {
    PrSnapshot {
        identity: PrIdentity::new("myorg", "Platform", id),
        repository_id: "repo-1".to_string(),
        repository_name: "api".to_string(),
        title: format!("Test PR {}", id),
        created_by_name: "Alice".to_string(),
        created_by_image_url: None,
        creation_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        source_ref_name: "refs/heads/feature".to_string(),
        target_ref_name: "refs/heads/main".to_string(),
        is_draft: false,
        merge_status: Some(MergeStatus::Succeeded),
        last_merge_source_commit_id: Some("abc123".to_string()),
        reviewer_votes: BTreeMap::new(),
        reviewer_names: BTreeMap::new(),
        status_checks: BTreeMap::new(),
        is_author: true,
        is_reviewer: false,
        last_seen_at: test_now(),
    }
}

/// `make_snapshot` with a single status check.
pub fn with_check(mut snapshot: PrSnapshot, context: &str, state: StatusState) -> PrSnapshot {
    snapshot.status_checks.insert(context.to_string(), state);
    snapshot
}

/// Raw API payload for an active PR in `repo-1`/`api`, matching `make_snapshot`.
pub fn raw_pr(id: i64, author: &str) -> GitPullRequest {
    serde_json::from_value(json!({
        "pullRequestId": id,
        "title": format!("Test PR {}", id),
        "status": "active",
        "createdBy": { "id": author, "displayName": "Alice" },
        "creationDate": "2024-01-01T00:00:00Z",
        "repository": { "id": "repo-1", "name": "api" },
        "sourceRefName": "refs/heads/feature",
        "targetRefName": "refs/heads/main",
        "mergeStatus": "succeeded",
        "lastMergeSourceCommit": { "commitId": "abc123" },
        "reviewers": []
    }))
    .unwrap()
}

pub fn raw_status(name: &str, state: &str) -> GitPullRequestStatus {
    serde_json::from_value(json!({
        "id": 1,
        "state": state,
        "context": { "name": name },
        "creationDate": "2024-01-01T00:00:00Z"
    }))
    .unwrap()
}

/// Scripted Azure DevOps: per-project PR lists, per-PR statuses, lookups.
///
/// A project listing can be scripted to fail with 401, 429 or any other
/// status code, to answer only after `list_delay`, or to never answer.
#[derive(Default)]
pub struct FakeSource {
    pub prs: HashMap<String, Result<Vec<GitPullRequest>, u16>>,
    pub statuses: HashMap<i64, Vec<GitPullRequestStatus>>,
    pub lookups: HashMap<i64, &'static str>,
    pub list_delay: Option<Duration>,
    pub stalled: HashSet<String>,
    pub list_calls: StdMutex<Vec<String>>,
}

#[async_trait]
impl PullRequestSource for FakeSource {
    async fn fetch_active_prs(
        &self,
        project: &ProjectConfig,
        _user_id: &str,
    ) -> Result<Vec<GitPullRequest>, AppError> {
        self.list_calls.lock().unwrap().push(project.label());
        if self.stalled.contains(&project.label()) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        match self.prs.get(&project.label()) {
            Some(Ok(prs)) => Ok(prs.clone()),
            Some(Err(401)) => Err(AppError::authentication_expired("401")),
            Some(Err(429)) => Err(AppError::rate_limited("slow down", Some(600))),
            Some(Err(code)) => Err(AppError::azure_api_full("boom", *code, "list")),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_statuses(
        &self,
        _project: &ProjectConfig,
        _repository_id: &str,
        pull_request_id: i64,
    ) -> Result<Vec<GitPullRequestStatus>, AppError> {
        Ok(self
            .statuses
            .get(&pull_request_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_by_id(
        &self,
        _project: &ProjectConfig,
        _repository_id: &str,
        pull_request_id: i64,
    ) -> Result<GitPullRequest, AppError> {
        match self.lookups.get(&pull_request_id) {
            Some(status) => {
                let mut pr = raw_pr(pull_request_id, "me");
                pr.status = serde_json::from_value(json!(status)).unwrap();
                Ok(pr)
            }
            None => Err(AppError::not_found("pull request")),
        }
    }

    async fn fetch_current_user(&self, _project: &ProjectConfig) -> Result<UserIdentity, AppError> {
        Ok(UserIdentity {
            id: "me".to_string(),
            display_name: "Me".to_string(),
        })
    }
}

/// In-memory poll-state store that counts saves.
#[derive(Default)]
pub struct MemoryStore {
    pub state: StdMutex<PollState>,
    pub saves: StdMutex<usize>,
    pub lease: StdMutex<Option<(String, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn with_state(state: PollState) -> Self {
        Self {
            state: StdMutex::new(state),
            ..Default::default()
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl PollStateStore for MemoryStore {
    async fn load(&self) -> Result<PollState, AppError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(
        &self,
        snapshots: &[PrSnapshot],
        seen_prs: &[SeenPrRecord],
        completed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.snapshots = snapshots.to_vec();
        state.seen_prs = seen_prs.to_vec();
        state.last_poll_at = Some(completed_at);
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    async fn set_merged_ack(&self, at: DateTime<Utc>) -> Result<(), AppError> {
        self.state.lock().unwrap().merged_ack_at = Some(at);
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut lease = self.lease.lock().unwrap();
        let free = match lease.as_ref() {
            None => true,
            Some((current, expires_at)) => current == holder || *expires_at <= now,
        };
        if free {
            *lease = Some((holder.to_string(), lease_expiry(now, ttl)));
        }
        Ok(free)
    }

    async fn release_lease(&self, holder: &str) -> Result<(), AppError> {
        let mut lease = self.lease.lock().unwrap();
        if lease.as_ref().is_some_and(|(current, _)| current == holder) {
            *lease = None;
        }
        Ok(())
    }
}

/// Records everything handed to the notification and summary sinks.
#[derive(Default)]
pub struct Recorder {
    pub notifications: StdMutex<Vec<Notification>>,
    pub summaries: StdMutex<Vec<BadgeSummary>>,
}

#[async_trait]
impl NotificationSink for Recorder {
    async fn notify(&self, notifications: &[Notification]) {
        self.notifications
            .lock()
            .unwrap()
            .extend_from_slice(notifications);
    }
}

#[async_trait]
impl SummarySink for Recorder {
    async fn update(&self, summary: &BadgeSummary) {
        self.summaries.lock().unwrap().push(*summary);
    }
}

/// A poller over fakes, with settings in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub poller: Arc<Poller>,
    pub store: Arc<MemoryStore>,
    pub recorder: Arc<Recorder>,
    pub source: Arc<FakeSource>,
}

pub async fn harness(settings: Settings, source: FakeSource, state: PollState) -> Harness {
    harness_with_timeouts(settings, source, state, PollerTimeouts::default()).await
}

pub async fn harness_with_timeouts(
    settings: Settings,
    source: FakeSource,
    state: PollState,
    timeouts: PollerTimeouts,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let settings_store = Arc::new(SettingsStore::in_dir(dir.path()));
    settings_store.save(settings).await.unwrap();

    let store = Arc::new(MemoryStore::with_state(state));
    let recorder = Arc::new(Recorder::default());
    let source = Arc::new(source);

    let poller = Arc::new(
        Poller::new(
            settings_store,
            store.clone(),
            source.clone(),
            recorder.clone(),
            recorder.clone(),
        )
        .with_timeouts(timeouts),
    );

    Harness {
        dir,
        poller,
        store,
        recorder,
        source,
    }
}

/// Settings monitoring only `test_project()`.
pub fn one_project() -> Settings {
    Settings {
        projects: vec![test_project()],
        ..Default::default()
    }
}
