//! Disappearance resolver: decides whether a vanished PR was merged.

use crate::error::AppError;
use crate::models::{
    ChangeEvent, ChangeType, PrIdentity, PrSnapshot, ProjectConfig, PullRequestStatus, Severity,
};
use crate::services::fetcher::PullRequestSource;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;

/// Look up every authored PR that disappeared since the last poll and emit
/// a `pr_merged` event for those the API reports as completed.
///
/// A 404 means the PR was deleted or its repository moved, not merged, and is
/// skipped silently. Any other failure (including a timeout) is logged and
/// also produces no event. Lookups run concurrently; events keep the order
/// of `previous`.
pub async fn detect_merged_prs(
    source: &dyn PullRequestSource,
    previous: &[PrSnapshot],
    current: &[PrSnapshot],
    projects: &[ProjectConfig],
    lookup_timeout: Duration,
) -> Vec<ChangeEvent> {
    let current_ids: HashSet<&PrIdentity> = current.iter().map(|s| &s.identity).collect();

    let candidates = previous.iter().filter_map(|prev| {
        if current_ids.contains(&prev.identity) || !prev.is_author {
            return None;
        }
        let project = projects.iter().find(|p| {
            p.is_same_project(&prev.identity.organization, &prev.identity.project)
        })?;
        Some((prev, project))
    });

    let lookups = candidates.map(|(prev, project)| async move {
        match verify_merged(source, prev, project, lookup_timeout).await {
            Ok(true) => Some(ChangeEvent::new(
                ChangeType::PrMerged,
                Severity::Low,
                prev,
                format!("PR #{} merged!", prev.pull_request_id()),
                prev.title.clone(),
            )),
            Ok(false) => None,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                log::warn!(
                    "[merge] Could not verify merge status for PR #{} in {}: {}",
                    prev.pull_request_id(),
                    project.label(),
                    e
                );
                None
            }
        }
    });

    join_all(lookups).await.into_iter().flatten().collect()
}

async fn verify_merged(
    source: &dyn PullRequestSource,
    prev: &PrSnapshot,
    project: &ProjectConfig,
    lookup_timeout: Duration,
) -> Result<bool, AppError> {
    let lookup = source.fetch_by_id(project, &prev.repository_id, prev.pull_request_id());
    let pr = tokio::time::timeout(lookup_timeout, lookup)
        .await
        .map_err(|_| AppError::timeout(format!("lookup of {}", prev.identity)))??;
    Ok(pr.status == PullRequestStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::azure::{GitPullRequest, GitPullRequestStatus};
    use crate::services::fetcher::UserIdentity;
    use crate::test_utils::{make_snapshot, test_project};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Lookup-only fake: answers `fetch_by_id` from a table and counts calls.
    struct LookupSource {
        answers: HashMap<i64, Result<&'static str, u16>>,
        calls: Mutex<Vec<i64>>,
        delay: Option<Duration>,
    }

    impl LookupSource {
        fn new(answers: Vec<(i64, Result<&'static str, u16>)>) -> Self {
            Self {
                answers: answers.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
                delay: None,
            }
        }
    }

    fn pr_with_status(id: i64, status: &str) -> GitPullRequest {
        serde_json::from_value(serde_json::json!({
            "pullRequestId": id,
            "title": "whatever",
            "status": status,
            "createdBy": { "id": "me", "displayName": "Me" },
            "creationDate": "2024-01-01T00:00:00Z",
            "repository": { "id": "repo-1", "name": "api" },
            "sourceRefName": "refs/heads/x",
            "targetRefName": "refs/heads/main"
        }))
        .unwrap()
    }

    #[async_trait]
    impl PullRequestSource for LookupSource {
        async fn fetch_active_prs(
            &self,
            _project: &ProjectConfig,
            _user_id: &str,
        ) -> Result<Vec<GitPullRequest>, AppError> {
            unreachable!("resolver never lists PRs")
        }

        async fn fetch_statuses(
            &self,
            _project: &ProjectConfig,
            _repository_id: &str,
            _pull_request_id: i64,
        ) -> Result<Vec<GitPullRequestStatus>, AppError> {
            unreachable!("resolver never fetches statuses")
        }

        async fn fetch_by_id(
            &self,
            _project: &ProjectConfig,
            _repository_id: &str,
            pull_request_id: i64,
        ) -> Result<GitPullRequest, AppError> {
            self.calls.lock().unwrap().push(pull_request_id);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.answers.get(&pull_request_id) {
                Some(Ok(status)) => Ok(pr_with_status(pull_request_id, status)),
                Some(Err(404)) | None => Err(AppError::not_found("pull request")),
                Some(Err(code)) => Err(AppError::azure_api_full("boom", *code, "lookup")),
            }
        }

        async fn fetch_current_user(
            &self,
            _project: &ProjectConfig,
        ) -> Result<UserIdentity, AppError> {
            unreachable!("resolver never resolves identities")
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_completed_lookup_emits_low_severity_merge() {
        let source = LookupSource::new(vec![(1, Ok("completed"))]);
        let previous = vec![make_snapshot(1)];

        let events =
            detect_merged_prs(&source, &previous, &[], &[test_project()], TIMEOUT).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::PrMerged);
        assert_eq!(events[0].severity, Severity::Low);
        assert_eq!(events[0].details.as_deref(), Some("Test PR 1"));
        assert_eq!(events[0].snapshot, previous[0]);
    }

    #[tokio::test]
    async fn test_not_found_is_silently_skipped() {
        let source = LookupSource::new(vec![(1, Err(404))]);

        let events =
            detect_merged_prs(&source, &[make_snapshot(1)], &[], &[test_project()], TIMEOUT)
                .await;
        assert!(events.is_empty());
        assert_eq!(*source.calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_abandoned_and_server_errors_emit_nothing() {
        let source = LookupSource::new(vec![(1, Ok("abandoned")), (2, Err(500))]);
        let previous = vec![make_snapshot(1), make_snapshot(2)];

        let events =
            detect_merged_prs(&source, &previous, &[], &[test_project()], TIMEOUT).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_only_authored_disappearances_are_looked_up() {
        let source = LookupSource::new(vec![(1, Ok("completed")), (2, Ok("completed"))]);
        let mut reviewed = make_snapshot(2);
        reviewed.is_author = false;
        reviewed.is_reviewer = true;
        let still_open = make_snapshot(3);

        let events = detect_merged_prs(
            &source,
            &[make_snapshot(1), reviewed, still_open.clone()],
            &[still_open],
            &[test_project()],
            TIMEOUT,
        )
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(*source.calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_unconfigured_project_is_skipped() {
        let source = LookupSource::new(vec![(1, Ok("completed"))]);
        let mut elsewhere = make_snapshot(1);
        elsewhere.identity.project = "Removed".to_string();

        let events =
            detect_merged_prs(&source, &[elsewhere], &[], &[test_project()], TIMEOUT).await;
        assert!(events.is_empty());
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out_without_event() {
        let mut source = LookupSource::new(vec![(1, Ok("completed"))]);
        source.delay = Some(Duration::from_secs(60));

        let events = detect_merged_prs(
            &source,
            &[make_snapshot(1)],
            &[],
            &[test_project()],
            Duration::from_secs(1),
        )
        .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_previous_order() {
        let source = LookupSource::new(vec![(5, Ok("completed")), (2, Ok("completed"))]);

        let events = detect_merged_prs(
            &source,
            &[make_snapshot(5), make_snapshot(2)],
            &[],
            &[test_project()],
            TIMEOUT,
        )
        .await;
        let ids: Vec<i64> = events.iter().map(|e| e.snapshot.pull_request_id()).collect();
        assert_eq!(ids, vec![5, 2]);
    }
}
