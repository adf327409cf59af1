//! Status listing: the pull requests from the last poll, ready to display.

use crate::error::AppError;
use crate::models::{MergeStatus, PrIdentity, PrSnapshot, ReviewerVote, StatusState};
use crate::services::settings_store::SettingsStore;
use crate::services::state_store::PollStateStore;
use crate::services::url_builder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Overall health of a PR, as shown by its status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Fail,
    Pending,
    Ok,
}

impl std::fmt::Display for StatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Pending => write!(f, "pending"),
            Self::Ok => write!(f, "ok"),
        }
    }
}

/// One row of the status list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrListItem {
    pub identity: PrIdentity,
    pub repository_name: String,
    pub title: String,
    pub created_by_name: String,
    pub source_branch: String,
    pub target_branch: String,
    pub url: String,
    pub repository_url: String,
    pub status_class: StatusClass,
    pub badges: Vec<String>,
    pub needs_attention: bool,
}

impl PrListItem {
    pub fn from_snapshot(pr: &PrSnapshot) -> Self {
        Self {
            identity: pr.identity.clone(),
            repository_name: pr.repository_name.clone(),
            title: pr.title.clone(),
            created_by_name: pr.created_by_name.clone(),
            source_branch: shorten_ref(&pr.source_ref_name).to_string(),
            target_branch: shorten_ref(&pr.target_ref_name).to_string(),
            url: url_builder::pr_link(&pr.identity, &pr.repository_name),
            repository_url: url_builder::repo_url(
                &pr.identity.organization,
                &pr.identity.project,
                &pr.repository_name,
            ),
            status_class: status_class(pr),
            badges: badges(pr),
            needs_attention: list_needs_attention(pr),
        }
    }
}

/// Response for the status command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Whether any project is configured at all.
    pub configured: bool,
    pub last_updated: String,
    pub has_unseen_merge: bool,
    pub items: Vec<PrListItem>,
}

/// Get the pull requests from the last completed poll.
///
/// Items needing attention come first, then newest first.
pub async fn get_status(
    settings: &SettingsStore,
    state: &dyn PollStateStore,
    now: DateTime<Utc>,
) -> Result<StatusResponse, AppError> {
    let settings = settings.load().await?;
    let state = state.load().await?;

    let mut snapshots = state.snapshots;
    sort_for_display(&mut snapshots);

    Ok(StatusResponse {
        configured: !settings.projects.is_empty(),
        last_updated: last_updated_text(state.last_poll_at, now),
        has_unseen_merge: crate::services::seen_history::has_unseen_merge(
            &state.seen_prs,
            state.merged_ack_at,
        ),
        items: snapshots.iter().map(PrListItem::from_snapshot).collect(),
    })
}

/// Attention-needed first, then by creation date, newest first.
pub fn sort_for_display(snapshots: &mut [PrSnapshot]) {
    snapshots.sort_by(|a, b| {
        match (list_needs_attention(a), list_needs_attention(b)) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => b.creation_date.cmp(&a.creation_date),
        }
    });
}

/// Attention rule for the list: a rejection on any PR, or an authored PR
/// that is conflicted or failing.
pub fn list_needs_attention(pr: &PrSnapshot) -> bool {
    (pr.is_author && (pr.has_conflicts() || pr.has_failed_checks())) || pr.has_rejection()
}

pub fn status_class(pr: &PrSnapshot) -> StatusClass {
    let checks = || pr.status_checks.values();

    if pr.has_conflicts() || checks().any(|s| s.is_failure()) {
        return StatusClass::Fail;
    }
    if checks().any(|s| *s == StatusState::Pending) {
        return StatusClass::Pending;
    }
    if !pr.status_checks.is_empty() && checks().all(|s| *s == StatusState::Succeeded) {
        return StatusClass::Ok;
    }
    if pr.has_rejection() {
        return StatusClass::Fail;
    }
    StatusClass::Pending
}

pub fn badges(pr: &PrSnapshot) -> Vec<String> {
    let mut badges = Vec::new();

    if pr.is_draft {
        badges.push("Draft".to_string());
    }
    if pr.merge_status == Some(MergeStatus::Conflicts) {
        badges.push("Conflicts".to_string());
    }

    let count_votes =
        |vote: ReviewerVote| pr.reviewer_votes.values().filter(|v| **v == vote).count();
    let rejected = count_votes(ReviewerVote::Rejected);
    let waiting = count_votes(ReviewerVote::WaitingForAuthor);
    let approved = count_votes(ReviewerVote::Approved);

    if rejected > 0 {
        badges.push(format!("{} Rejected", rejected));
    }
    if waiting > 0 {
        badges.push(format!("{} Waiting", waiting));
    }
    if approved > 0 {
        badges.push(format!("{} Approved", approved));
    }

    let checks = pr.status_checks.values();
    let failed = checks.clone().filter(|s| s.is_failure()).count();
    let pending = checks.clone().filter(|s| **s == StatusState::Pending).count();
    let passed = checks.filter(|s| **s == StatusState::Succeeded).count();

    if failed > 0 {
        badges.push(format!("{} Failed", failed));
    }
    if pending > 0 {
        badges.push(format!("{} Pending", pending));
    }
    if passed > 0 && failed == 0 && pending == 0 {
        badges.push("Checks OK".to_string());
    }

    badges
}

/// `refs/heads/feature/x` -> `feature/x`.
pub fn shorten_ref(ref_name: &str) -> &str {
    ref_name.strip_prefix("refs/heads/").unwrap_or(ref_name)
}

/// "Never polled", "Just now" or "{n}m ago".
pub fn last_updated_text(last_poll_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last) = last_poll_at else {
        return "Never polled".to_string();
    };
    let minutes = ((now - last).num_seconds() as f64 / 60.0).round() as i64;
    if minutes < 1 {
        "Just now".to_string()
    } else {
        format!("{}m ago", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PollState;
    use crate::test_utils::{make_snapshot, test_now, with_check, MemoryStore};
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_last_updated_text() {
        let now = test_now();
        assert_eq!(last_updated_text(None, now), "Never polled");
        assert_eq!(last_updated_text(Some(now - Duration::seconds(20)), now), "Just now");
        assert_eq!(last_updated_text(Some(now - Duration::seconds(40)), now), "1m ago");
        assert_eq!(last_updated_text(Some(now - Duration::minutes(12)), now), "12m ago");
    }

    #[test]
    fn test_shorten_ref() {
        assert_eq!(shorten_ref("refs/heads/feature/login"), "feature/login");
        assert_eq!(shorten_ref("refs/tags/v1"), "refs/tags/v1");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(&make_snapshot(1)), StatusClass::Pending);
        assert_eq!(
            status_class(&with_check(make_snapshot(1), "ci", StatusState::Succeeded)),
            StatusClass::Ok
        );
        assert_eq!(
            status_class(&with_check(make_snapshot(1), "ci", StatusState::Error)),
            StatusClass::Fail
        );

        let mut rejected = with_check(make_snapshot(1), "ci", StatusState::Pending);
        rejected
            .reviewer_votes
            .insert("r1".into(), ReviewerVote::Rejected);
        assert_eq!(status_class(&rejected), StatusClass::Pending);
        rejected.status_checks.clear();
        assert_eq!(status_class(&rejected), StatusClass::Fail);
    }

    #[test]
    fn test_badges() {
        let mut pr = with_check(make_snapshot(1), "ci", StatusState::Succeeded);
        pr.is_draft = true;
        pr.reviewer_votes.insert("a".into(), ReviewerVote::Approved);
        pr.reviewer_votes.insert("b".into(), ReviewerVote::Approved);
        pr.reviewer_votes
            .insert("c".into(), ReviewerVote::WaitingForAuthor);

        assert_eq!(badges(&pr), vec!["Draft", "1 Waiting", "2 Approved", "Checks OK"]);

        let failing = with_check(pr, "lint", StatusState::Failed);
        assert!(badges(&failing).contains(&"1 Failed".to_string()));
        assert!(!badges(&failing).contains(&"Checks OK".to_string()));
    }

    #[test]
    fn test_sort_puts_attention_first_then_newest() {
        let mut old = make_snapshot(1);
        old.creation_date = test_now() - Duration::days(3);
        let mut new = make_snapshot(2);
        new.creation_date = test_now() - Duration::days(1);
        let mut failing = with_check(make_snapshot(3), "ci", StatusState::Failed);
        failing.creation_date = test_now() - Duration::days(10);

        let mut list = vec![old, new, failing];
        sort_for_display(&mut list);

        let ids: Vec<i64> = list.iter().map(|s| s.pull_request_id()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_get_status() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsStore::in_dir(dir.path());
        let now = test_now();
        let state = MemoryStore::with_state(PollState {
            snapshots: vec![make_snapshot(7)],
            last_poll_at: Some(now - Duration::minutes(3)),
            ..Default::default()
        });

        let status = get_status(&settings, &state, now).await.unwrap();

        assert!(!status.configured);
        assert_eq!(status.last_updated, "3m ago");
        assert!(!status.has_unseen_merge);
        assert_eq!(status.items.len(), 1);
        assert_eq!(status.items[0].source_branch, "feature");
        assert_eq!(
            status.items[0].url,
            "https://dev.azure.com/myorg/Platform/_git/api/pullrequest/7"
        );
        assert_eq!(
            status.items[0].repository_url,
            "https://dev.azure.com/myorg/Platform/_git/api"
        );
    }
}
