//! Projects raw API records into normalized [`PrSnapshot`]s.

use crate::models::azure::{GitPullRequest, GitPullRequestStatus, StatusState};
use crate::models::{PrIdentity, PrSnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Reduce a status list to the latest state per context.
///
/// Azure DevOps keeps every status posted on a PR (one per pipeline re-run),
/// so the same context can appear several times. The record with the latest
/// `updatedDate` (or `creationDate` when never updated) wins; on a tie the
/// first record seen is kept.
pub fn latest_status_by_context(
    statuses: &[GitPullRequestStatus],
) -> BTreeMap<String, StatusState> {
    let mut latest: BTreeMap<String, (DateTime<Utc>, StatusState)> = BTreeMap::new();

    for status in statuses {
        let key = status.context.key();
        let date = status.effective_date();
        match latest.get(&key) {
            Some((existing, _)) if date <= *existing => {}
            _ => {
                latest.insert(key, (date, status.state));
            }
        }
    }

    latest
        .into_iter()
        .map(|(context, (_, state))| (context, state))
        .collect()
}

/// Build a snapshot of `pr` as seen by `user_id` at `now`.
pub fn build_snapshot(
    pr: &GitPullRequest,
    statuses: &[GitPullRequestStatus],
    organization: &str,
    project: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> PrSnapshot {
    let mut reviewer_votes = BTreeMap::new();
    let mut reviewer_names = BTreeMap::new();

    for reviewer in &pr.reviewers {
        reviewer_votes.insert(reviewer.id.clone(), reviewer.vote);
        reviewer_names.insert(reviewer.id.clone(), reviewer.display_name.clone());
    }

    PrSnapshot {
        identity: PrIdentity::new(organization, project, pr.pull_request_id),
        repository_id: pr.repository.id.clone(),
        repository_name: pr.repository.name.clone(),
        title: pr.title.clone(),
        created_by_name: pr.created_by.display_name.clone(),
        created_by_image_url: pr.created_by.image_url.clone(),
        creation_date: pr.creation_date,
        source_ref_name: pr.source_ref_name.clone(),
        target_ref_name: pr.target_ref_name.clone(),
        is_draft: pr.is_draft,
        merge_status: pr.merge_status,
        last_merge_source_commit_id: pr
            .last_merge_source_commit
            .as_ref()
            .map(|c| c.commit_id.clone()),
        reviewer_votes,
        reviewer_names,
        status_checks: latest_status_by_context(statuses),
        is_author: pr.created_by.id == user_id,
        is_reviewer: pr.reviewers.iter().any(|r| r.id == user_id),
        last_seen_at: now,
    }
}
