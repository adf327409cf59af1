//! Pull request snapshot model.

use super::azure::{MergeStatus, ReviewerVote, StatusState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a pull request across polls.
///
/// Azure DevOps pull request ids are unique per project collection, so the
/// repository is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrIdentity {
    pub organization: String,
    pub project: String,
    pub pull_request_id: i64,
}

impl PrIdentity {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        pull_request_id: i64,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            pull_request_id,
        }
    }

    /// Display form `org/project/id`. Never parsed back.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.organization, self.project, self.pull_request_id
        )
    }

    /// Whether this PR lives in the given organization/project.
    pub fn is_in(&self, organization: &str, project: &str) -> bool {
        self.organization == organization && self.project == project
    }
}

impl std::fmt::Display for PrIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One pull request as observed at a poll instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrSnapshot {
    pub identity: PrIdentity,
    pub repository_id: String,
    pub repository_name: String,
    pub title: String,
    pub created_by_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_image_url: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub source_ref_name: String,
    pub target_ref_name: String,
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<MergeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merge_source_commit_id: Option<String>,
    /// Reviewer id -> vote.
    pub reviewer_votes: BTreeMap<String, ReviewerVote>,
    /// Reviewer id -> display name.
    pub reviewer_names: BTreeMap<String, String>,
    /// Status-check context -> latest state.
    pub status_checks: BTreeMap<String, StatusState>,
    pub is_author: bool,
    pub is_reviewer: bool,
    pub last_seen_at: DateTime<Utc>,
}

impl PrSnapshot {
    pub fn pull_request_id(&self) -> i64 {
        self.identity.pull_request_id
    }

    pub fn has_conflicts(&self) -> bool {
        self.merge_status == Some(MergeStatus::Conflicts)
    }

    pub fn has_failed_checks(&self) -> bool {
        self.status_checks.values().any(|s| s.is_failure())
    }

    pub fn has_rejection(&self) -> bool {
        self.reviewer_votes
            .values()
            .any(|v| *v == ReviewerVote::Rejected)
    }

    /// Whether this PR should raise the summary indicator's attention colour.
    ///
    /// Authored PRs need attention when conflicted or failing; PRs the user
    /// reviews but did not write always wait on the user.
    pub fn needs_attention(&self) -> bool {
        if self.is_author && (self.has_conflicts() || self.has_failed_checks()) {
            return true;
        }
        self.is_reviewer && !self.is_author
    }
}
