//! Azure DevOps REST payloads.
//!
//! Only the fields the poller reads are modelled; everything else in the
//! responses is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// List response wrapper (`{ "count": n, "value": [...] }`).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiListResponse<T> {
    #[serde(default)]
    pub count: usize,
    pub value: Vec<T>,
}

/// Lifecycle status of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullRequestStatus {
    Active,
    Completed,
    Abandoned,
    NotSet,
    #[serde(other)]
    Unknown,
}

/// Merge status of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStatus {
    NotSet,
    Queued,
    Succeeded,
    Conflicts,
    Failure,
    RejectedByPolicy,
    #[serde(other)]
    Unknown,
}

/// State reported by a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusState {
    Error,
    Failed,
    NotApplicable,
    NotSet,
    Pending,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl StatusState {
    /// `failed` and `error` both count as a broken pipeline.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Failed => "failed",
            Self::NotApplicable => "notApplicable",
            Self::NotSet => "notSet",
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A reviewer's vote. Azure DevOps encodes these as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ReviewerVote {
    Rejected,
    WaitingForAuthor,
    NoVote,
    ApprovedWithSuggestions,
    Approved,
    Other(i32),
}

impl From<i32> for ReviewerVote {
    fn from(value: i32) -> Self {
        match value {
            -10 => Self::Rejected,
            -5 => Self::WaitingForAuthor,
            0 => Self::NoVote,
            5 => Self::ApprovedWithSuggestions,
            10 => Self::Approved,
            other => Self::Other(other),
        }
    }
}

impl From<ReviewerVote> for i32 {
    fn from(vote: ReviewerVote) -> Self {
        match vote {
            ReviewerVote::Rejected => -10,
            ReviewerVote::WaitingForAuthor => -5,
            ReviewerVote::NoVote => 0,
            ReviewerVote::ApprovedWithSuggestions => 5,
            ReviewerVote::Approved => 10,
            ReviewerVote::Other(v) => v,
        }
    }
}

impl ReviewerVote {
    /// Human label shown in vote-change notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::ApprovedWithSuggestions => "Approved with suggestions",
            Self::WaitingForAuthor => "Waiting for author",
            Self::Rejected => "Rejected",
            Self::NoVote | Self::Other(_) => "No vote",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerWithVote {
    pub id: String,
    pub display_name: String,
    pub vote: ReviewerVote,
    #[serde(default)]
    pub is_required: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommitRef {
    pub commit_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamProjectRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRepositoryRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project: Option<TeamProjectRef>,
}

/// `GitPullRequest` as returned by the pull request endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitPullRequest {
    pub pull_request_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: PullRequestStatus,
    pub created_by: IdentityRef,
    pub creation_date: DateTime<Utc>,
    pub repository: GitRepositoryRef,
    pub source_ref_name: String,
    pub target_ref_name: String,
    #[serde(default)]
    pub merge_status: Option<MergeStatus>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub reviewers: Vec<ReviewerWithVote>,
    #[serde(default)]
    pub last_merge_source_commit: Option<GitCommitRef>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusContext {
    pub name: String,
    #[serde(default)]
    pub genre: Option<String>,
}

impl StatusContext {
    /// Key used in the snapshot's check map: `genre/name`, or just `name`.
    pub fn key(&self) -> String {
        match self.genre.as_deref() {
            Some(genre) if !genre.is_empty() => format!("{}/{}", genre, self.name),
            _ => self.name.clone(),
        }
    }
}

/// A pipeline / status check posted on a pull request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitPullRequestStatus {
    pub id: i64,
    pub state: StatusState,
    #[serde(default)]
    pub description: Option<String>,
    pub context: StatusContext,
    #[serde(default)]
    pub target_url: Option<String>,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
}

impl GitPullRequestStatus {
    /// The timestamp used to pick the latest record per context.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.updated_date.unwrap_or(self.creation_date)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub id: String,
    pub provider_display_name: String,
}

/// `_apis/connectionData` response used for identity discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    pub authenticated_user: AuthenticatedUser,
}
