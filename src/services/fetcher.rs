//! Fetcher boundary: where the poller gets raw pull request data from.
//!
//! [`PullRequestSource`] is the seam the orchestrator and merge resolver are
//! written against; [`AzureDevOpsSource`] is the production implementation.

use crate::error::AppError;
use crate::models::azure::{GitPullRequest, GitPullRequestStatus};
use crate::models::ProjectConfig;
use crate::services::azure_client::{build_http_client, AzureClientConfig, AzureDevOpsClient};
use reqwest::Client;
use async_trait::async_trait;
use std::collections::HashSet;

/// Identity behind a project's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
}

/// Source of raw pull request data, authenticated per project.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Active PRs the user authored or reviews, without duplicates.
    async fn fetch_active_prs(
        &self,
        project: &ProjectConfig,
        user_id: &str,
    ) -> Result<Vec<GitPullRequest>, AppError>;

    /// Raw status records for one PR.
    async fn fetch_statuses(
        &self,
        project: &ProjectConfig,
        repository_id: &str,
        pull_request_id: i64,
    ) -> Result<Vec<GitPullRequestStatus>, AppError>;

    /// Point lookup of one PR; `AppError::NotFound` when it no longer exists.
    async fn fetch_by_id(
        &self,
        project: &ProjectConfig,
        repository_id: &str,
        pull_request_id: i64,
    ) -> Result<GitPullRequest, AppError>;

    /// Identity behind the project's PAT.
    async fn fetch_current_user(&self, project: &ProjectConfig) -> Result<UserIdentity, AppError>;
}

/// Merge authored and reviewing lists, keeping the first occurrence of each id.
pub fn dedupe_pull_requests(
    created: Vec<GitPullRequest>,
    reviewing: Vec<GitPullRequest>,
) -> Vec<GitPullRequest> {
    let mut seen = HashSet::new();
    created
        .into_iter()
        .chain(reviewing)
        .filter(|pr| seen.insert(pr.pull_request_id))
        .collect()
}

/// [`PullRequestSource`] backed by the Azure DevOps REST API.
///
/// One HTTP connection pool serves every project; each call only attaches
/// that project's PAT.
#[derive(Debug, Clone)]
pub struct AzureDevOpsSource {
    base_url: String,
    timeout_secs: u64,
    http: Client,
}

impl AzureDevOpsSource {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, AppError> {
        Ok(Self {
            base_url: base_url.into(),
            timeout_secs,
            http: build_http_client(timeout_secs)?,
        })
    }

    fn client_for(&self, project: &ProjectConfig) -> Result<AzureDevOpsClient, AppError> {
        AzureDevOpsClient::with_http_client(
            self.http.clone(),
            AzureClientConfig {
                base_url: self.base_url.clone(),
                organization: project.organization.clone(),
                pat: project.pat.clone(),
                timeout_secs: self.timeout_secs,
            },
        )
    }
}

#[async_trait]
impl PullRequestSource for AzureDevOpsSource {
    async fn fetch_active_prs(
        &self,
        project: &ProjectConfig,
        user_id: &str,
    ) -> Result<Vec<GitPullRequest>, AppError> {
        let client = self.client_for(project)?;
        let (created, reviewing) = futures::try_join!(
            client.list_active_pull_requests(
                &project.project,
                "searchCriteria.creatorId",
                user_id
            ),
            client.list_active_pull_requests(
                &project.project,
                "searchCriteria.reviewerId",
                user_id
            ),
        )?;
        Ok(dedupe_pull_requests(created, reviewing))
    }

    async fn fetch_statuses(
        &self,
        project: &ProjectConfig,
        repository_id: &str,
        pull_request_id: i64,
    ) -> Result<Vec<GitPullRequestStatus>, AppError> {
        self.client_for(project)?
            .list_pull_request_statuses(&project.project, repository_id, pull_request_id)
            .await
    }

    async fn fetch_by_id(
        &self,
        project: &ProjectConfig,
        repository_id: &str,
        pull_request_id: i64,
    ) -> Result<GitPullRequest, AppError> {
        self.client_for(project)?
            .get_pull_request(&project.project, repository_id, pull_request_id)
            .await
    }

    async fn fetch_current_user(&self, project: &ProjectConfig) -> Result<UserIdentity, AppError> {
        let data = self.client_for(project)?.get_connection_data().await?;
        Ok(UserIdentity {
            id: data.authenticated_user.id,
            display_name: data.authenticated_user.provider_display_name,
        })
    }
}
