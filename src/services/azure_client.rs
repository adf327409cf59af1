//! Azure DevOps API client.
//!
//! Thin HTTP wrapper for the Git pull request endpoints, authenticated with a
//! personal access token. Failures are mapped onto [`AppError`] categories so
//! callers can tell an expired token from a missing PR or a rate limit.

use crate::error::AppError;
use crate::models::azure::{
    ApiListResponse, ConnectionData, GitPullRequest, GitPullRequestStatus,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Public Azure DevOps services host.
pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// REST API version sent with every request.
const API_VERSION: &str = "7.0-preview";

/// Azure DevOps API client configuration.
#[derive(Debug, Clone)]
pub struct AzureClientConfig {
    /// Host serving the REST API (overridden in tests).
    pub base_url: String,

    /// Organization name; first path segment of every request.
    pub organization: String,

    /// Personal access token.
    pub pat: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AzureClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: String::new(),
            pat: String::new(),
            timeout_secs: 30,
        }
    }
}

/// `Basic` header value for a PAT (empty user name).
pub fn basic_auth_header(pat: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{}", pat)))
}

/// HTTP client shared by every organization and project, so status fetches
/// and lookups reuse pooled connections. Credentials go on each request.
pub fn build_http_client(timeout_secs: u64) -> Result<Client, AppError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))
}

/// Azure DevOps API client for a single organization.
#[derive(Debug, Clone)]
pub struct AzureDevOpsClient {
    client: Client,
    auth: header::HeaderValue,
    config: AzureClientConfig,
}

impl AzureDevOpsClient {
    /// Create a new client with its own connection pool.
    pub fn new(config: AzureClientConfig) -> Result<Self, AppError> {
        let client = build_http_client(config.timeout_secs)?;
        Self::with_http_client(client, config)
    }

    /// Create a client on top of an existing connection pool. The pool's
    /// own timeout applies; `config.timeout_secs` is ignored.
    pub fn with_http_client(client: Client, config: AzureClientConfig) -> Result<Self, AppError> {
        let mut auth = header::HeaderValue::from_str(&basic_auth_header(&config.pat))
            .map_err(|_| AppError::invalid_input_field("Invalid token format", "pat"))?;
        auth.set_sensitive(true);

        Ok(Self {
            client,
            auth,
            config,
        })
    }

    /// Full URL for a path relative to the organization.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.organization),
            path.trim_start_matches('/')
        )
    }

    /// Parse the `Retry-After` header (seconds form).
    fn retry_after_secs(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }

    /// Map a response onto the decoded body or a categorized error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)));
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(AppError::authentication_expired(
                "Personal access token expired or revoked.",
            )),
            StatusCode::NOT_FOUND => Err(AppError::not_found_with_id("resource", endpoint)),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = Self::retry_after_secs(&response);
                Err(AppError::rate_limited(
                    format!("Rate limit exceeded on {}", endpoint),
                    retry_after,
                ))
            }
            _ => {
                let status_code = status.as_u16();
                let body = response.text().await.unwrap_or_default();
                // Azure DevOps returns errors as {"message": "...", "typeKey": "..."}
                let message = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                    .unwrap_or_else(|| match status {
                        StatusCode::FORBIDDEN => "Access denied".to_string(),
                        _ => format!("Request failed ({}): {}", status_code, body),
                    });
                Err(AppError::azure_api_full(message, status_code, endpoint))
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let url = self.api_url(path);
        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.auth.clone())
            .query(query)
            .query(&[("api-version", API_VERSION)])
            .send()
            .await?;
        self.handle_response(response, path).await
    }

    /// Discover the identity behind the PAT.
    pub async fn get_connection_data(&self) -> Result<ConnectionData, AppError> {
        self.get("_apis/connectionData", &[]).await
    }

    /// Active PRs in a project matching one search criterion
    /// (`searchCriteria.creatorId` or `searchCriteria.reviewerId`).
    pub async fn list_active_pull_requests(
        &self,
        project: &str,
        criterion: &str,
        user_id: &str,
    ) -> Result<Vec<GitPullRequest>, AppError> {
        let path = format!("{}/_apis/git/pullrequests", urlencoding::encode(project));
        let response: ApiListResponse<GitPullRequest> = self
            .get(
                &path,
                &[("searchCriteria.status", "active"), (criterion, user_id)],
            )
            .await?;
        Ok(response.value)
    }

    /// All status records posted on a PR (may contain several per context).
    pub async fn list_pull_request_statuses(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: i64,
    ) -> Result<Vec<GitPullRequestStatus>, AppError> {
        let path = format!(
            "{}/_apis/git/repositories/{}/pullRequests/{}/statuses",
            urlencoding::encode(project),
            urlencoding::encode(repository),
            pull_request_id
        );
        let response: ApiListResponse<GitPullRequestStatus> = self.get(&path, &[]).await?;
        Ok(response.value)
    }

    /// Point lookup of a single PR, whatever its status.
    pub async fn get_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: i64,
    ) -> Result<GitPullRequest, AppError> {
        let path = format!(
            "{}/_apis/git/repositories/{}/pullRequests/{}",
            urlencoding::encode(project),
            urlencoding::encode(repository),
            pull_request_id
        );
        self.get(&path, &[]).await
    }
}
