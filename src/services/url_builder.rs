//! Web URLs for Azure DevOps pages.

use crate::models::PrIdentity;
use crate::services::azure_client::DEFAULT_BASE_URL;

fn seg(s: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(s)
}

/// Direct link to a pull request.
pub fn pr_url(organization: &str, project: &str, repository: &str, pull_request_id: i64) -> String {
    format!(
        "{}/{}/{}/_git/{}/pullrequest/{}",
        DEFAULT_BASE_URL,
        seg(organization),
        seg(project),
        seg(repository),
        pull_request_id
    )
}

pub fn repo_url(organization: &str, project: &str, repository: &str) -> String {
    format!(
        "{}/{}/{}/_git/{}",
        DEFAULT_BASE_URL,
        seg(organization),
        seg(project),
        seg(repository)
    )
}

pub fn project_url(organization: &str, project: &str) -> String {
    format!("{}/{}/{}", DEFAULT_BASE_URL, seg(organization), seg(project))
}

/// Project-level PR route, for when the repository is unknown.
pub fn project_pr_url(organization: &str, project: &str, pull_request_id: i64) -> String {
    format!(
        "{}/{}/{}/_git/pullrequest/{}",
        DEFAULT_BASE_URL,
        seg(organization),
        seg(project),
        pull_request_id
    )
}

/// Best link for a PR: the direct route when the repository is known, the
/// project-level route otherwise.
pub fn pr_link(identity: &PrIdentity, repository_name: &str) -> String {
    if repository_name.is_empty() {
        project_pr_url(
            &identity.organization,
            &identity.project,
            identity.pull_request_id,
        )
    } else {
        pr_url(
            &identity.organization,
            &identity.project,
            repository_name,
            identity.pull_request_id,
        )
    }
}
