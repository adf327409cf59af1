//! User settings: monitored projects and polling preferences.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default poll interval in minutes.
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 2;

/// Shortest poll interval accepted.
pub const MIN_POLL_INTERVAL_MINUTES: u64 = 1;

/// One monitored Azure DevOps project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Organization name (e.g. `myorg`).
    pub organization: String,

    /// Project name (e.g. `Platform`).
    pub project: String,

    /// Personal access token with Code (read) scope.
    pub pat: String,

    /// User id discovered on first successful connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Display name of the authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_display_name: Option<String>,
}

impl ProjectConfig {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        pat: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            pat: pat.into(),
            user_id: None,
            user_display_name: None,
        }
    }

    /// `org/project`, used in log lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.organization, self.project)
    }

    /// Resolved user id, if the project has been connected.
    pub fn connected_user(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_same_project(&self, organization: &str, project: &str) -> bool {
        self.organization == organization && self.project == project
    }
}

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,

    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MINUTES
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            notifications_enabled: true,
        }
    }
}

impl Settings {
    /// Poll period, never shorter than one minute.
    pub fn poll_interval(&self) -> Duration {
        let minutes = self.poll_interval_minutes.max(MIN_POLL_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn find_project(&self, organization: &str, project: &str) -> Option<&ProjectConfig> {
        self.projects
            .iter()
            .find(|p| p.is_same_project(organization, project))
    }
}
