//! Project commands: add, connect, remove and list monitored projects.
//!
//! Connecting a project resolves the user behind its PAT, which the poller
//! needs to find authored and reviewed pull requests.

use crate::error::AppError;
use crate::models::ProjectConfig;
use crate::services::fetcher::PullRequestSource;
use crate::services::settings_store::SettingsStore;
use crate::services::url_builder;
use serde::{Deserialize, Serialize};

/// Input for add_project command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProjectInput {
    /// Organization name.
    pub organization: String,

    /// Project name.
    pub project: String,

    /// Personal access token.
    pub pat: String,
}

/// Response for add_project and connect_project commands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub project: ProjectConfig,

    /// Display name of the authenticated user.
    pub display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub organization: String,
    pub project: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_as: Option<String>,
}

/// Add a new project.
///
/// This command:
/// 1. Validates the input
/// 2. Verifies the PAT by resolving the authenticated user
/// 3. Stores the project with the resolved user id
///
/// # Errors
/// - Invalid input if a field is blank or the project is already configured
/// - Authentication error if the PAT is rejected
pub async fn add_project(
    settings: &SettingsStore,
    source: &dyn PullRequestSource,
    input: AddProjectInput,
) -> Result<ConnectResponse, AppError> {
    let config = ProjectConfig::new(
        input.organization.trim(),
        input.project.trim(),
        input.pat.trim(),
    );
    require_fields(&config)?;

    let current = settings.load().await?;
    if current
        .find_project(&config.organization, &config.project)
        .is_some()
    {
        return Err(AppError::invalid_input(format!(
            "{} is already configured",
            config.label()
        )));
    }

    connect(settings, source, config).await
}

/// Re-resolve the user for an already configured project.
pub async fn connect_project(
    settings: &SettingsStore,
    source: &dyn PullRequestSource,
    organization: &str,
    project: &str,
) -> Result<ConnectResponse, AppError> {
    let current = settings.load().await?;
    let config = current
        .find_project(organization, project)
        .cloned()
        .ok_or_else(|| {
            AppError::not_found_with_id("project", format!("{}/{}", organization, project))
        })?;

    connect(settings, source, config).await
}

async fn connect(
    settings: &SettingsStore,
    source: &dyn PullRequestSource,
    mut config: ProjectConfig,
) -> Result<ConnectResponse, AppError> {
    let user = source
        .fetch_current_user(&config)
        .await
        .map_err(|e| match e {
            AppError::AuthenticationExpired { message, .. } => {
                AppError::authentication_expired_for_project(
                    message,
                    &config.organization,
                    &config.project,
                )
            }
            other => other,
        })?;

    config.user_id = Some(user.id);
    config.user_display_name = Some(user.display_name.clone());
    settings.upsert_project(config.clone()).await?;

    log::info!(
        "[projects] Connected {} as {}",
        config.label(),
        user.display_name
    );

    Ok(ConnectResponse {
        project: config,
        display_name: user.display_name,
    })
}

/// Remove a project from the monitored set.
pub async fn remove_project(
    settings: &SettingsStore,
    organization: &str,
    project: &str,
) -> Result<(), AppError> {
    settings.remove_project(organization, project).await?;
    log::info!("[projects] Removed {}/{}", organization, project);
    Ok(())
}

/// Get all configured projects. PATs are not included.
pub async fn list_projects(settings: &SettingsStore) -> Result<Vec<ProjectSummary>, AppError> {
    let settings = settings.load().await?;
    Ok(settings
        .projects
        .into_iter()
        .map(|p| ProjectSummary {
            connected_as: p
                .connected_user()
                .map(|_| p.user_display_name.clone().unwrap_or_default()),
            url: url_builder::project_url(&p.organization, &p.project),
            organization: p.organization,
            project: p.project,
        })
        .collect())
}

fn require_fields(config: &ProjectConfig) -> Result<(), AppError> {
    for (value, field) in [
        (&config.organization, "organization"),
        (&config.project, "project"),
        (&config.pat, "pat"),
    ] {
        if value.is_empty() {
            return Err(AppError::invalid_input_field(
                "All fields are required",
                field,
            ));
        }
    }
    Ok(())
}
