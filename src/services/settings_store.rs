//! Settings persistence.
//!
//! Settings are the durable class of state: they survive restarts and are
//! only changed by explicit user action. They live in a JSON file inside the
//! configuration directory, separate from the poll-state database.

use crate::error::AppError;
use crate::models::settings::MIN_POLL_INTERVAL_MINUTES;
use crate::models::{ProjectConfig, Settings};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Store filename for settings.
pub const SETTINGS_FILE: &str = "settings.json";

/// The file holds personal access tokens: owner read/write only.
#[cfg(unix)]
pub const SETTINGS_FILE_MODE: u32 = 0o600;

/// JSON-file settings store.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    /// Serializes read-modify-write sequences.
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store rooted in a configuration directory.
    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, using defaults if the file does not exist yet.
    pub async fn load(&self) -> Result<Settings, AppError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::config(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and write settings. Returns what was written.
    pub async fn save(&self, settings: Settings) -> Result<Settings, AppError> {
        let _guard = self.write_lock.lock().await;
        self.write(settings).await
    }

    /// Add a project, or replace the one with the same organization/project.
    pub async fn upsert_project(&self, project: ProjectConfig) -> Result<Settings, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await?;

        match settings
            .projects
            .iter_mut()
            .find(|p| p.is_same_project(&project.organization, &project.project))
        {
            Some(existing) => *existing = project,
            None => settings.projects.push(project),
        }

        self.write(settings).await
    }

    /// Remove a project. Fails if it is not configured.
    pub async fn remove_project(
        &self,
        organization: &str,
        project: &str,
    ) -> Result<Settings, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await?;

        let before = settings.projects.len();
        settings
            .projects
            .retain(|p| !p.is_same_project(organization, project));
        if settings.projects.len() == before {
            return Err(AppError::not_found_with_id(
                "project",
                format!("{}/{}", organization, project),
            ));
        }

        self.write(settings).await
    }

    async fn write(&self, settings: Settings) -> Result<Settings, AppError> {
        let settings = validate(settings)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling file then rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&settings)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(SETTINGS_FILE_MODE);
        let mut file = options.open(&tmp).await?;
        // `mode` only applies on creation; a leftover temp file keeps its own.
        #[cfg(unix)]
        file.set_permissions(std::fs::Permissions::from_mode(SETTINGS_FILE_MODE))
            .await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(settings)
    }
}

/// Check required fields and duplicates; clamp the poll interval.
pub fn validate(mut settings: Settings) -> Result<Settings, AppError> {
    for (i, project) in settings.projects.iter_mut().enumerate() {
        project.organization = project.organization.trim().to_string();
        project.project = project.project.trim().to_string();

        if project.organization.is_empty() {
            return Err(AppError::invalid_input_field(
                "Organization is required",
                format!("projects[{}].organization", i),
            ));
        }
        if project.project.is_empty() {
            return Err(AppError::invalid_input_field(
                "Project is required",
                format!("projects[{}].project", i),
            ));
        }
        if project.pat.trim().is_empty() {
            return Err(AppError::invalid_input_field(
                "Personal access token is required",
                format!("projects[{}].pat", i),
            ));
        }
    }

    for (i, project) in settings.projects.iter().enumerate() {
        if settings.projects[..i]
            .iter()
            .any(|p| p.is_same_project(&project.organization, &project.project))
        {
            return Err(AppError::invalid_input_field(
                format!("Project {} is configured twice", project.label()),
                "projects",
            ));
        }
    }

    settings.poll_interval_minutes = settings
        .poll_interval_minutes
        .max(MIN_POLL_INTERVAL_MINUTES);

    Ok(settings)
}
