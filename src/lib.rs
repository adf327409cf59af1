//! pr-radar - Azure DevOps pull request watcher.
//!
//! Polls the pull requests a user authored or reviews, diffs each poll
//! against the previous one and reports meaningful transitions (pipeline
//! failures, pushes, votes, conflicts, merges) as notifications plus a
//! summary badge. The `pr-radar` binary drives it from the command line.

pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_utils;

use crate::error::AppError;
use crate::services::azure_client::DEFAULT_BASE_URL;
use crate::services::badge::LogSummary;
use crate::services::fetcher::AzureDevOpsSource;
use crate::services::notifier::LogNotifier;
use crate::services::poller::Poller;
use crate::services::settings_store::SettingsStore;
use crate::services::state_store::SqliteStateStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-request HTTP timeout for the Azure DevOps API.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Where settings and poll state live.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Platform defaults, e.g. `~/.config/pr-radar` and `~/.local/share/pr-radar`.
    pub fn platform_default() -> Result<Self, AppError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::config("Could not determine configuration directory"))?;
        let data_dir = dirs::data_dir()
            .ok_or_else(|| AppError::config("Could not determine data directory"))?;
        Ok(Self {
            config_dir: config_dir.join("pr-radar"),
            data_dir: data_dir.join("pr-radar"),
        })
    }
}

/// Everything a command needs, wired to the real backends.
pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub state: Arc<SqliteStateStore>,
    pub source: Arc<AzureDevOpsSource>,
    pub poller: Arc<Poller>,
}

impl AppContext {
    /// Open the settings file and database (running migrations) and wire the
    /// poller to the Azure DevOps API and the log-backed sinks.
    pub async fn open(paths: &AppPaths) -> Result<Self, AppError> {
        let settings = Arc::new(SettingsStore::in_dir(&paths.config_dir));

        let pool = db::initialize(&db::get_db_path(&paths.data_dir)).await?;
        let state = Arc::new(SqliteStateStore::new(pool));
        let source = Arc::new(AzureDevOpsSource::new(
            DEFAULT_BASE_URL,
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        let poller = Arc::new(Poller::new(
            settings.clone(),
            state.clone(),
            source.clone(),
            Arc::new(LogNotifier),
            Arc::new(LogSummary),
        ));

        Ok(Self {
            settings,
            state,
            source,
            poller,
        })
    }
}
