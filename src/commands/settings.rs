//! Settings commands for polling preferences.
//!
//! Settings are persisted in `settings.json` via [`SettingsStore`]. A running
//! daemon picks changes up through its settings watcher and reschedules.

use crate::error::AppError;
use crate::models::settings::MIN_POLL_INTERVAL_MINUTES;
use crate::models::Settings;
use crate::services::settings_store::SettingsStore;

/// Get the current settings.
pub async fn get_settings(store: &SettingsStore) -> Result<Settings, AppError> {
    store.load().await
}

/// Update the poll interval in minutes.
///
/// # Errors
/// - Invalid input if `minutes` is below the one-minute minimum
pub async fn set_poll_interval(store: &SettingsStore, minutes: u64) -> Result<Settings, AppError> {
    if minutes < MIN_POLL_INTERVAL_MINUTES {
        return Err(AppError::invalid_input_field(
            format!("Poll interval must be at least {} minute", MIN_POLL_INTERVAL_MINUTES),
            "pollIntervalMinutes",
        ));
    }

    let mut settings = store.load().await?;
    settings.poll_interval_minutes = minutes;
    store.save(settings).await
}

/// Turn change notifications on or off.
pub async fn set_notifications_enabled(
    store: &SettingsStore,
    enabled: bool,
) -> Result<Settings, AppError> {
    let mut settings = store.load().await?;
    settings.notifications_enabled = enabled;
    store.save(settings).await
}
