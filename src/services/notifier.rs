//! Notification consumer seam.
//!
//! The poller turns each change event into a [`Notification`] and hands the
//! batch to a [`NotificationSink`]. Desktop display is out of scope here;
//! [`LogNotifier`] writes them to the log.

use crate::models::{ChangeEvent, PrIdentity, Severity};
use crate::services::url_builder;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Where clicking a notification should lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrTarget {
    pub identity: PrIdentity,
    pub repository_name: String,
    pub url: String,
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    /// 2 for high severity, 1 otherwise.
    pub priority: u8,
    pub require_interaction: bool,
    pub target: PrTarget,
}

impl Notification {
    pub fn from_event(event: &ChangeEvent) -> Self {
        let snapshot = &event.snapshot;
        let high = event.severity == Severity::High;
        Self {
            id: Uuid::new_v4(),
            title: event.description.clone(),
            message: event.details.clone().unwrap_or_default(),
            priority: if high { 2 } else { 1 },
            require_interaction: high,
            target: PrTarget {
                identity: snapshot.identity.clone(),
                repository_name: snapshot.repository_name.clone(),
                url: url_builder::pr_link(&snapshot.identity, &snapshot.repository_name),
            },
        }
    }
}

/// Build one notification per event, in event order.
pub fn build_notifications(events: &[ChangeEvent]) -> Vec<Notification> {
    events.iter().map(Notification::from_event).collect()
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notifications: &[Notification]);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notifications: &[Notification]) {
        for n in notifications {
            if n.require_interaction {
                log::warn!("[notify] {}: {} ({})", n.title, n.message, n.target.url);
            } else {
                log::info!("[notify] {}: {} ({})", n.title, n.message, n.target.url);
            }
        }
    }
}
