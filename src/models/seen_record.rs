//! Rolling history of pull requests the poller has observed.

use super::snapshot::{PrIdentity, PrSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last observed lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Merged,
}

impl From<&str> for LifecycleState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "merged" => Self::Merged,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// One entry of the seen-history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenPrRecord {
    pub identity: PrIdentity,
    pub repository_name: String,
    pub title: String,
    pub last_known_state: LifecycleState,
    pub last_seen_at: DateTime<Utc>,
}

impl SeenPrRecord {
    pub fn from_snapshot(
        snapshot: &PrSnapshot,
        state: LifecycleState,
        seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity: snapshot.identity.clone(),
            repository_name: snapshot.repository_name.clone(),
            title: snapshot.title.clone(),
            last_known_state: state,
            last_seen_at: seen_at,
        }
    }
}
