//! Change events produced by diffing two poll results.

use super::snapshot::PrSnapshot;
use serde::{Deserialize, Serialize};

/// Kind of detected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PipelineFailed,
    PipelineRecovered,
    NewPush,
    VoteChanged,
    MergeConflict,
    PrMerged,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PipelineFailed => "pipeline_failed",
            Self::PipelineRecovered => "pipeline_recovered",
            Self::NewPush => "new_push",
            Self::VoteChanged => "vote_changed",
            Self::MergeConflict => "merge_conflict",
            Self::PrMerged => "pr_merged",
        };
        f.write_str(s)
    }
}

/// How prominently a change should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One detected transition. Consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub change_type: ChangeType,
    pub severity: Severity,
    /// Current snapshot, or the last-known one for merges.
    pub snapshot: PrSnapshot,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ChangeEvent {
    pub fn new(
        change_type: ChangeType,
        severity: Severity,
        snapshot: &PrSnapshot,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            change_type,
            severity,
            snapshot: snapshot.clone(),
            description: description.into(),
            details: Some(details.into()),
        }
    }
}
