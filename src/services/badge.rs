//! Summary indicator: PR count plus an attention/celebration colour.

use crate::models::PrSnapshot;
use async_trait::async_trait;
use serde::Serialize;

pub const COLOR_ATTENTION: &str = "#E53935";
pub const COLOR_CELEBRATION: &str = "#FFB300";
pub const COLOR_OK: &str = "#43A047";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummary {
    pub total: usize,
    pub attention: usize,
    pub has_attention: bool,
    pub show_celebration: bool,
}

impl BadgeSummary {
    pub fn from_snapshots(snapshots: &[PrSnapshot], show_celebration: bool) -> Self {
        let attention = snapshots.iter().filter(|s| s.needs_attention()).count();
        Self {
            total: snapshots.len(),
            attention,
            has_attention: attention > 0,
            show_celebration,
        }
    }

    /// Badge text; empty when there is nothing to show.
    pub fn text(&self) -> String {
        if self.total == 0 {
            String::new()
        } else {
            self.total.to_string()
        }
    }

    pub fn color(&self) -> &'static str {
        if self.has_attention {
            COLOR_ATTENTION
        } else if self.show_celebration {
            COLOR_CELEBRATION
        } else {
            COLOR_OK
        }
    }
}

#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn update(&self, summary: &BadgeSummary);
}

/// Writes the summary to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSummary;

#[async_trait]
impl SummarySink for LogSummary {
    async fn update(&self, summary: &BadgeSummary) {
        log::info!(
            "[badge] {} open, {} need attention{} ({})",
            summary.total,
            summary.attention,
            if summary.show_celebration { ", unseen merge" } else { "" },
            summary.color()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MergeStatus, StatusState};
    use crate::test_utils::{make_snapshot, with_check};

    #[test]
    fn test_empty_badge_has_no_text() {
        let summary = BadgeSummary::from_snapshots(&[], false);
        assert_eq!(summary.text(), "");
        assert_eq!(summary.color(), COLOR_OK);
    }

    #[test]
    fn test_failing_authored_pr_needs_attention() {
        let snapshots = vec![
            with_check(make_snapshot(1), "ci/build", StatusState::Failed),
            make_snapshot(2),
        ];

        let summary = BadgeSummary::from_snapshots(&snapshots, true);
        assert_eq!(summary.text(), "2");
        assert_eq!(summary.attention, 1);
        assert_eq!(summary.color(), COLOR_ATTENTION);
    }

    #[test]
    fn test_conflicts_and_review_requests_count() {
        let mut conflicted = make_snapshot(1);
        conflicted.merge_status = Some(MergeStatus::Conflicts);
        let mut reviewing = make_snapshot(2);
        reviewing.is_author = false;
        reviewing.is_reviewer = true;

        let summary = BadgeSummary::from_snapshots(&[conflicted, reviewing], false);
        assert_eq!(summary.attention, 2);
    }

    #[test]
    fn test_celebration_colour_when_nothing_needs_attention() {
        let summary = BadgeSummary::from_snapshots(&[make_snapshot(1)], true);
        assert!(!summary.has_attention);
        assert_eq!(summary.color(), COLOR_CELEBRATION);
    }
}
