//! State carried from one poll cycle to the next.

use super::seen_record::SeenPrRecord;
use super::snapshot::PrSnapshot;
use chrono::{DateTime, Utc};

/// Everything the orchestrator loads at the start of a cycle and writes at
/// the end of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    /// Snapshot set written by the previous cycle.
    pub snapshots: Vec<PrSnapshot>,

    /// Seen-history records.
    pub seen_prs: Vec<SeenPrRecord>,

    /// Completion time of the last cycle.
    pub last_poll_at: Option<DateTime<Utc>>,

    /// When the user last acknowledged merged PRs.
    pub merged_ack_at: Option<DateTime<Utc>>,
}
