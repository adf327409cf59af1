//! Seen-history tracker: rolling record of every PR the poller has observed.

use crate::models::{ChangeEvent, ChangeType, LifecycleState, PrIdentity, PrSnapshot, SeenPrRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Records not refreshed within this window are dropped.
pub const SEEN_PR_RETENTION_DAYS: i64 = 7;

pub fn retention() -> Duration {
    Duration::days(SEEN_PR_RETENTION_DAYS)
}

/// Fold one cycle's observations into the history.
///
/// Every current snapshot is refreshed as `active`; every `pr_merged` event
/// is then written as `merged`, so a merge confirmation wins over an active
/// observation of the same PR. Records whose `last_seen_at` is strictly
/// older than `now - 7 days` are dropped; a record exactly on the boundary
/// is kept.
pub fn update_seen_history(
    previous: &[SeenPrRecord],
    current: &[PrSnapshot],
    events: &[ChangeEvent],
    now: DateTime<Utc>,
) -> Vec<SeenPrRecord> {
    let mut order: Vec<PrIdentity> = Vec::with_capacity(previous.len() + current.len());
    let mut records: HashMap<PrIdentity, SeenPrRecord> = HashMap::new();

    let mut upsert = |record: SeenPrRecord| {
        if !records.contains_key(&record.identity) {
            order.push(record.identity.clone());
        }
        records.insert(record.identity.clone(), record);
    };

    for record in previous {
        upsert(record.clone());
    }

    for snapshot in current {
        upsert(SeenPrRecord::from_snapshot(
            snapshot,
            LifecycleState::Active,
            now,
        ));
    }

    for event in events
        .iter()
        .filter(|e| e.change_type == ChangeType::PrMerged)
    {
        upsert(SeenPrRecord::from_snapshot(
            &event.snapshot,
            LifecycleState::Merged,
            now,
        ));
    }

    let cutoff = now - retention();
    order
        .into_iter()
        .filter_map(|identity| records.remove(&identity))
        .filter(|record| record.last_seen_at >= cutoff)
        .collect()
}

/// Whether any merge was confirmed after the user's last acknowledgment.
///
/// A missing acknowledgment means every merged record is unseen.
pub fn has_unseen_merge(records: &[SeenPrRecord], merged_ack_at: Option<DateTime<Utc>>) -> bool {
    records.iter().any(|record| {
        record.last_known_state == LifecycleState::Merged
            && merged_ack_at.map_or(true, |ack| record.last_seen_at > ack)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::test_utils::{make_snapshot, test_now};

    fn record(id: i64, state: LifecycleState, seen_at: DateTime<Utc>) -> SeenPrRecord {
        SeenPrRecord::from_snapshot(&make_snapshot(id), state, seen_at)
    }

    fn merged_event(id: i64) -> ChangeEvent {
        ChangeEvent::new(
            ChangeType::PrMerged,
            Severity::Low,
            &make_snapshot(id),
            format!("PR #{} merged!", id),
            format!("Test PR {}", id),
        )
    }

    #[test]
    fn test_current_snapshots_are_refreshed_as_active() {
        let now = test_now();
        let old = record(1, LifecycleState::Active, now - Duration::days(3));

        let updated = update_seen_history(&[old], &[make_snapshot(1), make_snapshot(2)], &[], now);

        assert_eq!(updated.len(), 2);
        assert!(updated
            .iter()
            .all(|r| r.last_known_state == LifecycleState::Active && r.last_seen_at == now));
    }

    #[test]
    fn test_merge_event_wins_over_active_observation() {
        let now = test_now();

        let updated = update_seen_history(&[], &[make_snapshot(1)], &[merged_event(1)], now);

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].last_known_state, LifecycleState::Merged);
    }

    #[test]
    fn test_unrelated_events_do_not_touch_history() {
        let now = test_now();
        let push = ChangeEvent::new(
            ChangeType::NewPush,
            Severity::Medium,
            &make_snapshot(4),
            "New push to PR #4",
            "",
        );

        let updated = update_seen_history(&[], &[], &[push], now);
        assert!(updated.is_empty());
    }

    #[test]
    fn test_records_older_than_retention_are_dropped() {
        let now = test_now();
        let stale = record(1, LifecycleState::Merged, now - retention() - Duration::seconds(1));
        let boundary = record(2, LifecycleState::Active, now - retention());
        let fresh = record(3, LifecycleState::Active, now - Duration::days(1));

        let updated = update_seen_history(&[stale, boundary.clone(), fresh.clone()], &[], &[], now);

        assert_eq!(updated, vec![boundary, fresh]);
    }

    #[test]
    fn test_untouched_records_keep_their_state() {
        let now = test_now();
        let merged = record(9, LifecycleState::Merged, now - Duration::days(2));

        let updated = update_seen_history(std::slice::from_ref(&merged), &[], &[], now);
        assert_eq!(updated, vec![merged]);
    }

    #[test]
    fn test_unseen_merge_uses_strict_comparison() {
        let t = test_now();
        let records = vec![record(1, LifecycleState::Merged, t)];

        assert!(has_unseen_merge(&records, Some(t - Duration::milliseconds(1))));
        assert!(!has_unseen_merge(&records, Some(t)));
        assert!(has_unseen_merge(&records, None));
    }

    #[test]
    fn test_active_records_never_count_as_unseen_merges() {
        let t = test_now();
        let records = vec![record(1, LifecycleState::Active, t)];

        assert!(!has_unseen_merge(&records, None));
    }
}
