//! Diff engine: classifies what changed between two poll results.

use crate::models::{
    ChangeEvent, ChangeType, PrIdentity, PrSnapshot, ReviewerVote, Severity, StatusState,
};
use std::collections::HashMap;

/// Compare two snapshot sets and describe the transitions worth surfacing.
///
/// PRs seen for the first time only establish a baseline and produce no
/// events. PRs that disappeared are left to the merge resolver. For every PR
/// in both sets, in `current` order, events are emitted as: pipeline
/// transitions, new push, vote transitions, merge conflict.
pub fn diff_snapshots(previous: &[PrSnapshot], current: &[PrSnapshot]) -> Vec<ChangeEvent> {
    let previous_by_id: HashMap<&PrIdentity, &PrSnapshot> =
        previous.iter().map(|s| (&s.identity, s)).collect();
    let mut events = Vec::new();

    for cur in current {
        let Some(prev) = previous_by_id.get(&cur.identity) else {
            continue;
        };

        detect_pipeline_changes(prev, cur, &mut events);
        detect_new_push(prev, cur, &mut events);
        detect_vote_changes(prev, cur, &mut events);
        detect_merge_conflict(prev, cur, &mut events);
    }

    events
}

fn detect_pipeline_changes(prev: &PrSnapshot, cur: &PrSnapshot, events: &mut Vec<ChangeEvent>) {
    for (context, state) in &cur.status_checks {
        // No prior entry for this context: nothing to compare against.
        let Some(prev_state) = prev.status_checks.get(context) else {
            continue;
        };

        if !prev_state.is_failure() && state.is_failure() {
            events.push(ChangeEvent::new(
                ChangeType::PipelineFailed,
                Severity::High,
                cur,
                format!("Pipeline failed on PR #{}", cur.pull_request_id()),
                format!("{} → {}", context, state),
            ));
        } else if prev_state.is_failure() && *state == StatusState::Succeeded {
            events.push(ChangeEvent::new(
                ChangeType::PipelineRecovered,
                Severity::Medium,
                cur,
                format!("Pipeline recovered on PR #{}", cur.pull_request_id()),
                format!("{} → {}", context, state),
            ));
        }
    }
}

fn detect_new_push(prev: &PrSnapshot, cur: &PrSnapshot, events: &mut Vec<ChangeEvent>) {
    let prev_commit = prev.last_merge_source_commit_id.as_deref().unwrap_or("");
    let cur_commit = cur.last_merge_source_commit_id.as_deref().unwrap_or("");

    if !prev_commit.is_empty() && !cur_commit.is_empty() && prev_commit != cur_commit {
        events.push(ChangeEvent::new(
            ChangeType::NewPush,
            Severity::Medium,
            cur,
            format!("New push to PR #{}", cur.pull_request_id()),
            format!("Source commit changed in \"{}\"", cur.title),
        ));
    }
}

fn detect_vote_changes(prev: &PrSnapshot, cur: &PrSnapshot, events: &mut Vec<ChangeEvent>) {
    for (reviewer_id, vote) in &cur.reviewer_votes {
        // A recorded 0 is a real prior vote; only a missing entry is skipped.
        let Some(prev_vote) = prev.reviewer_votes.get(reviewer_id) else {
            continue;
        };
        if prev_vote == vote {
            continue;
        }

        let reviewer_name = cur
            .reviewer_names
            .get(reviewer_id)
            .map(String::as_str)
            .unwrap_or("A reviewer");
        let severity = if *vote == ReviewerVote::Rejected {
            Severity::High
        } else {
            Severity::Medium
        };

        events.push(ChangeEvent::new(
            ChangeType::VoteChanged,
            severity,
            cur,
            format!("Vote changed on PR #{}", cur.pull_request_id()),
            format!("{}: {}", reviewer_name, vote.label()),
        ));
    }
}

fn detect_merge_conflict(prev: &PrSnapshot, cur: &PrSnapshot, events: &mut Vec<ChangeEvent>) {
    if !prev.has_conflicts() && cur.has_conflicts() {
        events.push(ChangeEvent::new(
            ChangeType::MergeConflict,
            Severity::High,
            cur,
            format!("Merge conflict in PR #{}", cur.pull_request_id()),
            format!("\"{}\" now has merge conflicts", cur.title),
        ));
    }
}
