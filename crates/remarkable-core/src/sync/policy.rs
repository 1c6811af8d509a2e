//! Sync direction policy: who may push, who may pull, and how many remote
//! copies an event should have.

use std::collections::HashSet;

use super::mode::SyncMode;
use crate::event::Event;

/// Whether local changes may be pushed under `mode`.
pub fn can_send(mode: SyncMode) -> bool {
    mode.can_send()
}

/// Whether remote changes may be pulled under `mode`.
pub fn can_receive(mode: SyncMode) -> bool {
    mode.can_receive()
}

/// Number of remote copies the event's two configurations call for.
///
/// With both configs producing copies, disjoint target lists give
/// `1 + |actual targets|` while any overlap pins the count at 2 (plan and
/// actual coexist as separate copies in the shared calendar).
pub fn remote_event_count(event: &Event) -> usize {
    let plan = event.plan_sync_config.as_ref();
    let actual = event.actual_sync_config.as_ref();

    match (plan, actual) {
        (None, None) => 0,
        (Some(plan), None) => usize::from(can_send(plan.mode)),
        (None, Some(_)) => 1,
        (Some(plan), Some(actual)) => {
            if !can_send(plan.mode) {
                // Receive-only plan: only the actual copies count.
                return actual.target_calendars.len();
            }
            let plan_targets: HashSet<&str> =
                plan.target_calendars.iter().map(String::as_str).collect();
            let overlaps = actual
                .target_calendars
                .iter()
                .any(|c| plan_targets.contains(c.as_str()));
            if overlaps {
                2
            } else {
                1 + actual.target_calendars.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{normalize_event, EventDraft};
    use crate::sync::mode::{ActualSyncConfig, ActualSyncMode, PlanSyncConfig};
    use chrono::Utc;

    fn event(plan: Option<PlanSyncConfig>, actual: Option<ActualSyncConfig>) -> Event {
        let draft = EventDraft {
            plan_sync_config: plan,
            actual_sync_config: actual,
            ..EventDraft::task("synced")
        };
        normalize_event(draft, None, Utc::now())
    }

    fn plan(mode: SyncMode, calendars: &[&str]) -> Option<PlanSyncConfig> {
        Some(PlanSyncConfig {
            mode,
            target_calendars: calendars.iter().map(|c| c.to_string()).collect(),
        })
    }

    fn actual(mode: ActualSyncMode, calendars: &[&str]) -> Option<ActualSyncConfig> {
        Some(ActualSyncConfig {
            mode,
            target_calendars: calendars.iter().map(|c| c.to_string()).collect(),
        })
    }

    #[test]
    fn test_send_receive_matrix() {
        use SyncMode::*;
        let expected = [
            (ReceiveOnly, false, true),
            (SendOnly, true, false),
            (SendOnlyPrivate, true, false),
            (Bidirectional, true, true),
            (BidirectionalPrivate, true, true),
        ];
        for (mode, send, receive) in expected {
            assert_eq!(can_send(mode), send, "{mode}");
            assert_eq!(can_receive(mode), receive, "{mode}");
        }
    }

    #[test]
    fn test_count_without_configs() {
        assert_eq!(remote_event_count(&event(None, None)), 0);
    }

    #[test]
    fn test_count_receive_only_plan() {
        assert_eq!(
            remote_event_count(&event(plan(SyncMode::ReceiveOnly, &["x"]), None)),
            0
        );
    }

    #[test]
    fn test_count_single_sending_plan() {
        assert_eq!(
            remote_event_count(&event(plan(SyncMode::SendOnly, &["x"]), None)),
            1
        );
    }

    #[test]
    fn test_count_overlapping_targets_is_two() {
        let e = event(
            plan(SyncMode::SendOnly, &["x"]),
            actual(ActualSyncMode::Bidirectional, &["x"]),
        );
        assert_eq!(remote_event_count(&e), 2);

        let e = event(
            plan(SyncMode::SendOnly, &["x", "y", "z"]),
            actual(ActualSyncMode::Bidirectional, &["x", "y", "z"]),
        );
        assert_eq!(remote_event_count(&e), 2);
    }

    #[test]
    fn test_count_disjoint_targets_sums() {
        let e = event(
            plan(SyncMode::SendOnly, &["x"]),
            actual(ActualSyncMode::Bidirectional, &["y"]),
        );
        assert_eq!(remote_event_count(&e), 2);

        let e = event(
            plan(SyncMode::SendOnly, &["x"]),
            actual(ActualSyncMode::SendOnly, &["y", "z"]),
        );
        assert_eq!(remote_event_count(&e), 3);
    }

    #[test]
    fn test_count_actual_only() {
        let e = event(None, actual(ActualSyncMode::SendOnlyPrivate, &["y"]));
        assert_eq!(remote_event_count(&e), 1);
    }
}
