//! The canonical event record.
//!
//! Every write goes through [`normalize_event`], so records loaded from legacy
//! or external sources are repaired the first time they are touched.

mod draft;
mod normalize;

pub use draft::{apply_patch, merge_draft, EventDraft, EventPatch};
pub use normalize::{normalize_event, validate_times};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::contacts::ContactRef;
use crate::content::{EventLog, EventTitle};
use crate::sync::{ActualSyncConfig, PlanSyncConfig, SyncKind, SyncMode};

/// Remote sync state of the record as a whole.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Waiting for a reconciliation pass
    Pending,
    /// Every remote copy matches the last write
    Synced,
    /// Never leaves this device
    LocalOnly,
    /// Last reconciliation had at least one failed remote call
    Error,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Pending
    }
}

/// Calendar event, task, or plan item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Typed id (`event_<payload>`), immutable once assigned
    pub id: String,

    pub title: EventTitle,

    /// Body/log with its derived exports
    pub event_log: EventLog,

    /// Local wall-clock start; optional for tasks
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub is_all_day: bool,
    /// Task deadline
    pub due_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub tags: Vec<String>,

    pub is_task: bool,
    pub is_completed: bool,
    pub is_plan_item: bool,
    /// Auto-generated timer segment
    pub is_timer_child: bool,
    /// Auto-generated time-log entry
    pub is_time_log_child: bool,
    /// Mirrors activity recorded by an external tool
    pub is_external_activity_child: bool,

    pub parent_event_id: Option<String>,
    /// Ordered, symmetric with each child's `parent_event_id`
    pub child_event_ids: Vec<String>,
    /// Forward links authored by this event
    pub linked_event_ids: Vec<String>,
    /// Derived reverse links; never written by callers
    pub backlinks: Vec<String>,

    pub calendar_ids: Vec<String>,
    pub plan_sync_config: Option<PlanSyncConfig>,
    pub actual_sync_config: Option<ActualSyncConfig>,
    /// calendar id -> remote event id for the planned occurrence
    pub synced_plan_calendars: BTreeMap<String, String>,
    /// calendar id -> remote event id for the actual occurrence
    pub synced_actual_calendars: BTreeMap<String, String>,
    pub sync_status: SyncStatus,
    /// Incremented on every normalized write
    pub local_version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,

    pub organizer: Option<ContactRef>,
    pub attendees: Vec<ContactRef>,

    /// Check-in stamps; the most recent of `checked`/`unchecked` decides state
    pub checked: Vec<DateTime<Utc>>,
    pub unchecked: Vec<DateTime<Utc>>,
}

impl Event {
    /// Timer, time-log and external-activity children never sync or appear
    /// in the link graph.
    pub fn is_subordinate(&self) -> bool {
        self.is_timer_child || self.is_time_log_child || self.is_external_activity_child
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Current check-in state. A tie between the latest stamps counts as
    /// unchecked.
    pub fn is_checked(&self) -> bool {
        match (self.checked.iter().max(), self.unchecked.iter().max()) {
            (Some(checked), Some(unchecked)) => checked > unchecked,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Both bounds, when present.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.start_time.zip(self.end_time)
    }

    pub fn has_sync_config(&self) -> bool {
        self.plan_sync_config.is_some() || self.actual_sync_config.is_some()
    }

    /// Mode and target calendars for `kind`, if configured.
    pub fn sync_target(&self, kind: SyncKind) -> Option<(SyncMode, &[String])> {
        match kind {
            SyncKind::Plan => self
                .plan_sync_config
                .as_ref()
                .map(|c| (c.mode, c.target_calendars.as_slice())),
            SyncKind::Actual => self
                .actual_sync_config
                .as_ref()
                .map(|c| (c.mode.into(), c.target_calendars.as_slice())),
        }
    }

    pub fn synced_calendars(&self, kind: SyncKind) -> &BTreeMap<String, String> {
        match kind {
            SyncKind::Plan => &self.synced_plan_calendars,
            SyncKind::Actual => &self.synced_actual_calendars,
        }
    }

    pub fn synced_calendars_mut(&mut self, kind: SyncKind) -> &mut BTreeMap<String, String> {
        match kind {
            SyncKind::Plan => &mut self.synced_plan_calendars,
            SyncKind::Actual => &mut self.synced_actual_calendars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn blank() -> Event {
        normalize_event(EventDraft::task("check-in"), None, at(0))
    }

    #[test]
    fn test_most_recent_stamp_wins() {
        let mut event = blank();
        event.checked = vec![at(10), at(20)];
        event.unchecked = vec![at(30)];
        assert!(!event.is_checked());

        event.checked = vec![at(10), at(30)];
        event.unchecked = vec![at(20)];
        assert!(event.is_checked());
    }

    #[test]
    fn test_tie_is_unchecked() {
        let mut event = blank();
        event.checked = vec![at(5)];
        event.unchecked = vec![at(5)];
        assert!(!event.is_checked());
    }

    #[test]
    fn test_never_checked() {
        assert!(!blank().is_checked());
    }

    #[test]
    fn test_subordinate_flags() {
        let mut event = blank();
        assert!(!event.is_subordinate());
        event.is_time_log_child = true;
        assert!(event.is_subordinate());
    }
}
