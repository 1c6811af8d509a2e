//! Partial event shapes accepted on create and update.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Event, SyncStatus};
use crate::contacts::ContactRef;
use crate::content::rich::parse_timestamp;
use crate::content::{EventLogInput, TitleInput};
use crate::sync::{ActualSyncConfig, PlanSyncConfig};

/// Any subset of an event. Absent fields take defaults during normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDraft {
    pub id: Option<String>,
    pub title: Option<TitleInput>,
    #[serde(alias = "eventlog", deserialize_with = "classified_log")]
    pub event_log: Option<EventLogInput>,
    /// Plain-text body; used when `event_log` is absent or empty
    pub description: Option<String>,

    #[serde(deserialize_with = "lenient_time")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(deserialize_with = "lenient_time")]
    pub end_time: Option<NaiveDateTime>,
    pub is_all_day: Option<bool>,
    #[serde(deserialize_with = "lenient_time")]
    pub due_date: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,

    pub is_task: Option<bool>,
    pub is_completed: Option<bool>,
    pub is_plan_item: Option<bool>,
    pub is_timer_child: Option<bool>,
    pub is_time_log_child: Option<bool>,
    pub is_external_activity_child: Option<bool>,

    pub parent_event_id: Option<String>,
    pub child_event_ids: Option<Vec<String>>,
    pub linked_event_ids: Option<Vec<String>>,
    pub backlinks: Option<Vec<String>>,

    pub calendar_ids: Option<Vec<String>>,
    pub plan_sync_config: Option<PlanSyncConfig>,
    pub actual_sync_config: Option<ActualSyncConfig>,
    pub synced_plan_calendars: Option<BTreeMap<String, String>>,
    pub synced_actual_calendars: Option<BTreeMap<String, String>>,
    pub sync_status: Option<SyncStatus>,
    pub local_version: Option<u64>,

    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub organizer: Option<ContactRef>,
    pub attendees: Option<Vec<ContactRef>>,

    pub checked: Option<Vec<DateTime<Utc>>>,
    pub unchecked: Option<Vec<DateTime<Utc>>>,
}

impl EventDraft {
    /// A timed (non-task) event.
    pub fn timed(title: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        EventDraft {
            title: Some(title.into()),
            start_time: Some(start),
            end_time: Some(end),
            ..EventDraft::default()
        }
    }

    /// A task without time bounds.
    pub fn task(title: &str) -> Self {
        EventDraft {
            title: Some(title.into()),
            is_task: Some(true),
            ..EventDraft::default()
        }
    }

    /// True when the draft marks a subordinate child event.
    pub fn is_subordinate(&self) -> bool {
        self.is_timer_child.unwrap_or(false)
            || self.is_time_log_child.unwrap_or(false)
            || self.is_external_activity_child.unwrap_or(false)
    }
}

impl From<Event> for EventDraft {
    fn from(event: Event) -> Self {
        EventDraft {
            id: Some(event.id),
            title: Some(event.title.into()),
            event_log: Some(event.event_log.into()),
            description: None,
            start_time: event.start_time,
            end_time: event.end_time,
            is_all_day: Some(event.is_all_day),
            due_date: event.due_date,
            location: event.location,
            tags: Some(event.tags),
            is_task: Some(event.is_task),
            is_completed: Some(event.is_completed),
            is_plan_item: Some(event.is_plan_item),
            is_timer_child: Some(event.is_timer_child),
            is_time_log_child: Some(event.is_time_log_child),
            is_external_activity_child: Some(event.is_external_activity_child),
            parent_event_id: event.parent_event_id,
            child_event_ids: Some(event.child_event_ids),
            linked_event_ids: Some(event.linked_event_ids),
            backlinks: Some(event.backlinks),
            calendar_ids: Some(event.calendar_ids),
            plan_sync_config: event.plan_sync_config,
            actual_sync_config: event.actual_sync_config,
            synced_plan_calendars: Some(event.synced_plan_calendars),
            synced_actual_calendars: Some(event.synced_actual_calendars),
            sync_status: Some(event.sync_status),
            local_version: Some(event.local_version),
            created_at: Some(event.created_at),
            deleted_at: event.deleted_at,
            organizer: event.organizer,
            attendees: Some(event.attendees),
            checked: Some(event.checked),
            unchecked: Some(event.unchecked),
        }
    }
}

/// Update payload. An absent key leaves the field untouched; for clearable
/// fields an explicit `null` (`Some(None)`) clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatch {
    pub title: Option<TitleInput>,
    #[serde(alias = "eventlog", deserialize_with = "classified_log")]
    pub event_log: Option<EventLogInput>,
    pub description: Option<String>,

    #[serde(deserialize_with = "lenient_time_clearable")]
    pub start_time: Option<Option<NaiveDateTime>>,
    #[serde(deserialize_with = "lenient_time_clearable")]
    pub end_time: Option<Option<NaiveDateTime>>,
    pub is_all_day: Option<bool>,
    #[serde(deserialize_with = "lenient_time_clearable")]
    pub due_date: Option<Option<NaiveDateTime>>,
    #[serde(deserialize_with = "clearable")]
    pub location: Option<Option<String>>,
    pub tags: Option<Vec<String>>,

    pub is_task: Option<bool>,
    pub is_completed: Option<bool>,
    pub is_plan_item: Option<bool>,
    pub is_timer_child: Option<bool>,
    pub is_time_log_child: Option<bool>,
    pub is_external_activity_child: Option<bool>,

    #[serde(deserialize_with = "clearable")]
    pub parent_event_id: Option<Option<String>>,
    pub child_event_ids: Option<Vec<String>>,
    pub linked_event_ids: Option<Vec<String>>,

    pub calendar_ids: Option<Vec<String>>,
    #[serde(deserialize_with = "clearable")]
    pub plan_sync_config: Option<Option<PlanSyncConfig>>,
    #[serde(deserialize_with = "clearable")]
    pub actual_sync_config: Option<Option<ActualSyncConfig>>,
    pub synced_plan_calendars: Option<BTreeMap<String, String>>,
    pub synced_actual_calendars: Option<BTreeMap<String, String>>,
    pub sync_status: Option<SyncStatus>,

    #[serde(deserialize_with = "clearable")]
    pub organizer: Option<Option<ContactRef>>,
    pub attendees: Option<Vec<ContactRef>>,
}

/// Merge the keys present in `patch` over `current`.
pub fn apply_patch(current: &Event, patch: EventPatch) -> EventDraft {
    let mut draft = EventDraft::from(current.clone());

    if let Some(title) = patch.title {
        draft.title = Some(title);
    }
    match (patch.event_log, patch.description) {
        (Some(log), description) => {
            draft.event_log = Some(log);
            draft.description = description;
        }
        (None, Some(description)) => {
            draft.event_log = None;
            draft.description = Some(description);
        }
        (None, None) => {}
    }

    if let Some(start) = patch.start_time {
        draft.start_time = start;
    }
    if let Some(end) = patch.end_time {
        draft.end_time = end;
    }
    if let Some(due) = patch.due_date {
        draft.due_date = due;
    }
    if let Some(location) = patch.location {
        draft.location = location;
    }
    if let Some(parent) = patch.parent_event_id {
        draft.parent_event_id = parent;
    }
    if let Some(plan) = patch.plan_sync_config {
        draft.plan_sync_config = plan;
    }
    if let Some(actual) = patch.actual_sync_config {
        draft.actual_sync_config = actual;
    }
    if let Some(organizer) = patch.organizer {
        draft.organizer = organizer;
    }

    overlay(&mut draft.is_all_day, patch.is_all_day);
    overlay(&mut draft.tags, patch.tags);
    overlay(&mut draft.is_task, patch.is_task);
    overlay(&mut draft.is_completed, patch.is_completed);
    overlay(&mut draft.is_plan_item, patch.is_plan_item);
    overlay(&mut draft.is_timer_child, patch.is_timer_child);
    overlay(&mut draft.is_time_log_child, patch.is_time_log_child);
    overlay(&mut draft.is_external_activity_child, patch.is_external_activity_child);
    overlay(&mut draft.child_event_ids, patch.child_event_ids);
    overlay(&mut draft.linked_event_ids, patch.linked_event_ids);
    overlay(&mut draft.calendar_ids, patch.calendar_ids);
    overlay(&mut draft.synced_plan_calendars, patch.synced_plan_calendars);
    overlay(&mut draft.synced_actual_calendars, patch.synced_actual_calendars);
    overlay(&mut draft.sync_status, patch.sync_status);
    overlay(&mut draft.attendees, patch.attendees);

    draft
}

/// Overlay every field `incoming` sets onto `current`. Used when a create
/// names an id that already exists.
pub fn merge_draft(current: &Event, incoming: EventDraft) -> EventDraft {
    let mut draft = EventDraft::from(current.clone());
    overlay(&mut draft.title, incoming.title);
    if incoming.event_log.is_some() || incoming.description.is_some() {
        draft.event_log = incoming.event_log;
        draft.description = incoming.description;
    }
    overlay(&mut draft.start_time, incoming.start_time);
    overlay(&mut draft.end_time, incoming.end_time);
    overlay(&mut draft.is_all_day, incoming.is_all_day);
    overlay(&mut draft.due_date, incoming.due_date);
    overlay(&mut draft.location, incoming.location);
    overlay(&mut draft.tags, incoming.tags);
    overlay(&mut draft.is_task, incoming.is_task);
    overlay(&mut draft.is_completed, incoming.is_completed);
    overlay(&mut draft.is_plan_item, incoming.is_plan_item);
    overlay(&mut draft.is_timer_child, incoming.is_timer_child);
    overlay(&mut draft.is_time_log_child, incoming.is_time_log_child);
    overlay(&mut draft.is_external_activity_child, incoming.is_external_activity_child);
    overlay(&mut draft.parent_event_id, incoming.parent_event_id);
    overlay(&mut draft.child_event_ids, incoming.child_event_ids);
    overlay(&mut draft.linked_event_ids, incoming.linked_event_ids);
    overlay(&mut draft.calendar_ids, incoming.calendar_ids);
    overlay(&mut draft.plan_sync_config, incoming.plan_sync_config);
    overlay(&mut draft.actual_sync_config, incoming.actual_sync_config);
    overlay(&mut draft.synced_plan_calendars, incoming.synced_plan_calendars);
    overlay(&mut draft.synced_actual_calendars, incoming.synced_actual_calendars);
    overlay(&mut draft.sync_status, incoming.sync_status);
    overlay(&mut draft.organizer, incoming.organizer);
    overlay(&mut draft.attendees, incoming.attendees);
    overlay(&mut draft.checked, incoming.checked);
    overlay(&mut draft.unchecked, incoming.unchecked);
    draft
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn classified_log<'de, D>(deserializer: D) -> Result<Option<EventLogInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.is_null())
        .map(EventLogInput::classify))
}

fn lenient_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized time '{raw}'"))),
    }
}

fn lenient_time_clearable<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_time(deserializer).map(Some)
}

fn clearable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::normalize_event;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_draft_accepts_legacy_shapes() {
        let draft: EventDraft = serde_json::from_str(
            r#"{
                "title": "Standup",
                "startTime": "2025-03-14 09:00:00",
                "endTime": "2025-03-14T09:15:00",
                "eventlog": "<p>notes</p>"
            }"#,
        )
        .unwrap();
        assert_eq!(draft.start_time, Some(t(9, 0)));
        assert_eq!(draft.end_time, Some(t(9, 15)));
        assert!(matches!(draft.event_log, Some(EventLogInput::Markup(_))));
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: EventPatch = serde_json::from_str(r#"{"location": null}"#).unwrap();
        assert_eq!(patch.location, Some(None));
        assert_eq!(patch.start_time, None);

        let patch: EventPatch = serde_json::from_str(r#"{"startTime": null}"#).unwrap();
        assert_eq!(patch.start_time, Some(None));
    }

    #[test]
    fn test_apply_patch_merges_only_present_keys() {
        let mut draft = EventDraft::timed("Review", t(10, 0), t(11, 0));
        draft.location = Some("Room 4".into());
        let current = normalize_event(draft, None, Utc::now());

        let patch = EventPatch {
            end_time: Some(Some(t(12, 0))),
            location: Some(None),
            ..EventPatch::default()
        };
        let merged = apply_patch(&current, patch);
        assert_eq!(merged.start_time, Some(t(10, 0)));
        assert_eq!(merged.end_time, Some(t(12, 0)));
        assert_eq!(merged.location, None);
        assert_eq!(merged.id.as_deref(), Some(current.id.as_str()));
    }
}
