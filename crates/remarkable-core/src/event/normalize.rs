//! Draft -> canonical event.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{Event, EventDraft, SyncStatus};
use crate::content::{normalize_event_log, normalize_title, EventLogInput, TitleInput};
use crate::error::ValidationError;
use crate::ids::{self, IdKind};

/// Fill every field of an event from `draft`.
///
/// `previous` is the stored record an update starts from; its tag set is the
/// baseline for tag-marker diffing. Pure apart from data-quality log entries.
pub fn normalize_event(draft: EventDraft, previous: Option<&Event>, now: DateTime<Utc>) -> Event {
    let (id, replaced) = ids::ensure_valid(draft.id.as_deref(), IdKind::Event);
    if replaced {
        if let Some(old) = draft.id.as_deref() {
            warn!(
                target: "remarkable::data_quality",
                old_id = old,
                new_id = %id,
                "replaced malformed event id"
            );
        }
    }

    let tags = dedup(draft.tags.clone().unwrap_or_default());
    let previous_tags = previous.map(|p| p.tags.as_slice());
    let title = normalize_title(
        draft.title.clone().unwrap_or(TitleInput::Plain(String::new())),
        Some(&tags),
        previous_tags,
    );

    let fallback = draft.description.as_deref();
    let event_log = match draft.event_log.clone() {
        Some(input) => normalize_event_log(input, fallback),
        None => normalize_event_log(
            EventLogInput::PlainText(fallback.unwrap_or_default().to_string()),
            None,
        ),
    };

    let subordinate = draft.is_subordinate();
    let (plan_sync_config, actual_sync_config) = if subordinate {
        if draft.plan_sync_config.is_some() || draft.actual_sync_config.is_some() {
            warn!(
                target: "remarkable::data_quality",
                event_id = %id,
                "dropped sync configuration from subordinate event"
            );
        }
        (None, None)
    } else {
        (draft.plan_sync_config, draft.actual_sync_config)
    };

    let child_event_ids = without_self(&id, dedup(draft.child_event_ids.unwrap_or_default()));
    let linked_event_ids = without_self(&id, dedup(draft.linked_event_ids.unwrap_or_default()));
    let backlinks = without_self(&id, dedup(draft.backlinks.unwrap_or_default()));

    let sync_status = draft.sync_status.unwrap_or_else(|| {
        if plan_sync_config.is_some() || actual_sync_config.is_some() {
            SyncStatus::Pending
        } else {
            SyncStatus::LocalOnly
        }
    });

    let mut checked = draft.checked.unwrap_or_default();
    checked.sort();
    let mut unchecked = draft.unchecked.unwrap_or_default();
    unchecked.sort();

    Event {
        title,
        event_log,
        start_time: draft.start_time,
        end_time: draft.end_time,
        is_all_day: draft.is_all_day.unwrap_or(false),
        due_date: draft.due_date,
        location: draft.location.filter(|l| !l.trim().is_empty()),
        tags,
        is_task: draft.is_task.unwrap_or(false),
        is_completed: draft.is_completed.unwrap_or(false),
        is_plan_item: draft.is_plan_item.unwrap_or(false),
        is_timer_child: draft.is_timer_child.unwrap_or(false),
        is_time_log_child: draft.is_time_log_child.unwrap_or(false),
        is_external_activity_child: draft.is_external_activity_child.unwrap_or(false),
        parent_event_id: draft.parent_event_id.filter(|p| !p.is_empty()),
        child_event_ids,
        linked_event_ids,
        backlinks,
        calendar_ids: dedup(draft.calendar_ids.unwrap_or_default()),
        plan_sync_config,
        actual_sync_config,
        synced_plan_calendars: draft.synced_plan_calendars.unwrap_or_default(),
        synced_actual_calendars: draft.synced_actual_calendars.unwrap_or_default(),
        sync_status,
        local_version: draft.local_version.unwrap_or(0) + 1,
        created_at: draft.created_at.unwrap_or(now),
        updated_at: now,
        deleted_at: draft.deleted_at,
        organizer: draft.organizer,
        attendees: draft.attendees.unwrap_or_default(),
        checked,
        unchecked,
        id,
    }
}

/// Time-field rules: non-task events need both bounds; whenever both bounds
/// exist, start must not be after end.
pub fn validate_times(event: &Event) -> Result<(), ValidationError> {
    if !event.is_task {
        if event.start_time.is_none() {
            return Err(ValidationError::MissingTime { field: "startTime" });
        }
        if event.end_time.is_none() {
            return Err(ValidationError::MissingTime { field: "endTime" });
        }
    }
    if let Some((start, end)) = event.time_range() {
        if start > end {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
    }
    Ok(())
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn without_self(id: &str, mut items: Vec<String>) -> Vec<String> {
    items.retain(|item| item != id);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::rich::Inline;
    use crate::sync::{PlanSyncConfig, SyncMode};
    use chrono::{NaiveDate, NaiveDateTime};

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_fills_defaults_and_stamps() {
        let now = Utc::now();
        let event = normalize_event(EventDraft::timed("Lunch", t(12), t(13)), None, now);
        assert!(ids::validate(&event.id, Some(IdKind::Event)));
        assert_eq!(event.title.plain, "Lunch");
        assert_eq!(event.local_version, 1);
        assert_eq!(event.created_at, now);
        assert_eq!(event.updated_at, now);
        assert_eq!(event.sync_status, SyncStatus::LocalOnly);
        assert!(event.event_log.is_empty());
    }

    #[test]
    fn test_renormalizing_preserves_created_and_bumps_version() {
        let first = Utc::now();
        let event = normalize_event(EventDraft::task("Write"), None, first);
        let later = first + chrono::Duration::seconds(30);
        let again = normalize_event(event.clone().into(), Some(&event), later);
        assert_eq!(again.id, event.id);
        assert_eq!(again.created_at, first);
        assert_eq!(again.updated_at, later);
        assert_eq!(again.local_version, 2);
        assert_eq!(again.title, event.title);
        assert_eq!(again.event_log, event.event_log);
    }

    #[test]
    fn test_legacy_id_is_replaced() {
        let draft = EventDraft {
            id: Some("local-12345".into()),
            ..EventDraft::task("legacy")
        };
        let event = normalize_event(draft, None, Utc::now());
        assert_ne!(event.id, "local-12345");
        assert!(ids::validate(&event.id, Some(IdKind::Event)));
    }

    #[test]
    fn test_subordinate_loses_sync_config() {
        let draft = EventDraft {
            is_timer_child: Some(true),
            plan_sync_config: Some(PlanSyncConfig {
                mode: SyncMode::SendOnly,
                target_calendars: vec!["work".into()],
            }),
            ..EventDraft::task("segment")
        };
        let event = normalize_event(draft, None, Utc::now());
        assert!(event.plan_sync_config.is_none());
        assert_eq!(event.sync_status, SyncStatus::LocalOnly);
    }

    #[test]
    fn test_tags_become_title_markers() {
        let draft = EventDraft {
            tags: Some(vec!["tag_a".into(), "tag_a".into(), "tag_b".into()]),
            ..EventDraft::task("Tagged")
        };
        let event = normalize_event(draft, None, Utc::now());
        assert_eq!(event.tags, vec!["tag_a".to_string(), "tag_b".to_string()]);
        let markers = event.title.rich.blocks.iter().flat_map(|b| match b {
            crate::content::Block::Paragraph { children } => children.clone(),
            _ => Vec::new(),
        });
        assert_eq!(markers.filter(|i| matches!(i, Inline::Tag { .. })).count(), 2);
    }

    #[test]
    fn test_description_seeds_event_log() {
        let draft = EventDraft {
            description: Some("remote body".into()),
            ..EventDraft::task("Imported")
        };
        let event = normalize_event(draft, None, Utc::now());
        assert_eq!(event.event_log.plain_text, "remote body");
    }

    #[test]
    fn test_validate_times() {
        let now = Utc::now();
        let ok = normalize_event(EventDraft::timed("ok", t(9), t(10)), None, now);
        assert!(validate_times(&ok).is_ok());

        let mut half = ok.clone();
        half.end_time = None;
        assert_eq!(
            validate_times(&half),
            Err(ValidationError::MissingTime { field: "endTime" })
        );

        let mut reversed = ok.clone();
        reversed.start_time = Some(t(11));
        assert!(matches!(
            validate_times(&reversed),
            Err(ValidationError::InvalidTimeRange { .. })
        ));

        let mut task = half;
        task.is_task = true;
        assert!(validate_times(&task).is_ok());
    }
}
