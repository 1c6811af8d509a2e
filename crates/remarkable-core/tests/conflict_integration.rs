//! Integration tests for conflict detection and slot suggestion over a
//! populated store.

use chrono::{NaiveDate, NaiveDateTime};
use remarkable_core::storage::ConflictsConfig;
use remarkable_core::{
    conflict_summary, format_conflict_message, ConflictCandidate, ConflictDetector, Contact,
    ContactRef, EventDraft, EventStore, MemoryContacts, MemoryPersistence, OverlapType, TimeSlot,
    WriteOptions,
};
use std::sync::Arc;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

async fn add(store: &EventStore, title: &str, start: NaiveDateTime, end: NaiveDateTime, who: &[&str]) -> String {
    let draft = EventDraft {
        attendees: Some(who.iter().map(|e| ContactRef::email(*e)).collect()),
        ..EventDraft::timed(title, start, end)
    };
    store.create(draft, WriteOptions::skip_sync()).await.unwrap().id
}

fn new_store() -> Arc<EventStore> {
    Arc::new(EventStore::new(Arc::new(MemoryPersistence::new())))
}

#[tokio::test]
async fn test_busy_day_conflicts_and_summary() {
    let store = new_store();
    let standup = add(&store, "Standup", at(9, 0), at(9, 15), &["ana@example.com"]).await;
    let workshop = add(&store, "Workshop", at(9, 0), at(12, 0), &["ben@example.com"]).await;
    let lunch = add(&store, "Lunch", at(12, 0), at(13, 0), &[]).await;
    let gone = add(&store, "Cancelled", at(10, 0), at(11, 0), &[]).await;
    store.delete(&gone).await.unwrap();
    store
        .create(
            EventDraft {
                is_timer_child: Some(true),
                ..EventDraft::timed("Timer segment", at(10, 0), at(10, 30))
            },
            WriteOptions::skip_sync(),
        )
        .await
        .unwrap();
    store
        .create(EventDraft::task("Unscheduled"), WriteOptions::skip_sync())
        .await
        .unwrap();

    let detector = ConflictDetector::new(Arc::clone(&store));
    let candidate = ConflictCandidate {
        attendees: vec![ContactRef::email("ANA@example.com")],
        ..ConflictCandidate::new(at(9, 0), at(12, 0))
    };
    let conflicts = detector.detect_conflicts(&candidate, None).await.unwrap();

    let mut ids: Vec<&str> = conflicts.iter().map(|c| c.conflicting_event.id.as_str()).collect();
    ids.sort_unstable();
    let mut expected = vec![standup.as_str(), workshop.as_str()];
    expected.sort_unstable();
    assert_eq!(ids, expected);
    assert!(!ids.contains(&lunch.as_str()));

    let with_ana = conflicts
        .iter()
        .find(|c| c.conflicting_event.id == standup)
        .unwrap();
    assert_eq!(with_ana.overlap_type, OverlapType::Full);
    assert_eq!(with_ana.conflicting_attendees.len(), 1);
    assert_eq!(
        format_conflict_message(with_ana),
        "Conflicts with \"Standup\"\nTime: 11-04 09:00 - 11-04 09:15\nType: full overlap\nAttendees: ANA@example.com"
    );

    let summary = conflict_summary(&conflicts);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.to_string(), "2 conflicts (2 full, 0 partial)");
}

#[tokio::test]
async fn test_editing_an_event_excludes_itself() {
    let store = new_store();
    let review = add(&store, "Review", at(14, 0), at(15, 0), &[]).await;
    let detector = ConflictDetector::new(Arc::clone(&store));

    let moved = ConflictCandidate::new(at(14, 30), at(15, 30));
    let conflicts = detector.detect_conflicts(&moved, Some(&review)).await.unwrap();
    assert!(conflicts.is_empty());

    let conflicts = detector.detect_conflicts(&moved, None).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].overlap_type, OverlapType::Partial);
    assert_eq!(conflicts[0].overlap_start, at(14, 30));
    assert_eq!(conflicts[0].overlap_end, at(15, 0));
}

#[tokio::test]
async fn test_attendee_conflicts_include_organizer_role() {
    let store = new_store();
    let planning = add(&store, "Planning", at(10, 0), at(11, 0), &["ana@example.com"]).await;
    let one_on_one = store
        .create(
            EventDraft {
                organizer: Some(ContactRef::email("Ben@Example.com")),
                ..EventDraft::timed("1:1", at(10, 30), at(11, 0))
            },
            WriteOptions::skip_sync(),
        )
        .await
        .unwrap();

    let detector = ConflictDetector::new(Arc::clone(&store));
    let busy = detector
        .detect_attendee_conflicts(
            &[
                ContactRef::email("Ana@Example.com"),
                ContactRef::email("ben@example.com"),
                ContactRef::email("cara@example.com"),
            ],
            at(10, 0),
            at(12, 0),
            None,
        )
        .await
        .unwrap();

    assert_eq!(busy.len(), 2);
    assert_eq!(busy["ana@example.com"][0].conflicting_event.id, planning);
    assert_eq!(busy["ben@example.com"][0].conflicting_event.id, one_on_one.id);
    assert!(!busy.contains_key("cara@example.com"));
}

#[tokio::test]
async fn test_suggested_slot_avoids_busy_attendees() {
    let store = new_store();
    add(&store, "Morning block", at(9, 0), at(11, 30), &["ana@example.com"]).await;
    add(&store, "Other team", at(11, 30), at(12, 30), &["zed@example.com"]).await;

    let detector = ConflictDetector::new(Arc::clone(&store));
    let ana = [ContactRef::email("ana@example.com")];

    let slot = detector
        .suggest_alternative_slot(60, &ana, Some(day()))
        .await
        .unwrap();
    assert_eq!(
        slot,
        Some(TimeSlot {
            start: at(11, 30),
            end: at(12, 30)
        })
    );

    let whole_day = detector
        .suggest_alternative_slot(10 * 60, &ana, Some(day()))
        .await
        .unwrap();
    assert_eq!(whole_day, None);
}

#[tokio::test]
async fn test_last_slot_may_end_at_close_of_day() {
    let store = new_store();
    add(&store, "All day", at(9, 0), at(17, 0), &["ana@example.com"]).await;

    let detector = ConflictDetector::new(Arc::clone(&store)).with_config(ConflictsConfig {
        work_day_start_hour: 9,
        work_day_end_hour: 18,
        slot_step_minutes: 60,
    });
    let slot = detector
        .suggest_alternative_slot(60, &[ContactRef::email("ana@example.com")], Some(day()))
        .await
        .unwrap();
    assert_eq!(
        slot,
        Some(TimeSlot {
            start: at(17, 0),
            end: at(18, 0)
        })
    );
}

#[tokio::test]
async fn test_resolve_attendees_through_contact_book() {
    let contacts = MemoryContacts::new([Contact {
        id: "contact_ana".into(),
        email: Some("ana@example.com".into()),
        name: Some("Ana Lima".into()),
        organization: None,
    }]);
    let detector = ConflictDetector::new(new_store()).with_contacts(Arc::new(contacts));

    let resolved = detector
        .resolve_attendees(&[
            ContactRef::email("ANA@example.com"),
            ContactRef::email("stranger@example.com"),
        ])
        .await
        .unwrap();

    assert_eq!(resolved[0].id.as_deref(), Some("contact_ana"));
    assert_eq!(resolved[0].name.as_deref(), Some("Ana Lima"));
    assert_eq!(resolved[1], ContactRef::email("stranger@example.com"));
}
