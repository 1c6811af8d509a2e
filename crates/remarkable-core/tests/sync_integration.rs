//! Integration tests for remote reconciliation.
//!
//! A recording calendar double stands in for the calendar service so the
//! tests can see every call the reconciler makes and inject failures.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use remarkable_core::sync::{InboundOutcome, OutboundPayload, RemoteError};
use remarkable_core::{
    ActualSyncConfig, ActualSyncMode, ContactRef, EventDraft, EventPatch, EventStore,
    MemoryPersistence, PlanSyncConfig, Reconciler, RemoteCalendar, SyncKind, SyncMode, SyncStatus,
    WriteOptions,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create { calendar_id: String, title: String },
    Update { remote_id: String, title: String },
    Delete { remote_id: String },
}

/// Calendar double that records calls and can fail the next N creates per
/// calendar.
#[derive(Default)]
struct RecordingCalendar {
    calls: Mutex<Vec<Call>>,
    copies: Mutex<BTreeMap<String, OutboundPayload>>,
    failures: Mutex<HashMap<String, usize>>,
    next_id: Mutex<u32>,
}

impl RecordingCalendar {
    fn fail_next_creates(&self, calendar_id: &str, count: usize) {
        self.failures.lock().unwrap().insert(calendar_id.to_string(), count);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn copies(&self) -> BTreeMap<String, OutboundPayload> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteCalendar for RecordingCalendar {
    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &OutboundPayload,
    ) -> Result<String, RemoteError> {
        self.calls.lock().unwrap().push(Call::Create {
            calendar_id: calendar_id.to_string(),
            title: payload.title.clone(),
        });
        if let Some(left) = self.failures.lock().unwrap().get_mut(calendar_id) {
            if *left > 0 {
                *left -= 1;
                return Err("service unavailable".into());
            }
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let remote_id = format!("google-{calendar_id}-{next}");
        self.copies
            .lock()
            .unwrap()
            .insert(remote_id.clone(), payload.clone());
        Ok(remote_id)
    }

    async fn update_event(
        &self,
        remote_id: &str,
        payload: &OutboundPayload,
    ) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call::Update {
            remote_id: remote_id.to_string(),
            title: payload.title.clone(),
        });
        match self.copies.lock().unwrap().get_mut(remote_id) {
            Some(copy) => {
                *copy = payload.clone();
                Ok(())
            }
            None => Err(format!("no remote event {remote_id}").into()),
        }
    }

    async fn delete_event(&self, remote_id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call::Delete {
            remote_id: remote_id.to_string(),
        });
        self.copies.lock().unwrap().remove(remote_id);
        Ok(())
    }
}

fn t(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, 15)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn cals(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn setup() -> (Arc<EventStore>, Arc<RecordingCalendar>, Arc<Reconciler>) {
    let store = Arc::new(EventStore::new(Arc::new(MemoryPersistence::new())));
    let remote = Arc::new(RecordingCalendar::default());
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), remote.clone()));
    (store, remote, reconciler)
}

fn meeting(plan: Option<(SyncMode, &[&str])>, actual: Option<(ActualSyncMode, &[&str])>) -> EventDraft {
    EventDraft {
        attendees: Some(vec![
            ContactRef::email("ana@example.com"),
            ContactRef::email("ben@example.com"),
        ]),
        description: Some("Quarterly numbers".into()),
        plan_sync_config: plan.map(|(mode, targets)| PlanSyncConfig {
            mode,
            target_calendars: cals(targets),
        }),
        actual_sync_config: actual.map(|(mode, targets)| ActualSyncConfig {
            mode,
            target_calendars: cals(targets),
        }),
        ..EventDraft::timed("Budget review", t(14), t(15))
    }
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_worker_mirrors_event_lifecycle() {
    let (store, remote, reconciler) = setup();
    let worker = Arc::clone(&reconciler).spawn_worker(store.subscribe_changes());

    let event = store
        .create(
            meeting(
                Some((SyncMode::BidirectionalPrivate, &["work"])),
                Some((ActualSyncMode::SendOnly, &["log"])),
            ),
            WriteOptions::default(),
        )
        .await
        .unwrap();

    eventually(|| {
        let store = Arc::clone(&store);
        let id = event.id.clone();
        async move {
            let stored = store.get_by_id(&id).await.unwrap().unwrap();
            stored.sync_status == SyncStatus::Synced
                && stored.synced_plan_calendars.len() == 1
                && stored.synced_actual_calendars.len() == 1
        }
    })
    .await;
    assert_eq!(remote.copies().len(), 2);

    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    let copies = remote.copies();
    let plan_copy = &copies[&stored.synced_plan_calendars["work"]];
    assert!(plan_copy.attendees.is_empty());
    assert!(plan_copy
        .description
        .starts_with("Participants: ana@example.com, ben@example.com"));
    let actual_copy = &copies[&stored.synced_actual_calendars["log"]];
    assert_eq!(actual_copy.attendees, cals(&["ana@example.com", "ben@example.com"]));

    store
        .update(
            &event.id,
            EventPatch {
                title: Some("Budget review (moved)".into()),
                ..EventPatch::default()
            },
            WriteOptions::default(),
        )
        .await
        .unwrap();
    eventually(|| {
        let remote = Arc::clone(&remote);
        async move {
            let copies = remote.copies();
            copies.len() == 2 && copies.values().all(|c| c.title == "Budget review (moved)")
        }
    })
    .await;

    store.delete(&event.id).await.unwrap();
    eventually(|| {
        let store = Arc::clone(&store);
        let id = event.id.clone();
        async move {
            let stored = store.get_by_id(&id).await.unwrap().unwrap();
            stored.synced_plan_calendars.is_empty() && stored.synced_actual_calendars.is_empty()
        }
    })
    .await;
    worker.abort();

    assert!(remote.copies().is_empty());
    let creates = remote
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Create { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn test_failed_create_is_retried_on_next_pass() {
    let (store, remote, reconciler) = setup();
    remote.fail_next_creates("home", 1);
    let event = store
        .create(
            meeting(Some((SyncMode::SendOnly, &["work", "home"])), None),
            WriteOptions::default(),
        )
        .await
        .unwrap();

    let first = reconciler.reconcile_event(&event.id).await.unwrap();
    assert_eq!(first.created, cals(&["work"]));
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].calendar_id, "home");
    assert_eq!(first.errors[0].event_id, event.id);
    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Error);
    assert_eq!(stored.synced_plan_calendars.len(), 1);

    let second = reconciler.reconcile_event(&event.id).await.unwrap();
    assert!(second.is_clean());
    assert_eq!(second.created, cals(&["home"]));
    assert_eq!(second.updated, cals(&["work"]));
    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert_eq!(stored.synced_plan_calendars.len(), 2);
}

#[tokio::test]
async fn test_receive_only_plan_makes_no_calls() {
    let (store, remote, reconciler) = setup();
    let event = store
        .create(
            meeting(Some((SyncMode::ReceiveOnly, &["work"])), None),
            WriteOptions::default(),
        )
        .await
        .unwrap();

    let report = reconciler.reconcile_event(&event.id).await.unwrap();
    assert!(report.created.is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_inbound_private_change_recovers_attendees() {
    let (store, _remote, reconciler) = setup();
    let event = store
        .create(
            meeting(Some((SyncMode::BidirectionalPrivate, &["work"])), None),
            WriteOptions::default(),
        )
        .await
        .unwrap();
    reconciler.reconcile_event(&event.id).await.unwrap();
    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    let remote_id = stored.synced_plan_calendars["work"].clone();

    // The provider reports the id without its prefix.
    let bare_id = remote_id.trim_start_matches("google-");
    let patch = EventPatch {
        description: Some("Participants: cara@example.com\n\nNew agenda".into()),
        ..EventPatch::default()
    };
    let outcome = reconciler
        .apply_inbound_change(bare_id, SyncKind::Plan, patch)
        .await
        .unwrap();

    let updated = match outcome {
        InboundOutcome::Applied(updated) => updated,
        other => panic!("inbound change was not applied: {other:?}"),
    };
    assert_eq!(updated.event_log.plain_text, "New agenda");
    assert_eq!(updated.attendees.len(), 1);
    assert_eq!(updated.attendees[0].email.as_deref(), Some("cara@example.com"));
}

#[tokio::test]
async fn test_inbound_change_ignored_for_send_only() {
    let (store, _remote, reconciler) = setup();
    let event = store
        .create(
            meeting(Some((SyncMode::SendOnly, &["work"])), None),
            WriteOptions::default(),
        )
        .await
        .unwrap();
    reconciler.reconcile_event(&event.id).await.unwrap();
    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    let remote_id = stored.synced_plan_calendars["work"].clone();

    let outcome = reconciler
        .apply_inbound_change(
            &remote_id,
            SyncKind::Plan,
            EventPatch {
                title: Some("Renamed remotely".into()),
                ..EventPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, InboundOutcome::Ignored { event_id: event.id.clone() });
    let stored = store.get_by_id(&event.id).await.unwrap().unwrap();
    assert_eq!(stored.title.plain, "Budget review");
}

async fn synced_send_only(
    store: &Arc<EventStore>,
    remote: &Arc<RecordingCalendar>,
) -> remarkable_core::Event {
    let event = store
        .create(
            meeting(Some((SyncMode::SendOnly, &["work"])), None),
            WriteOptions::default(),
        )
        .await
        .unwrap();
    eventually(|| {
        let store = Arc::clone(store);
        let id = event.id.clone();
        async move {
            let stored = store.get_by_id(&id).await.unwrap().unwrap();
            stored.sync_status == SyncStatus::Synced
        }
    })
    .await;
    assert_eq!(remote.copies().len(), 1);
    event
}

#[tokio::test]
async fn test_forced_purge_removes_remote_copies() {
    let (store, remote, reconciler) = setup();
    let worker = Arc::clone(&reconciler).spawn_worker(store.subscribe_changes());
    let event = synced_send_only(&store, &remote).await;

    store.hard_delete(&event.id, true).await.unwrap();
    eventually(|| {
        let remote = Arc::clone(&remote);
        async move { remote.copies().is_empty() }
    })
    .await;
    worker.abort();

    assert!(store.get_by_id(&event.id).await.unwrap().is_none());
    assert!(remote
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Delete { remote_id } if remote_id.starts_with("google-work-"))));
}

#[tokio::test]
async fn test_purge_right_after_soft_delete_removes_remote_copies() {
    let (store, remote, reconciler) = setup();
    let worker = Arc::clone(&reconciler).spawn_worker(store.subscribe_changes());
    let event = synced_send_only(&store, &remote).await;

    store.delete(&event.id).await.unwrap();
    store.hard_delete(&event.id, false).await.unwrap();
    eventually(|| {
        let remote = Arc::clone(&remote);
        async move { remote.copies().is_empty() }
    })
    .await;
    worker.abort();
    assert!(store.get_by_id(&event.id).await.unwrap().is_none());
}
