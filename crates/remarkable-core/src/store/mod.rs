//! Event store facade.
//!
//! All writes normalize the record, validate time fields, persist, and then
//! announce the change twice: once to other processes over the broadcast
//! channel (tagged for echo suppression) and once to in-process subscribers
//! as a [`ChangeNotification`]. Remote calendar work happens downstream of the
//! notification, never inside a write.

pub mod backlinks;
pub mod broadcast;
pub mod loop_guard;
pub mod persistence;

mod graph;

pub use backlinks::{BacklinkIndex, ScanBacklinkIndex};
pub use broadcast::{BroadcastChannel, BroadcastHandler, BroadcastMessage, ChangeKind, InProcessBroadcast};
pub use graph::TreeNode;
pub use loop_guard::{Inbound, LoopGuard};
pub use persistence::{EventPersistence, MemoryPersistence};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast as tokio_broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::event::{
    apply_patch, merge_draft, normalize_event, validate_times, Event, EventDraft, EventPatch,
    SyncStatus,
};
use crate::ids::{self, IdKind};
use crate::storage::Config;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Where a change came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Local,
    /// Applied from another process's broadcast
    Remote,
}

/// Emitted after every successful mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub event_id: String,
    pub kind: ChangeKind,
    /// Record as stored after the change. For a purge, the record as it
    /// stood before removal; `None` when an id was re-keyed.
    pub record: Option<Event>,
    pub origin: ChangeOrigin,
    /// Whether remote reconciliation should follow
    pub sync_requested: bool,
}

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Persist without requesting remote reconciliation
    pub skip_sync: bool,
}

impl WriteOptions {
    pub fn skip_sync() -> Self {
        Self { skip_sync: true }
    }
}

/// Tunables taken from the `[store]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub suppression_window: Duration,
    pub pending_write_capacity: usize,
    pub event_log_version_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            suppression_window: Duration::from_secs(5),
            pending_write_capacity: 256,
            event_log_version_limit: 50,
        }
    }
}

impl From<&Config> for StoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            suppression_window: Duration::from_secs(config.store.suppression_window_secs),
            pending_write_capacity: config.store.pending_write_capacity,
            event_log_version_limit: config.store.event_log_version_limit,
        }
    }
}

/// Result of handling one inbound broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BroadcastOutcome {
    IgnoredEcho,
    Applied { event_id: String, concurrent: bool },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub purged: Vec<String>,
    pub failed: Vec<RecordFailure>,
    /// Stopped early on request
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub created: Vec<String>,
    pub failed: Vec<RecordFailure>,
}

/// One record that could not be processed in a batch operation.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    /// Event id, or the draft's position for batch creates
    pub key: String,
    pub error: String,
}

/// The event store facade.
pub struct EventStore {
    persistence: Arc<dyn EventPersistence>,
    backlinks: Box<dyn BacklinkIndex>,
    guard: LoopGuard,
    channel: Option<Arc<dyn BroadcastChannel>>,
    changes: tokio_broadcast::Sender<ChangeNotification>,
    settings: StoreSettings,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("sender_id", &self.guard.sender_id())
            .field("settings", &self.settings)
            .field("broadcast", &self.channel.is_some())
            .finish()
    }
}

fn ephemeral_sender_id() -> String {
    format!("remarkable-{}", uuid::Uuid::new_v4())
}

impl EventStore {
    pub fn new(persistence: Arc<dyn EventPersistence>) -> Self {
        let settings = StoreSettings::default();
        let (changes, _) = tokio_broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            persistence,
            backlinks: Box::new(ScanBacklinkIndex),
            guard: LoopGuard::new(
                ephemeral_sender_id(),
                settings.suppression_window,
                settings.pending_write_capacity,
            ),
            channel: None,
            changes,
            settings,
        }
    }

    /// Identity carried on outgoing broadcasts.
    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.guard = LoopGuard::new(
            sender_id,
            self.settings.suppression_window,
            self.settings.pending_write_capacity,
        );
        self
    }

    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.guard = LoopGuard::new(
            self.guard.sender_id().to_string(),
            settings.suppression_window,
            settings.pending_write_capacity,
        );
        self.settings = settings;
        self
    }

    pub fn with_broadcast(mut self, channel: Arc<dyn BroadcastChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_backlink_index(mut self, index: Box<dyn BacklinkIndex>) -> Self {
        self.backlinks = index;
        self
    }

    pub fn sender_id(&self) -> &str {
        self.guard.sender_id()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn persistence(&self) -> &Arc<dyn EventPersistence> {
        &self.persistence
    }

    pub fn subscribe_changes(&self) -> tokio_broadcast::Receiver<ChangeNotification> {
        self.changes.subscribe()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Event>> {
        self.persistence.get(id).await
    }

    /// Active events overlapping `[start, end]`, plus untimed tasks, ordered
    /// by start time with untimed records last.
    pub async fn query_by_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .persistence
            .query_by_time_range(start, end)
            .await?
            .into_iter()
            .filter(|e| !e.is_deleted())
            .collect();
        events.sort_by(|a, b| {
            (a.start_time.is_none(), a.start_time, &a.id).cmp(&(
                b.start_time.is_none(),
                b.start_time,
                &b.id,
            ))
        });
        Ok(events)
    }

    pub async fn list(&self, include_deleted: bool, limit: Option<usize>) -> Result<Vec<Event>> {
        let events = self.persistence.query_all(None).await?;
        Ok(events
            .into_iter()
            .filter(|e| include_deleted || !e.is_deleted())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create an event. A draft naming an existing id updates that record
    /// instead.
    pub async fn create(&self, draft: EventDraft, opts: WriteOptions) -> Result<Event> {
        if let Some(id) = draft.id.as_deref() {
            if ids::validate(id, Some(IdKind::Event)) {
                if let Some(existing) = self.persistence.get(id).await? {
                    debug!(target: "remarkable::store", event_id = id, "create on existing id, updating");
                    let merged = merge_draft(&existing, draft);
                    return self.commit_update(existing, merged, opts).await;
                }
            }
        }

        let explicit_status = draft.sync_status.is_some();
        let mut event = normalize_event(draft, None, Utc::now());
        reject_self_parent(&event)?;
        validate_times(&event)?;
        if opts.skip_sync && !explicit_status {
            event.sync_status = SyncStatus::LocalOnly;
        }
        event.backlinks = self
            .backlinks
            .backlinks_for(self.persistence.as_ref(), &event.id)
            .await?;

        self.persistence.put(&event).await?;
        info!(target: "remarkable::store", event_id = %event.id, "created event");

        if let Some(parent_id) = event.parent_event_id.clone() {
            self.attach_child(&parent_id, &event.id).await?;
        }
        for target in &event.linked_event_ids {
            self.refresh_backlinks(target).await?;
        }

        let sync = self.sync_requested(&event, opts);
        self.announce(&event.id, ChangeKind::Create, Some(event.clone()), sync);
        Ok(event)
    }

    /// Merge `patch` into the stored record.
    pub async fn update(&self, id: &str, patch: EventPatch, opts: WriteOptions) -> Result<Event> {
        let current = self.load(id).await?;
        let merged = apply_patch(&current, patch);
        self.commit_update(current, merged, opts).await
    }

    async fn commit_update(
        &self,
        current: Event,
        draft: EventDraft,
        opts: WriteOptions,
    ) -> Result<Event> {
        let now = Utc::now();
        let mut event = normalize_event(draft, Some(&current), now);
        reject_self_parent(&event)?;
        validate_times(&event)?;

        event.backlinks = current.backlinks.clone();
        event.event_log.record_previous(
            &current.event_log,
            now,
            self.settings.event_log_version_limit,
        );
        if !opts.skip_sync && event.has_sync_config() && !event.is_subordinate() {
            event.sync_status = SyncStatus::Pending;
        }

        self.write_record(&current, &event).await?;
        info!(
            target: "remarkable::store",
            event_id = %event.id,
            version = event.local_version,
            "updated event"
        );

        if current.parent_event_id != event.parent_event_id {
            if let Some(old_parent) = &current.parent_event_id {
                self.detach_child(old_parent, &event.id).await?;
            }
            if let Some(new_parent) = &event.parent_event_id {
                self.attach_child(new_parent, &event.id).await?;
            }
        }
        for target in symmetric_difference(&current.linked_event_ids, &event.linked_event_ids) {
            self.refresh_backlinks(&target).await?;
        }

        let sync = self.sync_requested(&event, opts);
        self.announce(&event.id, ChangeKind::Update, Some(event.clone()), sync);
        Ok(event)
    }

    /// Soft delete. Children keep their (now dangling) parent reference.
    pub async fn delete(&self, id: &str) -> Result<Event> {
        let current = self.load(id).await?;
        if current.is_deleted() {
            return Ok(current);
        }
        let now = Utc::now();
        let mut draft = EventDraft::from(current.clone());
        draft.deleted_at = Some(now);
        let event = normalize_event(draft, Some(&current), now);

        self.write_record(&current, &event).await?;
        info!(target: "remarkable::store", event_id = %event.id, "soft-deleted event");

        for target in &event.linked_event_ids {
            self.refresh_backlinks(target).await?;
        }

        let has_remote_copies =
            !event.synced_plan_calendars.is_empty() || !event.synced_actual_calendars.is_empty();
        let sync = !event.is_subordinate() && (has_remote_copies || event.has_sync_config());
        self.announce(&event.id, ChangeKind::Delete, Some(event.clone()), sync);
        Ok(event)
    }

    /// Undo a soft delete.
    pub async fn restore(&self, id: &str) -> Result<Event> {
        let current = self.load(id).await?;
        if !current.is_deleted() {
            return Err(CoreError::invalid(format!("event '{id}' is not deleted")));
        }
        let now = Utc::now();
        let mut draft = EventDraft::from(current.clone());
        draft.deleted_at = None;
        let mut event = normalize_event(draft, Some(&current), now);
        if event.has_sync_config() && !event.is_subordinate() {
            event.sync_status = SyncStatus::Pending;
        }

        self.write_record(&current, &event).await?;
        info!(target: "remarkable::store", event_id = %event.id, "restored event");

        for target in &event.linked_event_ids {
            self.refresh_backlinks(target).await?;
        }

        let sync = self.sync_requested(&event, WriteOptions::default());
        self.announce(&event.id, ChangeKind::Restore, Some(event.clone()), sync);
        Ok(event)
    }

    /// Remove a record for good. Without `force` the record must already be
    /// soft-deleted. Children are detached first. Remote copies still recorded
    /// on the record are handed to the purge notification for cleanup.
    pub async fn hard_delete(&self, id: &str, force: bool) -> Result<()> {
        let current = self.load(id).await?;
        if !current.is_deleted() && !force {
            return Err(CoreError::invalid(format!(
                "event '{id}' must be soft-deleted before a hard delete"
            )));
        }

        let children: Vec<Event> = self
            .persistence
            .query_all(None)
            .await?
            .into_iter()
            .filter(|e| e.parent_event_id.as_deref() == Some(id))
            .collect();
        for child in children {
            let mut detached = child.clone();
            detached.parent_event_id = None;
            self.save_maintenance(&child, detached).await?;
        }
        if let Some(parent_id) = &current.parent_event_id {
            self.detach_child(parent_id, id).await?;
        }

        self.persistence.delete(id).await?;
        info!(target: "remarkable::store", event_id = id, "purged event");

        for target in &current.linked_event_ids {
            self.refresh_backlinks(target).await?;
        }
        let has_remote_copies = !current.synced_plan_calendars.is_empty()
            || !current.synced_actual_calendars.is_empty();
        self.announce(id, ChangeKind::Purge, Some(current), has_remote_copies);
        Ok(())
    }

    /// Hard-delete every record soft-deleted more than `days` ago. Failures
    /// are collected per record; setting `interrupt` stops between records.
    pub async fn purge_older_than(
        &self,
        days: u32,
        interrupt: Option<&AtomicBool>,
    ) -> Result<PurgeReport> {
        let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::days(i64::from(days));
        let expired: Vec<String> = self
            .persistence
            .query_all(None)
            .await?
            .into_iter()
            .filter(|e| e.deleted_at.is_some_and(|at| at < cutoff))
            .map(|e| e.id)
            .collect();

        let mut report = PurgeReport::default();
        for id in expired {
            if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                report.interrupted = true;
                break;
            }
            match self.hard_delete(&id, false).await {
                Ok(()) => report.purged.push(id),
                Err(err) => {
                    warn!(target: "remarkable::store", event_id = %id, error = %err, "purge failed");
                    report.failed.push(RecordFailure {
                        key: id,
                        error: err.to_string(),
                    });
                }
            }
        }
        info!(
            target: "remarkable::store",
            purged = report.purged.len(),
            failed = report.failed.len(),
            interrupted = report.interrupted,
            "purge finished"
        );
        Ok(report)
    }

    /// Create many drafts, collecting failures instead of stopping.
    pub async fn batch_create(&self, drafts: Vec<EventDraft>, opts: WriteOptions) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, draft) in drafts.into_iter().enumerate() {
            match self.create(draft, opts).await {
                Ok(event) => report.created.push(event.id),
                Err(err) => report.failed.push(RecordFailure {
                    key: index.to_string(),
                    error: err.to_string(),
                }),
            }
        }
        report
    }

    // ========================================================================
    // Check-in
    // ========================================================================

    pub async fn check_in(&self, id: &str) -> Result<Event> {
        self.check_in_at(id, Utc::now()).await
    }

    pub async fn uncheck(&self, id: &str) -> Result<Event> {
        self.uncheck_at(id, Utc::now()).await
    }

    /// Append a check-in stamp. State is whichever list holds the latest stamp.
    pub async fn check_in_at(&self, id: &str, at: DateTime<Utc>) -> Result<Event> {
        let current = self.load(id).await?;
        let mut updated = current.clone();
        updated.checked.push(at);
        self.save_maintenance(&current, updated).await
    }

    pub async fn uncheck_at(&self, id: &str, at: DateTime<Utc>) -> Result<Event> {
        let current = self.load(id).await?;
        let mut updated = current.clone();
        updated.unchecked.push(at);
        self.save_maintenance(&current, updated).await
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    /// Handle a message from the broadcast channel. Our own echoes are
    /// dropped; anything else is re-read from persistence and re-announced
    /// locally.
    pub async fn receive_broadcast(&self, message: BroadcastMessage) -> Result<BroadcastOutcome> {
        match self.guard.classify(&message) {
            Inbound::OwnEcho => {
                debug!(
                    target: "remarkable::broadcast",
                    event_id = %message.event_id,
                    sequence = message.sequence_number,
                    "ignored own echo"
                );
                Ok(BroadcastOutcome::IgnoredEcho)
            }
            Inbound::Foreign { concurrent } => {
                if concurrent {
                    info!(
                        target: "remarkable::broadcast",
                        event_id = %message.event_id,
                        sender = %message.sender_id,
                        "concurrent write from another sender, last write wins"
                    );
                }
                let record = self.persistence.get(&message.event_id).await?;
                let _ = self.changes.send(ChangeNotification {
                    event_id: message.event_id.clone(),
                    kind: message.kind,
                    record,
                    origin: ChangeOrigin::Remote,
                    sync_requested: false,
                });
                Ok(BroadcastOutcome::Applied {
                    event_id: message.event_id,
                    concurrent,
                })
            }
        }
    }

    /// Subscribe to the broadcast channel and process inbound messages on a
    /// background task. Returns `None` when no channel is configured.
    pub fn listen(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let channel = self.channel.clone()?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        channel.subscribe(Box::new(move |message| {
            let _ = tx.send(message);
        }));
        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(err) = store.receive_broadcast(message).await {
                    warn!(target: "remarkable::broadcast", error = %err, "failed to apply broadcast");
                }
            }
        }))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load(&self, id: &str) -> Result<Event> {
        self.persistence
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Persist a store-maintained change (child lists, backlinks, check-ins).
    /// Never requests remote sync.
    async fn save_maintenance(&self, previous: &Event, updated: Event) -> Result<Event> {
        let event = normalize_event(updated.into(), Some(previous), Utc::now());
        self.write_record(previous, &event).await?;
        self.announce(&event.id, ChangeKind::Update, Some(event.clone()), false);
        Ok(event)
    }

    /// Persist `event` over `previous`. When normalization replaced a
    /// malformed stored id, the old row is removed and references to it are
    /// re-pointed at the new id.
    async fn write_record(&self, previous: &Event, event: &Event) -> Result<()> {
        self.persistence.put(event).await?;
        if event.id != previous.id {
            self.rekey(&previous.id, &event.id).await?;
        }
        Ok(())
    }

    async fn rekey(&self, old_id: &str, new_id: &str) -> Result<()> {
        self.persistence.delete(old_id).await?;
        warn!(
            target: "remarkable::data_quality",
            old_id,
            new_id,
            "re-keyed stored event under a fresh id"
        );

        let now = Utc::now();
        for other in self.persistence.query_all(None).await? {
            if other.id == new_id {
                continue;
            }
            let mut updated = other;
            let mut touched = false;
            if updated.parent_event_id.as_deref() == Some(old_id) {
                updated.parent_event_id = Some(new_id.to_string());
                touched = true;
            }
            for list in [
                &mut updated.child_event_ids,
                &mut updated.linked_event_ids,
                &mut updated.backlinks,
            ] {
                for entry in list.iter_mut().filter(|entry| entry.as_str() == old_id) {
                    *entry = new_id.to_string();
                    touched = true;
                }
            }
            if touched {
                updated.local_version += 1;
                updated.updated_at = now;
                self.persistence.put(&updated).await?;
                debug!(target: "remarkable::store", event_id = %updated.id, old_id, new_id, "re-pointed reference");
                self.announce(&updated.id, ChangeKind::Update, Some(updated.clone()), false);
            }
        }
        self.announce(old_id, ChangeKind::Purge, None, false);
        Ok(())
    }

    async fn attach_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        match self.persistence.get(parent_id).await? {
            Some(parent) => {
                if !parent.child_event_ids.iter().any(|c| c == child_id) {
                    let mut updated = parent.clone();
                    updated.child_event_ids.push(child_id.to_string());
                    self.save_maintenance(&parent, updated).await?;
                    debug!(target: "remarkable::store", parent_id, child_id, "attached child");
                }
            }
            None => warn!(
                target: "remarkable::store",
                parent_id,
                child_id,
                "parent not found, keeping dangling reference"
            ),
        }
        Ok(())
    }

    async fn detach_child(&self, parent_id: &str, child_id: &str) -> Result<()> {
        match self.persistence.get(parent_id).await? {
            Some(parent) => {
                if parent.child_event_ids.iter().any(|c| c == child_id) {
                    let mut updated = parent.clone();
                    updated.child_event_ids.retain(|c| c != child_id);
                    self.save_maintenance(&parent, updated).await?;
                    debug!(target: "remarkable::store", parent_id, child_id, "detached child");
                }
            }
            None => debug!(target: "remarkable::store", parent_id, "old parent already gone"),
        }
        Ok(())
    }

    fn sync_requested(&self, event: &Event, opts: WriteOptions) -> bool {
        !opts.skip_sync && !event.is_subordinate() && event.has_sync_config()
    }

    fn announce(&self, event_id: &str, kind: ChangeKind, record: Option<Event>, sync_requested: bool) {
        let sequence = self.guard.record_local_write(event_id);
        if let Some(channel) = &self.channel {
            channel.publish(BroadcastMessage {
                sender_id: self.guard.sender_id().to_string(),
                event_id: event_id.to_string(),
                kind,
                sequence_number: sequence,
                timestamp: Utc::now(),
            });
        }
        // No subscribers is not an error.
        let _ = self.changes.send(ChangeNotification {
            event_id: event_id.to_string(),
            kind,
            record,
            origin: ChangeOrigin::Local,
            sync_requested,
        });
    }
}

fn reject_self_parent(event: &Event) -> Result<()> {
    if event.parent_event_id.as_deref() == Some(event.id.as_str()) {
        return Err(CoreError::invalid("an event cannot be its own parent"));
    }
    Ok(())
}

fn symmetric_difference(before: &[String], after: &[String]) -> Vec<String> {
    before
        .iter()
        .filter(|id| !after.contains(id))
        .chain(after.iter().filter(|id| !before.contains(id)))
        .cloned()
        .collect()
}
