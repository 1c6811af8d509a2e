//! Remote reconciliation.
//!
//! Pushes each event's plan and actual occurrences to their target
//! calendars, keeps the `{calendar id -> remote id}` maps on the record in
//! step, and maps inbound remote changes back onto local events. Remote
//! failures are collected per calendar and never undo the local write that
//! triggered the pass.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mode::{SyncKind, SyncMode};
use super::payload::{prepare_outbound_payload, recover_participants, OutboundPayload};
use super::policy::{can_receive, can_send};
use super::remote::RemoteCalendar;
use crate::error::{CoreError, RemoteOperation, RemoteSyncError, Result};
use crate::event::{Event, EventPatch, SyncStatus};
use crate::storage::Config;
use crate::store::{ChangeKind, ChangeNotification, ChangeOrigin, EventStore, WriteOptions};

/// What one reconciliation pass did. Calendar ids, not remote ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    #[serde(skip)]
    pub errors: Vec<RemoteSyncError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }
}

/// Result of routing one inbound remote change.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// No local event holds the remote id
    Unmatched,
    /// The local event's mode does not accept remote changes
    Ignored { event_id: String },
    Applied(Box<Event>),
}

/// Drives remote calendar copies from local events.
pub struct Reconciler {
    store: Arc<EventStore>,
    remote: Arc<dyn RemoteCalendar>,
    remote_id_prefixes: Vec<String>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("remote_id_prefixes", &self.remote_id_prefixes)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(store: Arc<EventStore>, remote: Arc<dyn RemoteCalendar>) -> Self {
        Self {
            store,
            remote,
            remote_id_prefixes: Config::default().sync.remote_id_prefixes,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.remote_id_prefixes = config.sync.remote_id_prefixes.clone();
        self
    }

    pub fn with_remote_id_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.remote_id_prefixes = prefixes;
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Bring `event`'s `kind` copies in line with `calendar_ids`.
    ///
    /// Receive-only modes return immediately. Untargeted copies are deleted,
    /// recorded copies updated (recreated if the update is rejected) and
    /// missing ones created. The resulting id map is written back with
    /// `skip_sync`.
    pub async fn sync_to_calendars(
        &self,
        event: &Event,
        calendar_ids: &[String],
        mode: SyncMode,
        kind: SyncKind,
    ) -> Result<ReconcileReport> {
        if !can_send(mode) {
            debug!(target: "remarkable::sync", event_id = %event.id, %kind, %mode, "mode does not send");
            return Ok(ReconcileReport::default());
        }
        let payload = prepare_outbound_payload(event, mode);
        self.apply_targets(event, calendar_ids, Some(&payload), kind).await
    }

    /// Remove every materialized copy of `event`, for both kinds.
    pub async fn remove_all_copies(&self, event: &Event) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for kind in [SyncKind::Plan, SyncKind::Actual] {
            let current = self.current(&event.id).await?;
            if !current.synced_calendars(kind).is_empty() {
                report.merge(self.apply_targets(&current, &[], None, kind).await?);
            }
        }
        Ok(report)
    }

    /// Delete every remote copy recorded on a record that is no longer
    /// stored. Nothing is written back; failures are reported only.
    pub async fn remove_purged_copies(&self, record: &Event) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for kind in [SyncKind::Plan, SyncKind::Actual] {
            for (calendar_id, remote_id) in record.synced_calendars(kind) {
                match self.remote.delete_event(remote_id).await {
                    Ok(()) => report.deleted.push(calendar_id.clone()),
                    Err(err) => {
                        warn!(
                            target: "remarkable::sync",
                            event_id = %record.id,
                            calendar_id = %calendar_id,
                            error = %err,
                            "could not remove copy of purged event"
                        );
                        report.errors.push(RemoteSyncError {
                            event_id: record.id.clone(),
                            calendar_id: calendar_id.clone(),
                            operation: RemoteOperation::Delete,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        log_report(&record.id, &report);
        report
    }

    /// Full pass over one event: both configs, then `sync_status`.
    pub async fn reconcile_event(&self, event_id: &str) -> Result<ReconcileReport> {
        let event = self.current(event_id).await?;
        if event.is_subordinate() {
            debug!(target: "remarkable::sync", event_id, "subordinate event, not synced");
            return Ok(ReconcileReport::default());
        }
        if event.is_deleted() {
            let report = self.remove_all_copies(&event).await?;
            log_report(event_id, &report);
            return Ok(report);
        }

        let mut report = ReconcileReport::default();
        let mut attempted = false;
        for kind in [SyncKind::Plan, SyncKind::Actual] {
            // Each pass writes the id map back, so start from the stored record.
            let current = self.current(event_id).await?;
            match current.sync_target(kind) {
                Some((mode, targets)) => {
                    if can_send(mode) {
                        attempted = true;
                    }
                    let targets = targets.to_vec();
                    report.merge(self.sync_to_calendars(&current, &targets, mode, kind).await?);
                }
                None if !current.synced_calendars(kind).is_empty() => {
                    // Config removed: drop the copies it left behind.
                    attempted = true;
                    report.merge(self.apply_targets(&current, &[], None, kind).await?);
                }
                None => {}
            }
        }

        if attempted {
            let status = if report.is_clean() {
                SyncStatus::Synced
            } else {
                SyncStatus::Error
            };
            let current = self.current(event_id).await?;
            if current.sync_status != status {
                self.store
                    .update(
                        event_id,
                        EventPatch {
                            sync_status: Some(status),
                            ..EventPatch::default()
                        },
                        WriteOptions::skip_sync(),
                    )
                    .await?;
            }
        }
        log_report(event_id, &report);
        Ok(report)
    }

    /// Consume store notifications on a background task, reconciling every
    /// local change that requested sync.
    pub fn spawn_worker(self: Arc<Self>, mut changes: Receiver<ChangeNotification>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(note) => {
                        if !note.sync_requested || note.origin != ChangeOrigin::Local {
                            continue;
                        }
                        if note.kind == ChangeKind::Purge {
                            if let Some(record) = &note.record {
                                self.remove_purged_copies(record).await;
                            }
                            continue;
                        }
                        if let Err(err) = self.reconcile_event(&note.event_id).await {
                            warn!(
                                target: "remarkable::sync",
                                event_id = %note.event_id,
                                error = %err,
                                "reconciliation failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "remarkable::sync", skipped, "reconciliation worker lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(target: "remarkable::sync", "reconciliation worker stopped");
        })
    }

    /// Local event whose `kind` map holds `remote_id`, ignoring provider
    /// prefixes on either side. Deleted events still match so an inbound
    /// change never spawns a duplicate.
    pub async fn find_local_event_by_remote_id(
        &self,
        remote_id: &str,
        kind: SyncKind,
    ) -> Result<Option<Event>> {
        let wanted = self.strip_prefix(remote_id);
        if wanted.is_empty() {
            return Ok(None);
        }
        let events = self.store.list(true, None).await?;
        Ok(events.into_iter().find(|event| {
            event
                .synced_calendars(kind)
                .values()
                .any(|id| self.strip_prefix(id) == wanted)
        }))
    }

    /// Route a remote change to its local event as an ordinary update.
    ///
    /// Under private modes a leading participants line in the incoming
    /// description is turned back into attendees.
    pub async fn apply_inbound_change(
        &self,
        remote_id: &str,
        kind: SyncKind,
        mut patch: EventPatch,
    ) -> Result<InboundOutcome> {
        let Some(event) = self.find_local_event_by_remote_id(remote_id, kind).await? else {
            debug!(target: "remarkable::sync", remote_id, %kind, "no local event for remote id");
            return Ok(InboundOutcome::Unmatched);
        };
        let Some((mode, _)) = event.sync_target(kind) else {
            return Ok(InboundOutcome::Ignored { event_id: event.id });
        };
        if !can_receive(mode) {
            debug!(target: "remarkable::sync", event_id = %event.id, %mode, "mode does not receive");
            return Ok(InboundOutcome::Ignored { event_id: event.id });
        }

        if mode.is_private() {
            if let Some(description) = patch.description.take() {
                let recovered = recover_participants(&description);
                if !recovered.attendees.is_empty() {
                    patch.attendees = Some(recovered.attendees);
                }
                patch.description = Some(recovered.description);
            }
        }

        let updated = self
            .store
            .update(&event.id, patch, WriteOptions::skip_sync())
            .await?;
        info!(target: "remarkable::sync", event_id = %updated.id, remote_id, %kind, "applied inbound change");
        Ok(InboundOutcome::Applied(Box::new(updated)))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn current(&self, event_id: &str) -> Result<Event> {
        self.store
            .get_by_id(event_id)
            .await?
            .ok_or_else(|| CoreError::not_found(event_id))
    }

    fn strip_prefix<'a>(&self, remote_id: &'a str) -> &'a str {
        self.remote_id_prefixes
            .iter()
            .find_map(|prefix| remote_id.strip_prefix(prefix.as_str()))
            .unwrap_or(remote_id)
    }

    async fn apply_targets(
        &self,
        event: &Event,
        calendar_ids: &[String],
        payload: Option<&OutboundPayload>,
        kind: SyncKind,
    ) -> Result<ReconcileReport> {
        let existing = event.synced_calendars(kind).clone();
        let mut synced = existing.clone();
        let mut report = ReconcileReport::default();
        let failure = |calendar_id: &str, operation, message: String| RemoteSyncError {
            event_id: event.id.clone(),
            calendar_id: calendar_id.to_string(),
            operation,
            message,
        };

        for (calendar_id, remote_id) in &existing {
            if calendar_ids.contains(calendar_id) {
                continue;
            }
            match self.remote.delete_event(remote_id).await {
                Ok(()) => {
                    synced.remove(calendar_id);
                    report.deleted.push(calendar_id.clone());
                }
                Err(err) => {
                    // Keep the mapping so a later pass retries the delete.
                    report.errors.push(failure(
                        calendar_id,
                        RemoteOperation::Delete,
                        err.to_string(),
                    ));
                }
            }
        }

        if let Some(payload) = payload {
            let mut seen = Vec::with_capacity(calendar_ids.len());
            for calendar_id in calendar_ids {
                if seen.contains(calendar_id) {
                    continue;
                }
                seen.push(calendar_id.clone());

                match existing.get(calendar_id) {
                    Some(remote_id) => match self.remote.update_event(remote_id, payload).await {
                        Ok(()) => report.updated.push(calendar_id.clone()),
                        Err(err) => {
                            debug!(
                                target: "remarkable::sync",
                                event_id = %event.id,
                                calendar_id = %calendar_id,
                                error = %err,
                                "update rejected, recreating"
                            );
                            if let Err(err) = self.remote.delete_event(remote_id).await {
                                report.errors.push(failure(
                                    calendar_id,
                                    RemoteOperation::Delete,
                                    err.to_string(),
                                ));
                                continue;
                            }
                            synced.remove(calendar_id);
                            match self.remote.create_event(calendar_id, payload).await {
                                Ok(new_id) => {
                                    synced.insert(calendar_id.clone(), new_id);
                                    report.updated.push(calendar_id.clone());
                                }
                                Err(err) => report.errors.push(failure(
                                    calendar_id,
                                    RemoteOperation::Create,
                                    err.to_string(),
                                )),
                            }
                        }
                    },
                    None => match self.remote.create_event(calendar_id, payload).await {
                        Ok(new_id) => {
                            synced.insert(calendar_id.clone(), new_id);
                            report.created.push(calendar_id.clone());
                        }
                        Err(err) => report.errors.push(failure(
                            calendar_id,
                            RemoteOperation::Create,
                            err.to_string(),
                        )),
                    },
                }
            }
        }

        for err in &report.errors {
            warn!(
                target: "remarkable::sync",
                event_id = %err.event_id,
                calendar_id = %err.calendar_id,
                operation = %err.operation,
                message = %err.message,
                "remote call failed"
            );
        }

        if synced != existing {
            self.store
                .update(&event.id, map_patch(kind, synced), WriteOptions::skip_sync())
                .await?;
        }
        Ok(report)
    }
}

fn map_patch(kind: SyncKind, synced: BTreeMap<String, String>) -> EventPatch {
    match kind {
        SyncKind::Plan => EventPatch {
            synced_plan_calendars: Some(synced),
            ..EventPatch::default()
        },
        SyncKind::Actual => EventPatch {
            synced_actual_calendars: Some(synced),
            ..EventPatch::default()
        },
    }
}

fn log_report(event_id: &str, report: &ReconcileReport) {
    info!(
        target: "remarkable::sync",
        event_id,
        created = report.created.len(),
        updated = report.updated.len(),
        deleted = report.deleted.len(),
        errors = report.errors.len(),
        "reconciled event"
    );
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
