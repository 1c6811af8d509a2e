//! Remote calendar capability.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::payload::OutboundPayload;

/// Error reported by a remote calendar implementation.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// The calendar service client, supplied by the host.
#[async_trait]
pub trait RemoteCalendar: Send + Sync {
    /// Create a copy in `calendar_id` and return its remote id.
    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &OutboundPayload,
    ) -> Result<String, RemoteError>;

    async fn update_event(&self, remote_id: &str, payload: &OutboundPayload)
        -> Result<(), RemoteError>;

    async fn delete_event(&self, remote_id: &str) -> Result<(), RemoteError>;
}

/// A remote copy held by [`MemoryCalendar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRemoteEvent {
    pub calendar_id: String,
    pub payload: OutboundPayload,
}

#[derive(Debug, Default)]
struct MemoryCalendarState {
    events: BTreeMap<String, StoredRemoteEvent>,
    failing_calendars: HashSet<String>,
    reject_updates: bool,
    calls: Vec<String>,
}

/// In-process calendar service. Remote ids carry a service prefix
/// (`outlook-...`) the way real providers' ids do.
#[derive(Debug)]
pub struct MemoryCalendar {
    prefix: String,
    state: Mutex<MemoryCalendarState>,
}

impl MemoryCalendar {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(MemoryCalendarState::default()),
        }
    }

    /// Every call against `calendar_id` fails from now on.
    pub fn fail_calendar(&self, calendar_id: &str) {
        self.lock().failing_calendars.insert(calendar_id.to_string());
    }

    /// Reject every update, forcing callers onto delete-and-recreate.
    pub fn reject_updates(&self, reject: bool) {
        self.lock().reject_updates = reject;
    }

    pub fn events(&self) -> BTreeMap<String, StoredRemoteEvent> {
        self.lock().events.clone()
    }

    pub fn events_in(&self, calendar_id: &str) -> Vec<(String, StoredRemoteEvent)> {
        self.lock()
            .events
            .iter()
            .filter(|(_, e)| e.calendar_id == calendar_id)
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect()
    }

    /// Calls in order, as `op:target`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryCalendarState> {
        // A poisoned lock only means a test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteCalendar for MemoryCalendar {
    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &OutboundPayload,
    ) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("create:{calendar_id}"));
        if state.failing_calendars.contains(calendar_id) {
            return Err(format!("calendar '{calendar_id}' unavailable").into());
        }
        let remote_id = format!("{}{}", self.prefix, uuid::Uuid::new_v4().simple());
        state.events.insert(
            remote_id.clone(),
            StoredRemoteEvent {
                calendar_id: calendar_id.to_string(),
                payload: payload.clone(),
            },
        );
        Ok(remote_id)
    }

    async fn update_event(
        &self,
        remote_id: &str,
        payload: &OutboundPayload,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("update:{remote_id}"));
        if state.reject_updates {
            return Err("update rejected".into());
        }
        let failing = state
            .events
            .get(remote_id)
            .map(|e| state.failing_calendars.contains(&e.calendar_id))
            .unwrap_or(false);
        if failing {
            return Err(format!("remote event '{remote_id}' unavailable").into());
        }
        match state.events.get_mut(remote_id) {
            Some(stored) => {
                stored.payload = payload.clone();
                Ok(())
            }
            None => Err(format!("remote event '{remote_id}' not found").into()),
        }
    }

    async fn delete_event(&self, remote_id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(format!("delete:{remote_id}"));
        let failing = state
            .events
            .get(remote_id)
            .map(|e| state.failing_calendars.contains(&e.calendar_id))
            .unwrap_or(false);
        if failing {
            return Err(format!("remote event '{remote_id}' unavailable").into());
        }
        state.events.remove(remote_id);
        Ok(())
    }
}
