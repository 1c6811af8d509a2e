//! Persistence capability consumed by the event store.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::Event;

/// Key-value storage for events with range queries. Each call is atomic on
/// its own; nothing spans calls.
#[async_trait]
pub trait EventPersistence: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Event>>;

    /// Insert or replace by id.
    async fn put(&self, event: &Event) -> Result<()>;

    /// Timed events overlapping `[start, end]` plus untimed tasks, deleted
    /// records included.
    async fn query_by_time_range(&self, start: NaiveDateTime, end: NaiveDateTime)
        -> Result<Vec<Event>>;

    /// Every record, deleted ones included, ordered by id.
    async fn query_all(&self, limit: Option<usize>) -> Result<Vec<Event>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Range membership shared by the bundled implementations.
pub fn in_time_range(event: &Event, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    match (event.start_time, event.end_time) {
        (Some(s), Some(e)) => s <= end && e >= start,
        (Some(at), None) | (None, Some(at)) => at >= start && at <= end,
        (None, None) => event.is_task,
    }
}

/// Ordered in-memory storage.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    events: RwLock<BTreeMap<String, Event>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventPersistence for MemoryPersistence {
    async fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn put(&self, event: &Event) -> Result<()> {
        self.events
            .write()
            .await
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn query_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|e| in_time_range(e, start, end))
            .cloned()
            .collect())
    }

    async fn query_all(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        Ok(events
            .values()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.events.write().await.remove(id);
        Ok(())
    }
}
