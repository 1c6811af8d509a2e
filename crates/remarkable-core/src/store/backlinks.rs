//! Reverse-link lookup behind a replaceable interface.

use async_trait::async_trait;

use super::persistence::EventPersistence;
use crate::error::Result;

/// Computes the ids of active events that link to a target.
#[async_trait]
pub trait BacklinkIndex: Send + Sync {
    async fn backlinks_for(
        &self,
        persistence: &dyn EventPersistence,
        target_id: &str,
    ) -> Result<Vec<String>>;
}

/// Full scan over every stored event. Linear per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanBacklinkIndex;

#[async_trait]
impl BacklinkIndex for ScanBacklinkIndex {
    async fn backlinks_for(
        &self,
        persistence: &dyn EventPersistence,
        target_id: &str,
    ) -> Result<Vec<String>> {
        let events = persistence.query_all(None).await?;
        Ok(events
            .into_iter()
            .filter(|e| !e.is_deleted() && !e.is_subordinate() && e.id != target_id)
            .filter(|e| e.linked_event_ids.iter().any(|l| l == target_id))
            .map(|e| e.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{normalize_event, EventDraft};
    use crate::store::persistence::MemoryPersistence;
    use chrono::Utc;

    #[tokio::test]
    async fn test_scan_skips_deleted_and_subordinate() {
        let persistence = MemoryPersistence::new();
        let target = normalize_event(EventDraft::task("target"), None, Utc::now());
        let link = |title: &str| EventDraft {
            linked_event_ids: Some(vec![target.id.clone()]),
            ..EventDraft::task(title)
        };
        let live = normalize_event(link("live"), None, Utc::now());
        let deleted = normalize_event(
            EventDraft {
                deleted_at: Some(Utc::now()),
                ..link("deleted")
            },
            None,
            Utc::now(),
        );
        let segment = normalize_event(
            EventDraft {
                is_timer_child: Some(true),
                ..link("segment")
            },
            None,
            Utc::now(),
        );
        for e in [&target, &live, &deleted, &segment] {
            persistence.put(e).await.unwrap();
        }

        let found = ScanBacklinkIndex
            .backlinks_for(&persistence, &target.id)
            .await
            .unwrap();
        assert_eq!(found, vec![live.id]);
    }
}
