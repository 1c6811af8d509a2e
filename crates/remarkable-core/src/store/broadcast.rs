//! Cross-process change broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Kind of mutation a notification or broadcast describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Restore,
    /// Hard delete
    Purge,
}

/// Wire message exchanged between processes sharing one persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub sender_id: String,
    pub event_id: String,
    pub kind: ChangeKind,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
}

pub type BroadcastHandler = Box<dyn Fn(BroadcastMessage) + Send + Sync>;

/// Publish/subscribe transport supplied by the host.
pub trait BroadcastChannel: Send + Sync {
    fn publish(&self, message: BroadcastMessage);

    fn subscribe(&self, handler: BroadcastHandler);
}

/// Delivers every published message to every subscriber, the publisher's own
/// subscription included.
#[derive(Default)]
pub struct InProcessBroadcast {
    handlers: RwLock<Vec<Arc<BroadcastHandler>>>,
}

impl InProcessBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for InProcessBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBroadcast")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl BroadcastChannel for InProcessBroadcast {
    fn publish(&self, message: BroadcastMessage) {
        // Snapshot so handlers may subscribe without deadlocking.
        let handlers: Vec<Arc<BroadcastHandler>> = match self.handlers.read() {
            Ok(h) => h.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for handler in handlers {
            handler(message.clone());
        }
    }

    fn subscribe(&self, handler: BroadcastHandler) {
        match self.handlers.write() {
            Ok(mut h) => h.push(Arc::new(handler)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(handler)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_subscriber_receives() {
        let channel = InProcessBroadcast::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            channel.subscribe(Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        channel.publish(BroadcastMessage {
            sender_id: "remarkable-a".into(),
            event_id: "event_x".into(),
            kind: ChangeKind::Update,
            sequence_number: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = BroadcastMessage {
            sender_id: "remarkable-a".into(),
            event_id: "event_x".into(),
            kind: ChangeKind::Delete,
            sequence_number: 7,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "remarkable-a");
        assert_eq!(json["sequenceNumber"], 7);
        assert_eq!(json["kind"], "delete");
    }
}
