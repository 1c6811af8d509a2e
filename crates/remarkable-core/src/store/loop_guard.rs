//! Echo suppression for broadcast writes.
//!
//! Each local write gets a sequence number and is remembered for a short
//! window. A broadcast carrying our own sender id is an echo and is dropped;
//! anything from another sender is applied even when we have a pending write
//! for the same event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::broadcast::BroadcastMessage;

#[derive(Debug, Clone)]
struct PendingWrite {
    event_id: String,
    sequence: u64,
    recorded_at: Instant,
}

/// What to do with an inbound broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Our own write coming back
    OwnEcho,
    /// Another sender's write; `concurrent` when we wrote the same event
    /// within the window
    Foreign { concurrent: bool },
}

#[derive(Debug)]
pub struct LoopGuard {
    sender_id: String,
    sequence: AtomicU64,
    window: Duration,
    capacity: usize,
    pending: Mutex<VecDeque<PendingWrite>>,
}

impl LoopGuard {
    pub fn new(sender_id: impl Into<String>, window: Duration, capacity: usize) -> Self {
        Self {
            sender_id: sender_id.into(),
            sequence: AtomicU64::new(0),
            window,
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Tag a local write; returns its sequence number.
    pub fn record_local_write(&self, event_id: &str) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Instant::now();
        let mut pending = self.lock();
        self.prune(&mut pending, now);
        pending.push_back(PendingWrite {
            event_id: event_id.to_string(),
            sequence,
            recorded_at: now,
        });
        while pending.len() > self.capacity {
            pending.pop_front();
        }
        sequence
    }

    pub fn classify(&self, message: &BroadcastMessage) -> Inbound {
        let now = Instant::now();
        let mut pending = self.lock();
        self.prune(&mut pending, now);

        if message.sender_id == self.sender_id {
            pending.retain(|w| w.sequence != message.sequence_number);
            return Inbound::OwnEcho;
        }
        let concurrent = pending.iter().any(|w| w.event_id == message.event_id);
        Inbound::Foreign { concurrent }
    }

    /// True when a local write to `event_id` is still inside the window.
    pub fn has_pending(&self, event_id: &str) -> bool {
        let mut pending = self.lock();
        self.prune(&mut pending, Instant::now());
        pending.iter().any(|w| w.event_id == event_id)
    }

    pub fn pending_len(&self) -> usize {
        let mut pending = self.lock();
        self.prune(&mut pending, Instant::now());
        pending.len()
    }

    fn prune(&self, pending: &mut VecDeque<PendingWrite>, now: Instant) {
        while pending
            .front()
            .is_some_and(|w| now.duration_since(w.recorded_at) > self.window)
        {
            pending.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingWrite>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
