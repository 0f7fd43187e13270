//! Live event fan-out.
//!
//! Publish never blocks: each subscriber owns a bounded channel and a full
//! channel simply loses that subscriber's copy of the event. Subscribers
//! that went away are pruned on the next publish.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-subscriber buffer capacity.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Events published on the live hub.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    SessionConnected {
        session_id: String,
        profile: String,
        transport: String,
    },
    SessionDisconnected {
        session_id: String,
        profile: String,
    },
    ToolStart {
        session_id: String,
        profile: String,
        tool: String,
    },
    ToolEnd {
        session_id: String,
        profile: String,
        tool: String,
        duration_ms: u64,
        success: bool,
    },
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<LiveEvent>,
}

#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = Uuid::new_v4();
        self.subscribers.lock().push(Subscriber { id, tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver to every subscriber that has room; drop for the rest.
    pub fn publish(&self, event: LiveEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => true,
                // Overflow: this subscriber misses the event but stays.
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}
