//! Event bus - lifecycle notification broadcast
//!
//! Fan-out sink for runtime lifecycle events. Publishing never blocks and
//! never fails; a bus with no subscribers simply drops the event. Nothing in
//! the runtime core depends on delivery.

use super::types::RuntimeEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Event bus settings
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broadcast channel capacity; slow subscribers lag past this
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Broadcast bus for `RuntimeEvent`s
pub struct EventBus {
    /// Broadcast sender; receivers are created on subscribe
    sender: broadcast::Sender<RuntimeEvent>,

    /// Total events published
    event_count: AtomicU64,
}

impl EventBus {
    /// New bus with default settings
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// New bus with explicit settings
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            event_count: AtomicU64::new(0),
        }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: RuntimeEvent) {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        trace!(event_type = %event.event_type, namespace = %event.namespace, "event published");
        // Err means no live receivers; that is fine for a pure sink
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published since creation
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
