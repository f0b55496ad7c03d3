//! Advisory event fan-out
//!
//! A `tokio::sync::broadcast` channel. Publishing never blocks and never
//! fails the operation that produced the event; slow subscribers lag and
//! miss events.

use tokio::sync::broadcast;
use vitality_core::EngineEvent;

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast sender for [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create bus with room for `capacity` unread events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; a bus without subscribers drops it
    pub fn publish(&self, event: EngineEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            tracing::trace!(event = name, "no subscribers for event");
        }
    }

    /// New receiver seeing events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Current subscriber count
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
