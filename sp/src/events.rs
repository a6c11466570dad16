//! Coordinator notifications
//!
//! One broadcast bus per [`PeerContext`](crate::PeerContext). Every
//! [`Coordinator`](crate::Coordinator) holds a receiver, so a single emit
//! reaches all instances in the process in the same order.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default buffered notifications per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Notifications delivered to every coordinator instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    /// The application identifier was replaced
    ApplicationIdChanged { application_id: String },

    /// The running state may have changed along with the identifier
    RunningChanged { running: bool },

    /// A client relayed a message to this primary
    MessageReceived { text: String },
}

impl CoordinatorEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ApplicationIdChanged { .. } => "ApplicationIdChanged",
            Self::RunningChanged { .. } => "RunningChanged",
            Self::MessageReceived { .. } => "MessageReceived",
        }
    }
}

/// Broadcast bus for coordinator notifications
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: CoordinatorEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
