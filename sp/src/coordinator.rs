//! Coordinator facade
//!
//! The surface the embedding application works with. Instances are cheap:
//! they all read and write the registration held by their [`PeerContext`] and
//! each one receives every notification on the context's bus.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::context::PeerContext;
use crate::error::CoordinationError;
use crate::events::CoordinatorEvent;
use crate::registration::Role;

/// One facade instance bound to a peer context
pub struct Coordinator {
    context: PeerContext,
    events: broadcast::Receiver<CoordinatorEvent>,
}

impl Coordinator {
    pub(crate) fn attach(context: PeerContext, events: broadcast::Receiver<CoordinatorEvent>) -> Self {
        Self { context, events }
    }

    pub fn context(&self) -> &PeerContext {
        &self.context
    }

    /// See [`PeerContext::set_application_id`]
    pub fn set_application_id(&self, application_id: &str) {
        self.context.set_application_id(application_id);
    }

    pub fn application_id(&self) -> String {
        self.context.application_id()
    }

    /// True when another process is already the primary for this identity
    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    pub fn role(&self) -> Option<Role> {
        self.context.role()
    }

    /// Relay `text` to the primary using the configured default timeout
    ///
    /// Failures are reported for logging only; the message is simply dropped.
    pub async fn send_message(&self, text: &str) -> Result<(), CoordinationError> {
        self.context.send_message(text).await
    }

    pub async fn send_message_with_timeout(&self, text: &str, timeout: Duration) -> Result<(), CoordinationError> {
        self.context.send_message_with_timeout(text, timeout).await
    }

    /// Next notification for this instance
    ///
    /// Skips ahead with a warning if this instance fell behind the bus.
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Coordinator fell behind, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next notification if one is already queued
    pub fn try_next_event(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Coordinator fell behind, notifications dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Additional receiver for this instance's notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.resubscribe()
    }
}

impl Clone for Coordinator {
    /// A clone is a new instance with its own notification queue
    fn clone(&self) -> Self {
        self.context.coordinator()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        debug!("Coordinator::drop: detaching from context");
        self.context.detach();
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").field("context", &self.context).finish()
    }
}
