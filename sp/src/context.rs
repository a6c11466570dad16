//! Process-scoped peer context
//!
//! The application bootstrap creates one `PeerContext` and hands out
//! [`Coordinator`] instances from it. The context owns the single
//! registration and the notification bus those instances share.
//!
//! Release happens either when the last coordinator is dropped or when the
//! bootstrap calls [`PeerContext::shutdown`], whichever comes first.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::channel::ChannelName;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::CoordinationError;
use crate::events::{CoordinatorEvent, EventBus};
use crate::registration::{PeerRegistration, Role};
use crate::relay::SendOutcome;

/// Guarded together so the last detach and a fresh claim cannot interleave
#[derive(Default)]
struct ContextState {
    registration: Option<PeerRegistration>,
    instances: usize,
}

struct ContextInner {
    config: Config,
    runtime: Handle,
    bus: EventBus,
    state: Mutex<ContextState>,
    shutdown_tx: watch::Sender<bool>,
}

/// Shared single-instance state for one process
#[derive(Clone)]
pub struct PeerContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for PeerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerContext")
            .field("application_id", &self.application_id())
            .field("role", &self.role())
            .field("instances", &self.instance_count())
            .finish()
    }
}

impl PeerContext {
    /// Create a context on the current tokio runtime
    pub fn new(config: Config) -> Result<Self, CoordinationError> {
        let runtime = Handle::try_current().map_err(|_| CoordinationError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a context on an explicit runtime
    pub fn with_runtime(config: Config, runtime: Handle) -> Self {
        debug!(runtime_dir = ?config.runtime_dir, "PeerContext::with_runtime: called");
        let bus = EventBus::new(config.event_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                config,
                runtime,
                bus,
                state: Mutex::new(ContextState::default()),
                shutdown_tx,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// New facade instance observing this context
    pub fn coordinator(&self) -> Coordinator {
        let count = {
            let mut state = self.state();
            state.instances += 1;
            state.instances
        };
        debug!(instances = count, "PeerContext::coordinator: instance attached");
        Coordinator::attach(self.clone(), self.inner.bus.subscribe())
    }

    /// Number of live coordinator instances
    pub fn instance_count(&self) -> usize {
        self.state().instances
    }

    /// Receive notifications without holding a coordinator instance
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.bus.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        // A panic while holding the lock cannot leave the state half-written
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the application identity
    ///
    /// Setting the identity already held does nothing. Otherwise the old
    /// registration is released, a new one is claimed for a non-empty id, and
    /// every instance is told about the new identity and running state.
    pub fn set_application_id(&self, application_id: &str) {
        debug!(%application_id, "PeerContext::set_application_id: called");
        if self.is_shut_down() {
            warn!(%application_id, "Ignoring application id change after shutdown");
            return;
        }

        let running = {
            let mut state = self.state();
            let slot = &mut state.registration;
            let current = slot.as_ref().map(|r| r.application_id()).unwrap_or_default();
            if current == application_id {
                debug!("PeerContext::set_application_id: unchanged");
                return;
            }

            if let Some(old) = slot.take() {
                old.release();
            }
            if !application_id.is_empty() {
                *slot = Some(PeerRegistration::claim(
                    application_id,
                    &self.inner.config,
                    &self.inner.bus,
                    &self.inner.runtime,
                ));
            }
            slot.as_ref().is_some_and(|r| r.role().is_running())
        };

        self.inner.bus.emit(CoordinatorEvent::ApplicationIdChanged {
            application_id: application_id.to_string(),
        });
        self.inner.bus.emit(CoordinatorEvent::RunningChanged { running });
    }

    /// Current identity, empty when coordination is disabled
    pub fn application_id(&self) -> String {
        self.state()
            .registration
            .as_ref()
            .map(|r| r.application_id().to_string())
            .unwrap_or_default()
    }

    /// True when another process already owns the identity
    ///
    /// An identity whose channel could not be set up also counts as running.
    pub fn is_running(&self) -> bool {
        self.state().registration.as_ref().is_some_and(|r| r.role().is_running())
    }

    pub fn role(&self) -> Option<Role> {
        self.state().registration.as_ref().map(|r| r.role())
    }

    pub fn channel(&self) -> Option<ChannelName> {
        self.state().registration.as_ref().map(|r| r.channel().clone())
    }

    /// Relay `text` to the primary with the configured timeout
    pub async fn send_message(&self, text: &str) -> Result<(), CoordinationError> {
        self.send_message_with_timeout(text, self.inner.config.send_timeout())
            .await
    }

    /// Relay `text` to the primary, waiting at most `timeout` for the ack
    ///
    /// A no-op returning `Ok(())` for the primary itself, with no identity
    /// set, or in the fallback role. Shutting the context down cancels the
    /// wait.
    pub async fn send_message_with_timeout(&self, text: &str, timeout: Duration) -> Result<(), CoordinationError> {
        let timeout_ms = timeout.as_millis() as u64;
        let client = {
            let state = self.state();
            match state.registration.as_ref() {
                None => {
                    debug!("PeerContext::send_message: no application id, nothing to do");
                    return Ok(());
                }
                Some(reg) => match reg.relay_client(&self.inner.config) {
                    Some(client) => client,
                    None => {
                        debug!(role = ?reg.role(), "PeerContext::send_message: no primary to send to");
                        return Ok(());
                    }
                },
            }
        };

        if timeout.is_zero() {
            return Err(CoordinationError::SendTimeout { timeout_ms });
        }

        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let cancel = async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = async {
                    if !*shutdown_rx.borrow_and_update() {
                        let _ = shutdown_rx.changed().await;
                    }
                } => {}
            }
        };

        match client.send_until(text, cancel).await {
            Ok(SendOutcome::Delivered) => Ok(()),
            Ok(SendOutcome::Cancelled) => {
                debug!(timeout_ms, "PeerContext::send_message: dropped, no acknowledgment");
                Err(CoordinationError::SendTimeout { timeout_ms })
            }
            Err(e) => {
                debug!(error = %e, "PeerContext::send_message: dropped");
                Err(e)
            }
        }
    }

    /// Release the registration and cancel in-flight sends
    ///
    /// Terminal: later identity changes are ignored.
    pub fn shutdown(&self) {
        debug!("PeerContext::shutdown: called");
        self.inner.shutdown_tx.send_replace(true);
        if let Some(registration) = self.state().registration.take() {
            registration.release();
        }
        info!("Peer context shut down");
    }

    /// Called by a coordinator being dropped
    pub(crate) fn detach(&self) {
        let mut state = self.state();
        state.instances = state.instances.saturating_sub(1);
        debug!(remaining = state.instances, "PeerContext::detach: instance detached");
        if state.instances == 0 {
            if let Some(registration) = state.registration.take() {
                info!(application_id = %registration.application_id(), "Last instance gone, releasing registration");
                registration.release();
            }
        }
    }
}
