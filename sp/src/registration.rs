//! Peer registration
//!
//! Claims an application identity for this process. The exclusive advisory
//! lock on the channel lock file decides the role: whoever holds it is the
//! primary and owns the socket; everyone else is a client. The OS drops the
//! lock when the holder exits, so a crashed primary never blocks the next
//! launch.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::channel::ChannelName;
use crate::config::Config;
use crate::error::CoordinationError;
use crate::events::EventBus;
use crate::relay::{self, RelayClient};

/// Role of this process for a claimed identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the channel and receives relayed messages
    Primary,
    /// Another process holds the channel
    Client,
    /// The channel could not be set up; treated as "already running" with no
    /// primary to talk to
    Fallback,
}

impl Role {
    /// Whether another instance should be assumed to own the identity
    pub fn is_running(&self) -> bool {
        !matches!(self, Role::Primary)
    }
}

enum LockOutcome {
    Acquired(File),
    Contended,
}

/// Active registration for one application identity
#[derive(Debug)]
pub struct PeerRegistration {
    application_id: String,
    channel: ChannelName,
    role: Role,
    socket_path: PathBuf,
    lock_file: Option<File>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl PeerRegistration {
    /// Claim `application_id`, becoming primary if nobody else holds it
    ///
    /// Never fails: setup errors are logged and produce the fallback role.
    pub fn claim(application_id: &str, config: &Config, bus: &EventBus, runtime: &Handle) -> Self {
        let channel = ChannelName::derive(application_id);
        debug!(%application_id, %channel, "PeerRegistration::claim: called");

        let socket_path = channel.socket_path(&config.runtime_dir);
        let mut registration = Self {
            application_id: application_id.to_string(),
            channel,
            role: Role::Fallback,
            socket_path,
            lock_file: None,
            shutdown_tx: None,
        };

        match registration.try_become_primary(config, bus, runtime) {
            Ok(role) => registration.role = role,
            Err(e) => {
                warn!(%application_id, error = %e, "Channel unavailable, assuming another instance is running");
            }
        }

        info!(%application_id, channel = %registration.channel, role = ?registration.role, "Peer registered");
        registration
    }

    fn try_become_primary(&mut self, config: &Config, bus: &EventBus, runtime: &Handle) -> Result<Role, CoordinationError> {
        let lock_path = self.channel.lock_path(&config.runtime_dir);

        let lock_file = match acquire_lock(&lock_path).map_err(|source| self.unavailable(&lock_path, source))? {
            LockOutcome::Acquired(file) => file,
            LockOutcome::Contended => {
                debug!(?lock_path, "PeerRegistration::try_become_primary: lock held elsewhere");
                return Ok(Role::Client);
            }
        };

        let listener = {
            let _guard = runtime.enter();
            relay::bind_listener(&self.socket_path)
        };
        let listener = match listener {
            Ok(listener) => listener,
            Err(CoordinationError::Io(source)) => {
                // The lock is released with `lock_file` so a healthier process can take over
                let _ = FileExt::unlock(&lock_file);
                return Err(self.unavailable(&self.socket_path.clone(), source));
            }
            Err(e) => return Err(e),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        runtime.spawn(relay::serve(
            listener,
            bus.clone(),
            config.max_message_size,
            config.send_timeout(),
            shutdown_rx,
        ));

        self.lock_file = Some(lock_file);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(Role::Primary)
    }

    fn unavailable(&self, path: &Path, source: std::io::Error) -> CoordinationError {
        CoordinationError::ChannelUnavailable {
            channel: self.channel.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Relay client for reaching the primary
    ///
    /// Only a `Client` has a reachable primary; the primary itself and the
    /// fallback role get `None`.
    pub fn relay_client(&self, config: &Config) -> Option<RelayClient> {
        match self.role {
            Role::Client => Some(RelayClient::new(self.socket_path.clone(), config)),
            Role::Primary | Role::Fallback => None,
        }
    }

    /// Give up the identity
    ///
    /// A primary stops listening, removes its socket and unlocks the channel.
    /// A client only drops local state.
    pub fn release(self) {
        debug!(application_id = %self.application_id, role = ?self.role, "PeerRegistration::release: called");
        drop(self);
    }
}

impl Drop for PeerRegistration {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if self.role == Role::Primary {
            relay::cleanup_socket(&self.socket_path);
        }
        if let Some(lock_file) = self.lock_file.take() {
            if let Err(e) = FileExt::unlock(&lock_file) {
                warn!(channel = %self.channel, error = %e, "Failed to unlock channel");
            }
            info!(application_id = %self.application_id, channel = %self.channel, "Released primary role");
        }
    }
}

/// Take the channel lock without blocking
fn acquire_lock(lock_path: &Path) -> std::io::Result<LockOutcome> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => Ok(LockOutcome::Acquired(file)),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(LockOutcome::Contended),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(LockOutcome::Contended),
        Err(e) => Err(e),
    }
}
