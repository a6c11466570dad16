//! Primary-side listener
//!
//! Helpers for binding the channel socket and the accept loop that turns
//! incoming frames into `MessageReceived` notifications.

use std::path::Path;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::wire;
use crate::error::CoordinationError;
use crate::events::{CoordinatorEvent, EventBus};

/// Bind the channel socket, replacing a stale socket file
///
/// Only call this while holding the channel lock: a leftover socket file at
/// that point can only belong to a primary that has already exited.
/// Must run inside a tokio runtime context.
pub fn bind_listener(socket_path: &Path) -> Result<UnixListener, CoordinationError> {
    debug!(?socket_path, "bind_listener: creating channel socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "bind_listener: removing stale socket");
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    debug!(?socket_path, "bind_listener: socket bound");
    Ok(listener)
}

/// Remove the socket file on release
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Read one message, publish it, then acknowledge it
///
/// The notification goes out before the acknowledgment, so a sender that saw
/// its send succeed knows the primary has already published the message.
pub async fn handle_connection(
    stream: &mut UnixStream,
    bus: &EventBus,
    max_message_size: usize,
) -> Result<String, CoordinationError> {
    let text = wire::read_frame(stream, max_message_size).await?;
    debug!(len = text.len(), "handle_connection: message received");
    bus.emit(CoordinatorEvent::MessageReceived { text: text.clone() });
    wire::write_ack(stream).await?;
    Ok(text)
}

/// Accept loop for the primary
///
/// Connections are served one at a time so notifications follow wire arrival
/// order. Each connection gets `read_timeout` to deliver its frame. The loop
/// ends when `shutdown` fires or its sender is dropped.
pub async fn serve(
    listener: UnixListener,
    bus: EventBus,
    max_message_size: usize,
    read_timeout: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Relay listener started");
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("serve: shutdown signal received");
                break;
            }

            accept_result = listener.accept() => {
                let mut stream = match accept_result {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        warn!(error = %e, "serve: accept error");
                        continue;
                    }
                };
                debug!("serve: connection accepted");

                tokio::select! {
                    biased;

                    _ = &mut shutdown => {
                        debug!("serve: shutdown signal received mid-connection");
                        break;
                    }

                    result = tokio::time::timeout(
                        read_timeout,
                        handle_connection(&mut stream, &bus, max_message_size),
                    ) => match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(CoordinationError::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                            debug!("serve: peer closed before sending a full frame");
                        }
                        Ok(Err(e)) => warn!(error = %e, "serve: dropping connection"),
                        Err(_) => warn!(timeout_ms = read_timeout.as_millis() as u64, "serve: connection timed out"),
                    }
                }
            }
        }
    }
    info!("Relay listener stopped");
}
