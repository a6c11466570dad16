//! Relay client used by non-primary launches

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::debug;

use super::wire;
use crate::config::Config;
use crate::error::CoordinationError;

/// How a bounded send finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The primary read the frame and acknowledged it
    Delivered,
    /// The cancellation future completed first
    Cancelled,
}

/// Sends messages to the primary listening on a channel socket
#[derive(Debug, Clone)]
pub struct RelayClient {
    socket_path: PathBuf,
    connect_attempts: u32,
    retry_delay: Duration,
    max_message_size: usize,
}

impl RelayClient {
    /// Client for `socket_path` using the limits from `config`
    pub fn new(socket_path: PathBuf, config: &Config) -> Self {
        Self {
            socket_path,
            connect_attempts: config.connect_attempts.max(1),
            retry_delay: config.connect_retry_delay(),
            max_message_size: config.max_message_size,
        }
    }

    /// Client with default limits (for testing)
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self::new(socket_path, &Config::default())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send `text`, giving up after `timeout`
    ///
    /// A zero timeout returns at once without touching the socket.
    pub async fn send(&self, text: &str, timeout: Duration) -> Result<(), CoordinationError> {
        let timeout_ms = timeout.as_millis() as u64;
        debug!(?self.socket_path, timeout_ms, len = text.len(), "RelayClient::send: called");

        if timeout.is_zero() {
            debug!("RelayClient::send: zero timeout, not sending");
            return Err(CoordinationError::SendTimeout { timeout_ms });
        }

        match self.send_until(text, tokio::time::sleep(timeout)).await? {
            SendOutcome::Delivered => Ok(()),
            SendOutcome::Cancelled => Err(CoordinationError::SendTimeout { timeout_ms }),
        }
    }

    /// Send `text`, abandoning the transfer as soon as `cancel` completes
    ///
    /// Connect retries, the write and the wait for the acknowledgment all
    /// happen inside the cancellation window.
    pub async fn send_until<F>(&self, text: &str, cancel: F) -> Result<SendOutcome, CoordinationError>
    where
        F: Future<Output = ()>,
    {
        if text.len() > self.max_message_size {
            return Err(CoordinationError::MessageTooLarge {
                size: text.len(),
                max: self.max_message_size,
            });
        }

        tokio::select! {
            result = self.deliver(text) => {
                result?;
                debug!("RelayClient::send_until: acknowledged");
                Ok(SendOutcome::Delivered)
            }
            _ = cancel => {
                debug!("RelayClient::send_until: cancelled before acknowledgment");
                Ok(SendOutcome::Cancelled)
            }
        }
    }

    async fn deliver(&self, text: &str) -> Result<(), CoordinationError> {
        let mut stream = self.connect().await?;
        wire::write_frame(&mut stream, text, self.max_message_size).await?;
        wire::read_ack(&mut stream).await
    }

    /// Connect, retrying while the primary may still be binding its socket
    async fn connect(&self) -> Result<UnixStream, CoordinationError> {
        let mut attempt = 1;
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < self.connect_attempts => {
                    debug!(attempt, error = %e, "RelayClient::connect: retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
