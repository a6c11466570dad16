//! Coordination error types
//!
//! None of these are fatal to the host application. Claim failures degrade to
//! the fallback role and send failures drop the message; the typed error only
//! exists so callers can log what happened.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by peer registration and the message relay
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Channel {channel} unavailable at {path}")]
    ChannelUnavailable {
        channel: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No acknowledgment from primary within {timeout_ms}ms")]
    SendTimeout { timeout_ms: u64 },

    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No tokio runtime available to host the peer")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinationError {
    /// True when the failure was the send deadline elapsing
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SendTimeout { .. })
    }
}
