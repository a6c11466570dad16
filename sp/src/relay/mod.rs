//! Message relay between launches of the same application
//!
//! The primary listens on a Unix Domain Socket derived from the channel name.
//! Later launches connect, write one length-prefixed frame and wait (bounded)
//! for the primary's acknowledgment. Delivery is best effort.

pub mod client;
pub mod listener;
pub mod wire;

pub use client::{RelayClient, SendOutcome};
pub use listener::{bind_listener, cleanup_socket, handle_connection, serve};
