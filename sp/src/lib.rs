//! singlepeer - single-instance application coordination
//!
//! Makes sure at most one *primary* process exists per application
//! identifier on a host, and lets later launches relay short text messages to
//! it (typically their command line, so the primary can raise a window or
//! open a file).
//!
//! # Architecture
//!
//! ```text
//!   later launch (client)                      first launch (primary)
//! ┌─────────────────────────┐              ┌─────────────────────────────┐
//! │ Coordinator             │              │ Coordinator  Coordinator    │
//! │   └─ PeerContext        │              │      └──── PeerContext ─────┤
//! │        └─ Registration  │   frame +    │             ├─ Registration │
//! │             (Client)    │──── ack ────►│             │   (Primary)   │
//! │             RelayClient │  Unix socket │             │   listener ───┤
//! └─────────────────────────┘              │             └─ EventBus ◄───┘
//!                                          └─────────────────────────────┘
//! ```
//!
//! The primary role is decided by an exclusive lock on a per-channel lock
//! file, where the channel name is derived from the application identifier
//! (see [`channel`]).
//!
//! # Example
//!
//! ```ignore
//! use singlepeer::{Config, PeerContext};
//!
//! let ctx = PeerContext::new(Config::default())?;
//! let mut app = ctx.coordinator();
//! app.set_application_id("org.example.Notes");
//!
//! if app.is_running() {
//!     let _ = app.send_message("--open notes.txt").await;
//!     return Ok(());
//! }
//!
//! while let Some(event) = app.next_event().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod registration;
pub mod relay;

pub use channel::ChannelName;
pub use config::Config;
pub use context::PeerContext;
pub use coordinator::Coordinator;
pub use error::CoordinationError;
pub use events::{CoordinatorEvent, EventBus};
pub use registration::{PeerRegistration, Role};
pub use relay::{RelayClient, SendOutcome};
