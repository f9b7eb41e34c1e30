//! Relay Bot - the conversation core of relaybot.
//!
//! ## Architecture
//!
//! ```text
//! inbound message → CommandRouter ─┬─ SystemCommand → SystemOps
//!                                  └─ SessionStore → InferenceBackend (Ollama)
//!                                           ↓
//!                   ReplySink ←──── stripped reply
//! ```
//!
//! The transport side (webhooks, outbound HTTP) lives in `relay-channels`.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod inference;
pub mod router;
pub mod session;
pub mod system;

pub use error::{CommandError, InferenceError, SendError};
pub use inference::{InferenceBackend, OllamaClient};
pub use router::{
    strip_reasoning, strip_relay_secret, CommandRouter, ReplySink, Route, SystemCommand,
    AI_ERROR_REPLY, REBOOT_ACK,
};
pub use session::{Role, SessionEpoch, SessionStore, TimerToken, Turn};
pub use system::{
    format_interfaces, group_interfaces, AddressEntry, HostSystem, InterfaceInfo, SystemOps,
};
