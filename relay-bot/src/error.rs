//! Error taxonomy for the relay core.
//!
//! None of these escape a message-handling task: inference failures become a
//! fixed apology, command failures become partial output, send failures are
//! logged.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the inference backend.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference backend unreachable: {0}")]
    Unreachable(String),

    #[error("Inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    Malformed(String),

    #[error("Inference response has no message content")]
    MissingContent,
}

impl InferenceError {
    /// Whether a retry could plausibly succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Malformed(_) | Self::MissingContent => false,
        }
    }
}

/// Failure running an owner-only system command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to enumerate network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("No command configured for {0}")]
    NotConfigured(&'static str),

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },
}

/// Failure delivering a reply through the chat transport.
#[derive(Debug, Error)]
#[error("Failed to send message to {correspondent}: {reason}")]
pub struct SendError {
    pub correspondent: String,
    pub reason: String,
}

impl SendError {
    pub fn new(correspondent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            correspondent: correspondent.into(),
            reason: reason.into(),
        }
    }
}
