//! Error types shared across Beacon components

use thiserror::Error;

/// Signaling-plane errors
///
/// None of these are fatal to a connection: a frame that fails to decode
/// is logged and dropped, and the connection stays open.
#[derive(Error, Debug, Clone)]
pub enum SignalError {
    #[error("malformed signaling payload: {0}")]
    Decode(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

/// Relay-plane errors
///
/// Per-transaction refusals never surface here; they go back on the wire
/// as the opaque error response so refusal causes stay indistinguishable.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The UDP listener could not be bound. Fatal at startup: the process
    /// must not serve signaling while the relay is unavailable.
    #[error("failed to bind relay listener: {0}")]
    Bind(#[from] std::io::Error),
}
