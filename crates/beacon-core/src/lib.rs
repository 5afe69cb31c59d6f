//! Beacon Core - Shared types, configuration, and credential derivation
//!
//! This crate contains the foundational pieces used by both the signaling
//! hub and the relay server. It has no dependency on networking code.

pub mod config;
pub mod credential;
pub mod error;

pub use config::{Config, ConfigError, RelayConfig, SignalConfig};
pub use error::{RelayError, SignalError};

/// Default signaling (WebSocket) port
pub const DEFAULT_SIGNAL_PORT: u16 = 8080;

/// Default relay (UDP) port
pub const DEFAULT_RELAY_PORT: u16 = 19302;

/// Default authentication realm
pub const DEFAULT_REALM: &str = "beacon";

/// Default relay allocation lifetime in seconds
pub const DEFAULT_ALLOCATION_LIFETIME_SECS: u64 = 600;

/// Minimum allocation lifetime a client may request
pub const MIN_ALLOCATION_LIFETIME_SECS: u64 = 30;

/// Maximum allocation lifetime a client may request
pub const MAX_ALLOCATION_LIFETIME_SECS: u64 = 3600;
