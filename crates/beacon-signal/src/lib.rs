//! Beacon Signaling Hub
//!
//! WebSocket signaling server for peer-to-peer call negotiation.
//! Connected peers exchange offers, answers, and ICE candidates through
//! the hub; the hub routes each envelope to its single target and keeps
//! every peer's view of the connected roster current.
//!
//! # Protocol
//!
//! 1. A peer connects via WebSocket (optionally presenting its own id)
//! 2. The hub assigns/accepts the id and broadcasts the updated roster
//! 3. Envelopes (`offer`, `answer`, `ice_candidate`, ...) are forwarded
//!    verbatim to the peer named in `target`
//! 4. The hub keeps no call state; call semantics live in the peers

pub mod hub;
pub mod messages;
pub mod registry;
pub mod roster;
pub mod router;
pub mod server;

pub use hub::SignalingHub;
pub use messages::{Frame, SignalEnvelope, SignalKind};
pub use registry::{PeerHandle, PeerRegistry, RegistryError};
pub use roster::RosterBroadcaster;
pub use router::{DropReason, RouteOutcome, Router};
pub use server::SignalServer;

/// Fixed WebSocket upgrade path
pub const SIGNAL_PATH: &str = "/ws";

/// Per-send timeout on a peer's socket before the connection is abandoned
pub const SEND_TIMEOUT_SECS: u64 = 10;

/// Maximum accepted length for a client-presented peer id
pub const MAX_PEER_ID_LEN: usize = 64;
