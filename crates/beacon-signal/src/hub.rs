//! Signaling hub: connection lifecycle and envelope dispatch
//!
//! The hub composes the registry, router, and roster broadcaster. It holds
//! no per-call state; once peers are connected it is purely a forwarding
//! substrate, and call semantics live entirely in the peers.

use std::sync::Arc;

use tracing::{debug, warn};

use beacon_core::error::SignalError;

use crate::messages::{Frame, SignalEnvelope, SignalKind};
use crate::registry::{PeerHandle, PeerRegistry, RegistryError};
use crate::roster::RosterBroadcaster;
use crate::router::{RouteOutcome, Router};

pub struct SignalingHub {
    registry: Arc<PeerRegistry>,
    router: Router,
    roster: RosterBroadcaster,
}

impl SignalingHub {
    pub fn new() -> Self {
        let registry = Arc::new(PeerRegistry::new());
        Self {
            router: Router::new(registry.clone()),
            roster: RosterBroadcaster::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Number of connected peers (for monitoring)
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// A peer's transport connected.
    ///
    /// On a duplicate id the new connection wins: the stale entry is
    /// evicted and its transport asked to close, then the new handle is
    /// registered. The common cause is a client reconnecting with its
    /// previous id before the old socket noticed it died.
    pub fn connect(&self, id: &str, handle: PeerHandle) {
        if let Err(RegistryError::DuplicateId(_)) = self.registry.register(id, handle.clone()) {
            warn!("Peer {} reconnected, replacing stale connection", id);
            if let Some(stale) = self.registry.lookup(id) {
                stale.close();
            }
            self.registry.unregister(id);
            if self.registry.register(id, handle).is_err() {
                // lost a reconnect race to an even newer connection
                debug!("Peer {} replaced again before registration", id);
                return;
            }
        }
        debug!("Peer {} connected", id);
        self.roster.announce();
    }

    /// A peer's transport disconnected.
    ///
    /// Only removes the entry if it still belongs to `handle`, so a stale
    /// connection tearing down after a reconnect cannot evict its
    /// replacement. Re-announces only when something was removed.
    pub fn disconnect(&self, id: &str, handle: &PeerHandle) {
        if self.registry.unregister_handle(id, handle) {
            debug!("Peer {} disconnected", id);
            self.roster.announce();
        }
    }

    /// Handle one inbound text frame from `sender`.
    ///
    /// Malformed frames and unknown events are logged and dropped; the
    /// connection stays open. The error is returned for observability
    /// only and is never relayed back to the sender.
    pub fn handle_frame(&self, sender: &str, text: &str) -> Result<RouteOutcome, SignalError> {
        let frame = Frame::from_json(text).map_err(|e| {
            debug!("Dropping malformed frame from {}: {}", sender, e);
            SignalError::Decode(e.to_string())
        })?;

        let kind = SignalKind::from_event(&frame.event).ok_or_else(|| {
            warn!("Unknown event '{}' from {}", frame.event, sender);
            SignalError::UnknownEvent(frame.event.clone())
        })?;

        let envelope: SignalEnvelope = serde_json::from_value(frame.data).map_err(|e| {
            debug!("Dropping {} from {} with bad payload: {}", kind.as_str(), sender, e);
            SignalError::Decode(e.to_string())
        })?;

        Ok(self.router.route(sender, kind, envelope))
    }
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}
