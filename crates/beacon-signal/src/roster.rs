//! Roster broadcasting on membership change

use std::sync::Arc;

use tracing::debug;

use crate::messages::Frame;
use crate::registry::PeerRegistry;

/// Pushes the current roster to every connected peer.
///
/// The roster is recomputed from the registry on every announce; it is
/// never stored, so it cannot drift from the registry.
pub struct RosterBroadcaster {
    registry: Arc<PeerRegistry>,
}

impl RosterBroadcaster {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast an `update_users` frame to every connected peer.
    ///
    /// Best-effort: each send is an independent channel push, and a peer
    /// whose channel is gone is skipped without aborting the cycle.
    pub fn announce(&self) {
        let roster = self.registry.snapshot();
        let frame = Frame::roster(&roster);

        for id in &roster {
            let Some(handle) = self.registry.lookup(id) else {
                // disconnected between snapshot and send
                continue;
            };
            if !handle.send_frame(&frame) {
                debug!("Roster push to {} failed, skipping", id);
            }
        }
        debug!("Announced roster of {} peers", roster.len());
    }
}
