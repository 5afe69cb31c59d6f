//! Stateless envelope routing

use std::sync::Arc;

use tracing::debug;

use crate::messages::{Frame, SignalEnvelope, SignalKind};
use crate::registry::PeerRegistry;

/// Outcome of routing one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the target's transport channel
    Delivered { target: String },
    /// Not delivered; the sender is never told
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TargetNotConnected,
}

/// Routes each envelope to the single peer named in `target`.
///
/// Dispatch is a channel push to the target's writer task, so a stalled
/// receiver never delays the sender's request processing.
pub struct Router {
    registry: Arc<PeerRegistry>,
}

impl Router {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    /// Route one envelope from `sender`.
    ///
    /// For `start_call` the sender-supplied `from` is overwritten with the
    /// true sender id before forwarding; every other kind passes `from`
    /// through as supplied. Unknown targets are dropped silently: the
    /// sender has no ack channel, matching at-most-once delivery.
    pub fn route(&self, sender: &str, kind: SignalKind, mut envelope: SignalEnvelope) -> RouteOutcome {
        if kind == SignalKind::StartCall {
            envelope.from = Some(sender.to_string());
        }

        match self.registry.lookup(&envelope.target) {
            Some(handle) => {
                let target = envelope.target.clone();
                debug!("Routing {} from {} to {}", kind.as_str(), sender, target);
                if !handle.send_frame(&Frame::signal(kind, &envelope)) {
                    // connection died between lookup and send
                    debug!("Target {} went away mid-route", target);
                    return RouteOutcome::Dropped(DropReason::TargetNotConnected);
                }
                RouteOutcome::Delivered { target }
            }
            None => {
                debug!(
                    "Dropping {} from {}: target {} not connected",
                    kind.as_str(),
                    sender,
                    envelope.target
                );
                RouteOutcome::Dropped(DropReason::TargetNotConnected)
            }
        }
    }
}
