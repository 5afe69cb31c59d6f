//! Signaling wire messages
//!
//! Every WebSocket text frame is a JSON object `{ "event": ..., "data": ... }`.
//! Signal envelopes ride in `data` and are forwarded verbatim; the hub never
//! interprets `sdp` or `candidate`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The recognized signaling message kinds. All of them are unicast.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    InitiateCall,
    StartCall,
    Accept,
    EndCall,
    RemoteEffect,
}

impl SignalKind {
    /// Wire name as sent by clients
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice_candidate",
            SignalKind::InitiateCall => "initiate_call",
            SignalKind::StartCall => "start_call",
            SignalKind::Accept => "accept",
            SignalKind::EndCall => "end_call",
            SignalKind::RemoteEffect => "remote_effect",
        }
    }

    /// Event name under which the envelope is delivered to the target.
    ///
    /// Identical to the wire name except `start_call`, which the target
    /// receives as `called`.
    pub fn delivery_event(&self) -> &'static str {
        match self {
            SignalKind::StartCall => "called",
            other => other.as_str(),
        }
    }

    /// Parse a client event name
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice_candidate" => Some(SignalKind::IceCandidate),
            "initiate_call" => Some(SignalKind::InitiateCall),
            "start_call" => Some(SignalKind::StartCall),
            "accept" => Some(SignalKind::Accept),
            "end_call" => Some(SignalKind::EndCall),
            "remote_effect" => Some(SignalKind::RemoteEffect),
            _ => None,
        }
    }
}

/// One signaling envelope exchanged between two peers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Opaque session-negotiation payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,

    /// Target peer id. Required for every kind; the hub only checks that
    /// it names a registered peer.
    pub target: String,

    /// Sender id. Stamped by the hub for `start_call`; trusted as supplied
    /// for every other kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Opaque, order-preserving ICE candidate fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Map<String, Value>>,
}

/// Event name for roster pushes
pub const ROSTER_EVENT: &str = "update_users";

/// Event name announcing the server-assigned session id
pub const SESSION_EVENT: &str = "session";

/// A framed message on the signaling socket
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Frame a signal envelope for delivery under the kind's delivery event
    pub fn signal(kind: SignalKind, envelope: &SignalEnvelope) -> Self {
        // SignalEnvelope has only string keys; serialization cannot fail
        let data = serde_json::to_value(envelope).unwrap_or(Value::Null);
        Self {
            event: kind.delivery_event().to_string(),
            data,
        }
    }

    /// Frame a roster push
    pub fn roster(peer_ids: &[String]) -> Self {
        Self {
            event: ROSTER_EVENT.to_string(),
            data: json!(peer_ids),
        }
    }

    /// Frame the session-id announcement sent to a peer at connect
    pub fn session(peer_id: &str) -> Self {
        Self {
            event: SESSION_EVENT.to_string(),
            data: json!({ "id": peer_id }),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
