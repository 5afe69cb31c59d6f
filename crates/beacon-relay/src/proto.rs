//! Relay transaction framing
//!
//! Control datagrams carry a 4-byte magic followed by a bincode frame;
//! datagrams without the magic are data to be relayed. Every request
//! carries a random transaction id (echoed in the response) and an
//! integrity tag computed with the requester's long-term key over the
//! id and request body.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use beacon_core::credential::{self, KEY_SIZE, TAG_SIZE};

/// Prefix discriminating control frames from relayed data
pub const MAGIC: [u8; 4] = *b"BRP1";

/// Largest datagram the relay will receive or copy
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Transaction id length in bytes
pub const TRANSACTION_ID_LEN: usize = 12;

pub type TransactionId = [u8; TRANSACTION_ID_LEN];

/// Client-to-server relay transactions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    /// Reserve a relay endpoint for the requesting 5-tuple
    Allocate {
        identity: String,
        realm: String,
        /// Requested lifetime; 0 means "server default"
        lifetime_secs: u32,
    },
    /// Extend an existing allocation's lifetime
    Refresh {
        identity: String,
        realm: String,
        lifetime_secs: u32,
    },
    /// Release an allocation before it expires
    Teardown { identity: String, realm: String },
}

impl Request {
    pub fn identity(&self) -> &str {
        match self {
            Request::Allocate { identity, .. }
            | Request::Refresh { identity, .. }
            | Request::Teardown { identity, .. } => identity,
        }
    }

    pub fn realm(&self) -> &str {
        match self {
            Request::Allocate { realm, .. }
            | Request::Refresh { realm, .. }
            | Request::Teardown { realm, .. } => realm,
        }
    }
}

/// Server-to-client transaction results
///
/// `Error` deliberately carries nothing: an unknown identity, a wrong
/// secret, a bad realm, and a failed integrity check all look identical
/// on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Response {
    Allocated {
        relay_addr: SocketAddr,
        lifetime_secs: u32,
    },
    Refreshed {
        lifetime_secs: u32,
    },
    Closed,
    Error,
}

/// A framed request datagram
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: TransactionId,
    pub tag: [u8; TAG_SIZE],
    pub request: Request,
}

/// A framed response datagram
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: TransactionId,
    pub response: Response,
}

/// Whether a datagram is a control frame.
///
/// The prefix check is the only demultiplexer on the shared socket: a data
/// payload that itself begins with the magic is taken for a control frame
/// and, failing to decode, dropped rather than relayed. Client payloads
/// must not start with the magic.
pub fn is_control(datagram: &[u8]) -> bool {
    datagram.len() > MAGIC.len() && datagram[..MAGIC.len()] == MAGIC
}

/// The bytes covered by a request's integrity tag
pub fn signed_bytes(id: &TransactionId, request: &Request) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(&(id, request))
}

/// Build a request frame tagged with the given long-term key
pub fn signed_request(
    id: TransactionId,
    key: &[u8; KEY_SIZE],
    request: Request,
) -> Result<RequestFrame, bincode::Error> {
    let tag = credential::integrity_tag(key, &signed_bytes(&id, &request)?);
    Ok(RequestFrame { id, tag, request })
}

/// Generate a random transaction id
pub fn new_transaction_id() -> TransactionId {
    let mut id = [0u8; TRANSACTION_ID_LEN];
    getrandom::getrandom(&mut id).expect("RNG failed");
    id
}

pub fn encode_request(frame: &RequestFrame) -> Result<Vec<u8>, bincode::Error> {
    let mut out = MAGIC.to_vec();
    out.extend(bincode::serialize(frame)?);
    Ok(out)
}

pub fn decode_request(datagram: &[u8]) -> Option<RequestFrame> {
    if !is_control(datagram) {
        return None;
    }
    bincode::deserialize(&datagram[MAGIC.len()..]).ok()
}

pub fn encode_response(frame: &ResponseFrame) -> Result<Vec<u8>, bincode::Error> {
    let mut out = MAGIC.to_vec();
    out.extend(bincode::serialize(frame)?);
    Ok(out)
}

pub fn decode_response(datagram: &[u8]) -> Option<ResponseFrame> {
    if !is_control(datagram) {
        return None;
    }
    bincode::deserialize(&datagram[MAGIC.len()..]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    use beacon_core::credential::long_term_key;

    #[test]
    fn test_request_frame_round_trip() {
        let key = long_term_key("alice", "beacon", "wonderland");
        let request = Request::Allocate {
            identity: "alice".into(),
            realm: "beacon".into(),
            lifetime_secs: 600,
        };

        let frame = signed_request(new_transaction_id(), &key, request.clone()).unwrap();
        let wire = encode_request(&frame).unwrap();
        assert!(is_control(&wire));

        let decoded = decode_request(&wire).unwrap();
        assert_eq!(decoded.id, frame.id);
        assert_eq!(decoded.request, request);
        assert_eq!(decoded.tag, frame.tag);
    }

    #[test]
    fn test_response_frame_round_trip() {
        let frame = ResponseFrame {
            id: new_transaction_id(),
            response: Response::Allocated {
                relay_addr: "203.0.113.7:50000".parse().unwrap(),
                lifetime_secs: 600,
            },
        };

        let wire = encode_response(&frame).unwrap();
        let decoded = decode_response(&wire).unwrap();
        assert_eq!(decoded.id, frame.id);
        assert_eq!(decoded.response, frame.response);
    }

    #[test]
    fn test_data_datagrams_are_not_control() {
        assert!(!is_control(b""));
        assert!(!is_control(b"BRP"));
        assert!(!is_control(b"rtp payload bytes"));
        assert!(decode_request(b"not a control frame").is_none());
    }

    #[test]
    fn test_magic_prefixed_data_is_taken_for_control() {
        // the demux has no escape rule: data starting with the magic is
        // consumed as a control frame and dropped when it fails to decode
        let mut payload = MAGIC.to_vec();
        payload.extend(b"application bytes");
        assert!(is_control(&payload));
        assert!(decode_request(&payload).is_none());
    }

    #[test]
    fn test_tag_covers_id_and_request() {
        let request = Request::Teardown {
            identity: "alice".into(),
            realm: "beacon".into(),
        };
        let a = signed_bytes(&[1u8; TRANSACTION_ID_LEN], &request).unwrap();
        let b = signed_bytes(&[2u8; TRANSACTION_ID_LEN], &request).unwrap();
        assert_ne!(a, b);
    }
}
