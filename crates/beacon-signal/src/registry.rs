//! Peer registry: the single source of truth for who is connected

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::messages::Frame;

/// Handle to one peer's outbound transport channel.
///
/// Sends are non-blocking channel pushes; the connection's writer task does
/// the actual socket I/O, so nothing here ever waits on a slow peer.
#[derive(Clone)]
pub struct PeerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    /// Queue a frame for delivery. Returns false if the connection is gone
    /// or the frame does not serialize.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        match frame.to_json() {
            Ok(json) => self.tx.send(Message::Text(json)).is_ok(),
            Err(_) => false,
        }
    }

    /// Ask the connection to close (best-effort)
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }

    /// Whether this handle feeds the same connection as `other`
    pub fn same_connection(&self, other: &PeerHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already bound to a live handle
    DuplicateId(String),
}

/// Thread-safe map from peer id to live transport handle.
///
/// A single mutex guards the map so that `snapshot` can never observe a
/// half-applied register/unregister. The lock is only ever held for map
/// operations; I/O happens on the far side of the handles.
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, PeerHandle>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a peer. Fails rather than silently overwriting, since an
    /// overwrite would leak the displaced transport handle.
    pub fn register(&self, id: &str, handle: PeerHandle) -> Result<(), RegistryError> {
        let mut peers = self.peers.lock();
        if peers.contains_key(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        peers.insert(id.to_string(), handle);
        Ok(())
    }

    /// Remove a peer if present. Disconnect-after-disconnect is tolerated.
    pub fn unregister(&self, id: &str) -> bool {
        self.peers.lock().remove(id).is_some()
    }

    /// Remove a peer only if the entry still belongs to `handle`.
    ///
    /// Keeps a stale connection's teardown from evicting the replacement
    /// that won a reconnect race.
    pub fn unregister_handle(&self, id: &str, handle: &PeerHandle) -> bool {
        let mut peers = self.peers.lock();
        match peers.get(id) {
            Some(current) if current.same_connection(handle) => {
                peers.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Look up a peer's handle
    pub fn lookup(&self, id: &str) -> Option<PeerHandle> {
        self.peers.lock().get(id).cloned()
    }

    /// Consistent point-in-time copy of the connected ids, safe to iterate
    /// without holding the lock
    pub fn snapshot(&self) -> Vec<String> {
        self.peers.lock().keys().cloned().collect()
    }

    /// Number of connected peers
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
