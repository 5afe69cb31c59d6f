//! Relay allocations: per-session endpoints and datagram forwarding
//!
//! Each allocation owns a freshly bound UDP socket whose address is handed
//! back to the client. A forwarding task copies datagrams arriving there to
//! the client's real address via the shared server socket, latching the
//! sender as the session's remote peer; datagrams from the client go out
//! the allocated socket to the latched peer. Pure copy, no inspection.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::proto::MAX_DATAGRAM;

/// One reserved relay endpoint, bound to a session
pub struct Allocation {
    client_addr: SocketAddr,
    relay_addr: SocketAddr,
    relay_socket: Arc<UdpSocket>,
    /// Remote peer, latched from the first datagram seen at the relay
    /// endpoint
    peer_addr: Mutex<Option<SocketAddr>>,
    deadline: Mutex<Instant>,
    /// Fired by `expire` so in-flight forwarding stops deterministically
    shutdown: Notify,
}

impl Allocation {
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer_addr.lock()
    }

    fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    fn extend(&self, lifetime: Duration) {
        *self.deadline.lock() = Instant::now() + lifetime;
    }

    fn latch_peer(&self, addr: SocketAddr) {
        let mut peer = self.peer_addr.lock();
        if *peer != Some(addr) {
            debug!("Session {} latched peer {}", self.client_addr, addr);
            *peer = Some(addr);
        }
    }
}

/// Owns every live allocation on one shared server socket.
///
/// Sessions are keyed by the client's source address, the varying part of
/// the 5-tuple on a single UDP listener. The map lock is only held for map
/// operations; socket writes happen outside it.
pub struct RelayAllocator {
    server_socket: Arc<UdpSocket>,
    public_ip: IpAddr,
    allocations: Mutex<HashMap<SocketAddr, Arc<Allocation>>>,
}

impl RelayAllocator {
    pub fn new(server_socket: Arc<UdpSocket>, public_ip: IpAddr) -> Self {
        Self {
            server_socket,
            public_ip,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live allocations (for monitoring)
    pub fn count(&self) -> usize {
        self.allocations.lock().len()
    }

    fn get(&self, client_addr: SocketAddr) -> Option<Arc<Allocation>> {
        self.allocations.lock().get(&client_addr).cloned()
    }

    /// Bind a relay endpoint for the session and start its forwarding task.
    ///
    /// Allocating an already-allocated session refreshes its lifetime and
    /// returns the existing relay address.
    pub async fn allocate(
        self: &Arc<Self>,
        client_addr: SocketAddr,
        lifetime: Duration,
    ) -> std::io::Result<SocketAddr> {
        if let Some(existing) = self.get(client_addr) {
            existing.extend(lifetime);
            return Ok(existing.relay_addr());
        }

        let relay_socket = Arc::new(UdpSocket::bind(("0.0.0.0", 0)).await?);
        let relay_addr = SocketAddr::new(self.public_ip, relay_socket.local_addr()?.port());

        let allocation = Arc::new(Allocation {
            client_addr,
            relay_addr,
            relay_socket,
            peer_addr: Mutex::new(None),
            deadline: Mutex::new(Instant::now() + lifetime),
            shutdown: Notify::new(),
        });

        {
            let mut allocations = self.allocations.lock();
            // lost an allocate race for the same session: keep the winner
            if let Some(existing) = allocations.get(&client_addr) {
                existing.extend(lifetime);
                return Ok(existing.relay_addr());
            }
            allocations.insert(client_addr, allocation.clone());
        }

        info!("Allocated relay {} for session {}", relay_addr, client_addr);

        let allocator = self.clone();
        tokio::spawn(async move {
            run_forwarding(allocator, allocation).await;
        });

        Ok(relay_addr)
    }

    /// Extend a session's lifetime. False if the session has no allocation.
    pub fn refresh(&self, client_addr: SocketAddr, lifetime: Duration) -> bool {
        match self.get(client_addr) {
            Some(allocation) => {
                allocation.extend(lifetime);
                debug!("Refreshed allocation for session {}", client_addr);
                true
            }
            None => false,
        }
    }

    /// Release a session's relay endpoint and cancel its forwarding task.
    pub fn expire(&self, client_addr: SocketAddr) -> bool {
        let removed = self.allocations.lock().remove(&client_addr);
        match removed {
            Some(allocation) => {
                allocation.shutdown.notify_one();
                info!("Released allocation for session {}", client_addr);
                true
            }
            None => false,
        }
    }

    /// Copy a datagram from the client out the session's relay endpoint to
    /// the latched peer. Dropped silently when there is no allocation or no
    /// peer has latched yet.
    pub async fn relay_from_client(&self, client_addr: SocketAddr, payload: &[u8]) -> bool {
        let Some(allocation) = self.get(client_addr) else {
            debug!("Dropping datagram from {}: no allocation", client_addr);
            return false;
        };
        let Some(peer) = allocation.peer_addr() else {
            debug!("Dropping datagram from {}: no latched peer", client_addr);
            return false;
        };

        match allocation.relay_socket.send_to(payload, peer).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Relay send for {} failed: {}", client_addr, e);
                false
            }
        }
    }
}

/// Per-allocation forwarding loop: relay endpoint -> client, with lifetime
/// expiry and explicit cancellation.
async fn run_forwarding(allocator: Arc<RelayAllocator>, allocation: Arc<Allocation>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let deadline = allocation.deadline();
        tokio::select! {
            _ = allocation.shutdown.notified() => {
                debug!("Forwarding for session {} cancelled", allocation.client_addr());
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                // a refresh may have moved the deadline while we slept
                if Instant::now() >= allocation.deadline() {
                    info!("Allocation for session {} expired", allocation.client_addr());
                    allocator.expire(allocation.client_addr());
                    break;
                }
            }
            received = allocation.relay_socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => {
                    allocation.latch_peer(from);
                    if let Err(e) = allocator
                        .server_socket
                        .send_to(&buf[..n], allocation.client_addr())
                        .await
                    {
                        debug!(
                            "Forward to client {} failed: {}",
                            allocation.client_addr(),
                            e
                        );
                    }
                }
                Err(e) => {
                    debug!("Relay socket for {} failed: {}", allocation.client_addr(), e);
                    allocator.expire(allocation.client_addr());
                    break;
                }
            },
        }
    }
}
