//! Relay server: shared UDP socket, transaction dispatch, data demux

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use beacon_core::config::RelayConfig;
use beacon_core::credential;
use beacon_core::error::RelayError;
use beacon_core::{MAX_ALLOCATION_LIFETIME_SECS, MIN_ALLOCATION_LIFETIME_SECS};

use crate::allocation::RelayAllocator;
use crate::auth::{CredentialAuthority, CredentialLookup};
use crate::proto::{self, Request, RequestFrame, Response, ResponseFrame, MAX_DATAGRAM};

/// Relay server state. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct RelayServer {
    socket: Arc<UdpSocket>,
    authority: Arc<CredentialAuthority>,
    allocator: Arc<RelayAllocator>,
    default_lifetime: Duration,
}

impl RelayServer {
    /// Bind the shared UDP socket and assemble the server.
    ///
    /// A bind failure is fatal: the caller must not go on serving
    /// signaling with the relay quietly missing.
    pub async fn bind(
        config: &RelayConfig,
        lookup: Arc<dyn CredentialLookup>,
    ) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port))
            .await
            .map_err(RelayError::Bind)?;
        let socket = Arc::new(socket);

        info!(
            "Relay server listening on udp/{}, advertising {} (realm '{}')",
            socket.local_addr().map(|a| a.port()).unwrap_or(config.port),
            config.public_ip,
            config.realm
        );

        Ok(Self {
            authority: Arc::new(CredentialAuthority::new(config.realm.clone(), lookup)),
            allocator: Arc::new(RelayAllocator::new(socket.clone(), config.public_ip)),
            socket,
            default_lifetime: Duration::from_secs(config.default_lifetime_secs),
        })
    }

    /// Address of the shared socket (the port is what clients talk to)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn allocator(&self) -> &Arc<RelayAllocator> {
        &self.allocator
    }

    /// Receive loop. Each datagram is handled in its own task so a slow
    /// session never delays the next receive.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, src) = self.socket.recv_from(&mut buf).await?;
            let datagram = buf[..n].to_vec();
            let server = self.clone();
            tokio::spawn(async move {
                server.handle_datagram(datagram, src).await;
            });
        }
    }

    async fn handle_datagram(&self, datagram: Vec<u8>, src: SocketAddr) {
        if !proto::is_control(&datagram) {
            self.allocator.relay_from_client(src, &datagram).await;
            return;
        }

        let Some(frame) = proto::decode_request(&datagram) else {
            debug!("Undecodable control frame from {}", src);
            return;
        };

        let response = self.handle_transaction(&frame, src).await;
        let reply = ResponseFrame {
            id: frame.id,
            response,
        };
        match proto::encode_response(&reply) {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, src).await {
                    debug!("Response to {} failed: {}", src, e);
                }
            }
            Err(e) => warn!("Failed to encode response for {}: {}", src, e),
        }
    }

    /// Authenticate and dispatch one transaction. Every transaction is
    /// authenticated independently; the opaque `Error` response covers all
    /// refusal causes.
    async fn handle_transaction(&self, frame: &RequestFrame, src: SocketAddr) -> Response {
        let request = &frame.request;

        let Some(key) = self
            .authority
            .authenticate(request.identity(), request.realm(), src)
        else {
            return Response::Error;
        };

        let signed = match proto::signed_bytes(&frame.id, request) {
            Ok(bytes) => bytes,
            Err(_) => return Response::Error,
        };
        if !credential::verify_tag(&key, &signed, &frame.tag) {
            debug!("Integrity check failed for transaction from {}", src);
            return Response::Error;
        }

        match request {
            Request::Allocate { lifetime_secs, .. } => {
                let lifetime = self.clamp_lifetime(*lifetime_secs);
                match self.allocator.allocate(src, lifetime).await {
                    Ok(relay_addr) => Response::Allocated {
                        relay_addr,
                        lifetime_secs: lifetime.as_secs() as u32,
                    },
                    Err(e) => {
                        warn!("Allocation for {} failed: {}", src, e);
                        Response::Error
                    }
                }
            }
            Request::Refresh { lifetime_secs, .. } => {
                let lifetime = self.clamp_lifetime(*lifetime_secs);
                if self.allocator.refresh(src, lifetime) {
                    Response::Refreshed {
                        lifetime_secs: lifetime.as_secs() as u32,
                    }
                } else {
                    Response::Error
                }
            }
            Request::Teardown { .. } => {
                if self.allocator.expire(src) {
                    Response::Closed
                } else {
                    Response::Error
                }
            }
        }
    }

    /// Requested lifetimes are clamped; zero means "server default"
    fn clamp_lifetime(&self, requested_secs: u32) -> Duration {
        if requested_secs == 0 {
            return self.default_lifetime;
        }
        let secs = u64::from(requested_secs)
            .clamp(MIN_ALLOCATION_LIFETIME_SECS, MAX_ALLOCATION_LIFETIME_SECS);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::StaticCredentials;

    async fn server() -> RelayServer {
        let config = RelayConfig {
            public_ip: "127.0.0.1".parse().unwrap(),
            port: 0,
            realm: "beacon".into(),
            credentials: Default::default(),
            default_lifetime_secs: 600,
        };
        RelayServer::bind(&config, Arc::new(StaticCredentials::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = server().await;
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_lifetime_clamping() {
        let server = server().await;

        assert_eq!(server.clamp_lifetime(0), Duration::from_secs(600));
        assert_eq!(
            server.clamp_lifetime(1),
            Duration::from_secs(MIN_ALLOCATION_LIFETIME_SECS)
        );
        assert_eq!(server.clamp_lifetime(900), Duration::from_secs(900));
        assert_eq!(
            server.clamp_lifetime(1_000_000),
            Duration::from_secs(MAX_ALLOCATION_LIFETIME_SECS)
        );
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = server().await;
        let port = first.local_addr().unwrap().port();

        let config = RelayConfig {
            public_ip: "127.0.0.1".parse().unwrap(),
            port,
            realm: "beacon".into(),
            credentials: Default::default(),
            default_lifetime_secs: 600,
        };
        let second = RelayServer::bind(&config, Arc::new(StaticCredentials::default())).await;
        assert!(matches!(second, Err(RelayError::Bind(_))));
    }
}
