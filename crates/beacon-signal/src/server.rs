//! WebSocket signaling transport
//!
//! One task per connection; each connection owns a reader loop and a
//! writer task fed by an unbounded channel. The writer bounds every socket
//! send with a timeout so a stalled peer is abandoned instead of wedging
//! roster pushes or deliveries queued behind it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::hub::SignalingHub;
use crate::messages::Frame;
use crate::registry::PeerHandle;
use crate::{MAX_PEER_ID_LEN, SEND_TIMEOUT_SECS, SIGNAL_PATH};

/// Signaling server state
pub struct SignalServer {
    hub: Arc<SignalingHub>,
}

impl SignalServer {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(SignalingHub::new()),
        }
    }

    pub fn hub(&self) -> &Arc<SignalingHub> {
        &self.hub
    }

    /// Bind and serve forever
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener (lets tests bind port 0)
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let hub = self.hub.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, hub).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<SignalingHub>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the request to tell a plain HTTP GET (health checks) from a
    // WebSocket upgrade, which is also a GET but carries an Upgrade header
    let mut peek_buf = [0u8; 1024];
    let n = stream.peek(&mut peek_buf).await?;
    let head = String::from_utf8_lossy(&peek_buf[..n]);

    if head.starts_with("GET ")
        && head.contains("\r\n\r\n")
        && !head.to_ascii_lowercase().contains("websocket")
    {
        return handle_http_request(&mut stream, hub.peer_count()).await;
    }

    // Reject upgrades outside the fixed path; accept an optional
    // client-presented id via ?peer=<id>
    let mut requested_id: Option<String> = None;
    let callback = |req: &Request, resp: Response| {
        if req.uri().path() != SIGNAL_PATH {
            let mut not_found = ErrorResponse::new(Some("not found".to_string()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            return Err(not_found);
        }
        requested_id = req
            .uri()
            .query()
            .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("peer=")))
            .map(|id| id.to_string());
        Ok(resp)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let peer_id = match requested_id.filter(|id| valid_peer_id(id)) {
        Some(id) => id,
        None => generate_peer_id(),
    };
    debug!("New connection from {} as {}", peer_addr, peer_id);

    // All outbound traffic goes through this channel; sends into it never
    // block, and the writer task is the only place socket I/O happens
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let handle = PeerHandle::new(tx.clone());

    let writer_id = peer_id.clone();
    let writer = tokio::spawn(async move {
        run_writer(rx, ws_sender, &writer_id).await;
    });

    // Tell the peer which id it got, then join the roster
    handle.send_frame(&Frame::session(&peer_id));
    hub.connect(&peer_id, handle.clone());

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // errors are logged inside; the sender gets no NACK
                let _ = hub.handle_frame(&peer_id, &text);
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Message::Pong(data));
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error from {}: {:?}", peer_id, e);
                break;
            }
        }
    }

    // Cleanup on disconnect; a stale connection cannot evict the entry of
    // a reconnect that replaced it
    hub.disconnect(&peer_id, &handle);
    writer.abort();

    debug!("Connection closed: {}", peer_id);
    Ok(())
}

/// Drain a peer's outbound channel into its socket sink.
///
/// Each send is bounded by a timeout; a peer that stops draining its
/// socket is abandoned so roster pushes and deliveries queued behind it
/// keep flowing to everyone else.
async fn run_writer<S>(mut rx: mpsc::UnboundedReceiver<Message>, mut sink: S, id: &str)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let send_timeout = Duration::from_secs(SEND_TIMEOUT_SECS);
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        match tokio::time::timeout(send_timeout, sink.send(msg)).await {
            Ok(Ok(())) => {
                if closing {
                    break;
                }
            }
            Ok(Err(e)) => {
                debug!("Send to {} failed: {}", id, e);
                break;
            }
            Err(_) => {
                warn!("Send to {} timed out, abandoning connection", id);
                break;
            }
        }
    }
}

/// Handle an HTTP request (for health checks)
async fn handle_http_request(
    stream: &mut TcpStream,
    peer_count: usize,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Read the HTTP request
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    // Parse the request path
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, body) = match path {
        "/health" => (
            "200 OK",
            format!(r#"{{"status":"healthy","peers":{}}}"#, peer_count),
        ),
        "/stats" => ("200 OK", format!(r#"{{"peers":{}}}"#, peer_count)),
        _ => ("404 Not Found", r#"{"error":"not found"}"#.to_string()),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Generate a unique peer ID
fn generate_peer_id() -> String {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("RNG failed");
    hex::encode(bytes)
}

/// Client-presented ids are kept short and URL/JSON-safe
fn valid_peer_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PEER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
