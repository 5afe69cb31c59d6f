//! End-to-end signaling tests over real WebSocket connections

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use beacon_signal::messages::Frame;
use beacon_signal::SignalServer;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = SignalServer::new();
    tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });
    addr
}

async fn connect(addr: SocketAddr, id: &str) -> Client {
    let url = format!("ws://{}/ws?peer={}", addr, id);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Read frames until the next text frame, failing after WAIT
async fn next_frame(client: &mut Client) -> Frame {
    loop {
        let msg = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return Frame::from_json(&text).unwrap();
        }
    }
}

/// Read frames until a roster push matching `expected` (order-independent)
async fn wait_for_roster(client: &mut Client, expected: &[&str]) {
    let mut want: Vec<&str> = expected.to_vec();
    want.sort();
    loop {
        let frame = next_frame(client).await;
        if frame.event == "update_users" {
            let mut got: Vec<String> = serde_json::from_value(frame.data).unwrap();
            got.sort();
            if got == want {
                return;
            }
        }
    }
}

/// Assert the client receives nothing for a short window
async fn expect_silence(client: &mut Client) {
    let res = tokio::time::timeout(QUIET, client.next()).await;
    assert!(res.is_err(), "expected no frame, got {:?}", res);
}

#[tokio::test]
async fn test_session_frame_announces_id() {
    let addr = start_server().await;
    let mut a = connect(addr, "A").await;

    let frame = next_frame(&mut a).await;
    assert_eq!(frame.event, "session");
    assert_eq!(frame.data, json!({ "id": "A" }));
}

#[tokio::test]
async fn test_call_scenario() {
    let addr = start_server().await;

    // A and B connect; both end up with roster {A, B}
    let mut a = connect(addr, "A").await;
    wait_for_roster(&mut a, &["A"]).await;

    let mut b = connect(addr, "B").await;
    wait_for_roster(&mut b, &["A", "B"]).await;
    wait_for_roster(&mut a, &["A", "B"]).await;

    // A sends an offer to B; B receives it verbatim
    let offer = json!({ "event": "offer", "data": { "target": "B", "sdp": "x" } });
    a.send(Message::Text(offer.to_string())).await.unwrap();

    let frame = next_frame(&mut b).await;
    assert_eq!(frame.event, "offer");
    assert_eq!(frame.data["sdp"], json!("x"));
    assert_eq!(frame.data["target"], json!("B"));

    // An offer to an unknown peer vanishes: no delivery, no error to A
    let missing = json!({ "event": "offer", "data": { "target": "C", "sdp": "y" } });
    a.send(Message::Text(missing.to_string())).await.unwrap();
    expect_silence(&mut a).await;
    expect_silence(&mut b).await;

    // B disconnects; A sees the roster shrink
    b.close(None).await.unwrap();
    wait_for_roster(&mut a, &["A"]).await;
}

#[tokio::test]
async fn test_start_call_stamps_sender() {
    let addr = start_server().await;

    let mut a = connect(addr, "A").await;
    wait_for_roster(&mut a, &["A"]).await;
    let mut b = connect(addr, "B").await;
    wait_for_roster(&mut b, &["A", "B"]).await;

    // A lies about its identity; the hub overwrites it
    let call = json!({
        "event": "start_call",
        "data": { "target": "B", "from": "mallory" }
    });
    a.send(Message::Text(call.to_string())).await.unwrap();

    let frame = next_frame(&mut b).await;
    assert_eq!(frame.event, "called");
    assert_eq!(frame.data["from"], json!("A"));
}

#[tokio::test]
async fn test_ice_candidate_passes_through_opaque() {
    let addr = start_server().await;

    let mut a = connect(addr, "A").await;
    wait_for_roster(&mut a, &["A"]).await;
    let mut b = connect(addr, "B").await;
    wait_for_roster(&mut b, &["A", "B"]).await;

    let candidate = json!({
        "event": "ice_candidate",
        "data": {
            "target": "B",
            "candidate": { "candidate": "candidate:0 1 UDP ...", "sdpMid": "0", "sdpMLineIndex": 0 }
        }
    });
    a.send(Message::Text(candidate.to_string())).await.unwrap();

    let frame = next_frame(&mut b).await;
    assert_eq!(frame.event, "ice_candidate");
    assert_eq!(frame.data["candidate"]["sdpMid"], json!("0"));
    assert_eq!(frame.data["candidate"]["sdpMLineIndex"], json!(0));
}

#[tokio::test]
async fn test_reconnect_same_id_new_connection_wins() {
    let addr = start_server().await;

    let mut stale = connect(addr, "A").await;
    wait_for_roster(&mut stale, &["A"]).await;

    let mut fresh = connect(addr, "A").await;
    wait_for_roster(&mut fresh, &["A"]).await;

    // the stale socket is closed by the server
    let end = tokio::time::timeout(WAIT, async {
        loop {
            match stale.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stale connection was not closed");

    // the replacement is routable
    let mut b = connect(addr, "B").await;
    wait_for_roster(&mut b, &["A", "B"]).await;
    let offer = json!({ "event": "offer", "data": { "target": "A", "sdp": "hello" } });
    b.send(Message::Text(offer.to_string())).await.unwrap();

    let frame = next_frame(&mut fresh).await;
    assert_eq!(frame.event, "offer");
    assert_eq!(frame.data["sdp"], json!("hello"));
}

#[tokio::test]
async fn test_malformed_payload_keeps_connection_open() {
    let addr = start_server().await;

    let mut a = connect(addr, "A").await;
    wait_for_roster(&mut a, &["A"]).await;

    a.send(Message::Text("{{{ not json".to_string())).await.unwrap();
    a.send(Message::Text(json!({ "event": "nope", "data": {} }).to_string()))
        .await
        .unwrap();
    expect_silence(&mut a).await;

    // still connected: a second peer joining reaches us
    let mut b = connect(addr, "B").await;
    wait_for_roster(&mut b, &["A", "B"]).await;
    wait_for_roster(&mut a, &["A", "B"]).await;
}

#[tokio::test]
async fn test_health_endpoint() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = start_server().await;

    let mut a = connect(addr, "A").await;
    wait_for_roster(&mut a, &["A"]).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#""status":"healthy""#));
    assert!(response.contains(r#""peers":1"#));
}

#[tokio::test]
async fn test_wrong_path_is_rejected() {
    let addr = start_server().await;
    let result = connect_async(format!("ws://{}/other", addr)).await;
    assert!(result.is_err());
}
