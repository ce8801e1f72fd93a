//! Integration tests for timer-broker
//!
//! These tests drive the real transport adapter end to end: a server is
//! bound to an ephemeral loopback port via [`timer_broker::build_router`],
//! and each test connects one or more real WebSocket clients against it
//! with `tokio-tungstenite`, rather than calling `Broker::dispatch`
//! directly the way the in-module unit tests do.
//!
//! Architecture:
//! - `spawn_server` binds `127.0.0.1:0`, serves the shared router on a
//!   background task, and hands back the bound address.
//! - Each test owns its own server instance (no shared state between tests).
//! - `recv_json` applies a generous timeout so a protocol regression fails
//!   the test instead of hanging the suite.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use timer_broker::{build_router, Broker, Config};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds the shared router to an ephemeral loopback port and serves it on a
/// background task for the lifetime of the test process.
async fn spawn_server() -> SocketAddr {
    let broker = Arc::new(Broker::new(Config::default()));
    let app = build_router(broker);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener has a local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server loop failed");
    });

    addr
}

async fn connect_client(addr: SocketAddr) -> Client {
    let url = format!("ws://{addr}/ws");
    let (stream, _response) = connect_async(&url).await.expect("websocket handshake");
    stream
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// Waits up to [`RECV_TIMEOUT`] for the next text frame, decoded as JSON.
async fn recv_json(client: &mut Client) -> Value {
    let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended unexpectedly")
        .expect("transport error");

    match frame {
        Message::Text(text) => serde_json::from_str::<Value>(&text).expect("frame is valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

fn join_message(session_id: &str, client_id: &str, name: &str) -> Value {
    json!({
        "type": "session_join",
        "sessionId": session_id,
        "session": {"name": "Focus", "description": "", "intervals": {"items": []}},
        "timer": {},
        "user": {"clientId": client_id, "name": name, "avatarUrl": ""},
    })
}

#[tokio::test]
async fn test_session_join_round_trip_over_real_websocket() {
    let addr = spawn_server().await;
    let mut client = connect_client(addr).await;

    send_json(
        &mut client,
        join_message("team-standup", "11111111-1111-4111-8111-111111111111", "Ada"),
    )
    .await;

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "session_created");
    assert_eq!(reply["sessionId"], "team-standup");
}

#[tokio::test]
async fn test_ping_pong_over_real_websocket() {
    let addr = spawn_server().await;
    let mut client = connect_client(addr).await;

    send_json(&mut client, json!({"type": "ping"})).await;

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

/// Mirrors the spec's end-to-end broker scenario: two sockets of two
/// different clients join the same session, and a `timer_update` from one
/// reaches only the other, over the real transport rather than a direct
/// `Broker::dispatch` call.
#[tokio::test]
async fn test_timer_update_excludes_sender_over_real_sockets() {
    let addr = spawn_server().await;
    let mut client_a = connect_client(addr).await;
    let mut client_b = connect_client(addr).await;

    send_json(
        &mut client_a,
        join_message("room", "11111111-1111-4111-8111-111111111111", "Ada"),
    )
    .await;
    recv_json(&mut client_a).await; // session_created

    send_json(
        &mut client_b,
        join_message("room", "22222222-2222-4222-8222-222222222222", "Bea"),
    )
    .await;
    recv_json(&mut client_b).await; // session_joined
    recv_json(&mut client_a).await; // user_connected, fanned out to Ada

    send_json(
        &mut client_a,
        json!({
            "type": "timer_update",
            "timer": {"repeat": false, "interval": 0, "remaining": 60_000, "isRunning": true, "isPaused": false},
        }),
    )
    .await;

    let reply_b = recv_json(&mut client_b).await;
    assert_eq!(reply_b["type"], "timer_updated");
    assert_eq!(reply_b["timer"]["remaining"], 60_000);

    // The sender gets nothing back for its own update; a ping/pong round
    // trip proves the connection is still alive and simply has no frame
    // queued rather than having silently died.
    send_json(&mut client_a, json!({"type": "ping"})).await;
    let reply_a = recv_json(&mut client_a).await;
    assert_eq!(reply_a["type"], "pong");
}

#[tokio::test]
async fn test_unknown_message_type_gets_error_reply_over_real_socket() {
    let addr = spawn_server().await;
    let mut client = connect_client(addr).await;

    send_json(&mut client, json!({"type": "frobnicate"})).await;

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "Unknown message type");
}

/// Closing a socket is the transport-level trigger for `Broker::remove_client`
/// (§4.4's last-socket-drops path): the peer still in the room should see the
/// departing user flip to offline via `user_updated`.
#[tokio::test]
async fn test_closing_a_socket_marks_its_user_offline_for_the_peer() {
    let addr = spawn_server().await;
    let mut client_a = connect_client(addr).await;
    let mut client_b = connect_client(addr).await;

    send_json(
        &mut client_a,
        join_message("room", "11111111-1111-4111-8111-111111111111", "Ada"),
    )
    .await;
    recv_json(&mut client_a).await; // session_created

    send_json(
        &mut client_b,
        join_message("room", "22222222-2222-4222-8222-222222222222", "Bea"),
    )
    .await;
    recv_json(&mut client_b).await; // session_joined
    recv_json(&mut client_a).await; // user_connected

    client_a
        .send(Message::Close(None))
        .await
        .expect("send close frame");

    let reply_b = recv_json(&mut client_b).await;
    assert_eq!(reply_b["type"], "user_updated");
    assert_eq!(reply_b["user"]["isOnline"], false);
}

/// The public lookup route rides the same router as the WebSocket upgrade,
/// so it's worth a quick smoke test of the real HTTP surface alongside the
/// WebSocket scenarios above.
#[tokio::test]
async fn test_public_lookup_route_returns_not_found_before_any_join() {
    let addr = spawn_server().await;
    let url = format!("http://{addr}/api/session/never-created");

    let response = raw_http_get(&url).await;
    assert_eq!(response, 404);
}

/// Minimal one-shot HTTP GET over a raw TCP connection, just enough to read
/// a status line — avoids pulling in an HTTP client crate for one assertion.
async fn raw_http_get(url: &str) -> u16 {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let without_scheme = url.trim_start_matches("http://");
    let (authority, path) = without_scheme.split_once('/').expect("url has a path");
    let mut stream = tokio::net::TcpStream::connect(authority).await.expect("connect");
    let request = format!("GET /{path} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut response = Vec::new();
    tokio::time::timeout(RECV_TIMEOUT, stream.read_to_end(&mut response))
        .await
        .expect("timed out waiting for the HTTP response")
        .expect("read response");
    let text = String::from_utf8_lossy(&response);
    let status_line = text.lines().next().expect("response has a status line");
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line has a numeric code")
}
