//! WebSocket transport adapter.
//!
//! Bridges one `axum` WebSocket connection to the broker: frames read off
//! the socket are handed to [`Broker::dispatch`], and anything the broker
//! wants to push out (broadcasts, replies, liveness pings) flows back
//! through an `mpsc` channel drained by a dedicated writer task, so a slow
//! reader never blocks the broker's broadcast loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::constants::SOCKET_TIMEOUT;

use super::{Broker, ConnState};

/// Route handler: upgrades an HTTP request to a WebSocket and hands the
/// resulting socket off to [`handle_socket`].
pub async fn ws_handler(State(broker): State<Arc<Broker>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, broker))
}

/// Drives one connection end to end: registers its outbound channel, reads
/// frames until the socket closes or goes quiet past [`SOCKET_TIMEOUT`], and
/// always deregisters with the broker on the way out.
async fn handle_socket(socket: WebSocket, broker: Arc<Broker>) {
    let socket_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    broker.register_socket(socket_id.clone(), tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut conn = ConnState::new(socket_id);
    let mut probe_tick = tokio::time::interval(SOCKET_TIMEOUT);
    probe_tick.tick().await; // first tick fires immediately, skip it
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        awaiting_pong = false;
                        broker.dispatch(&mut conn, &text).await;
                    }
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        // Binary frames carry no message in this protocol; ignored.
                    }
                    Some(Err(_)) => break,
                }
            }
            _ = probe_tick.tick() => {
                if awaiting_pong {
                    // No response to the previous liveness probe; the peer is gone.
                    break;
                }
                awaiting_pong = true;
                if broker.send_raw(&conn.socket_id, Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
        }
    }

    broker.remove_client(&conn).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_interval_matches_socket_timeout() {
        // One unanswered probe cycle is exactly SOCKET_TIMEOUT, per §4.5.
        assert_eq!(SOCKET_TIMEOUT.as_secs(), 30);
    }
}
