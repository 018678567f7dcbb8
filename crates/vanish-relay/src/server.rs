//! WebSocket front end for the relay
//!
//! One spawned task per accepted socket. Each connection owns an unbounded
//! outbound queue registered on the room broadcast stream; the task multiplexes
//! that queue with inbound client messages over a single select loop, so a
//! panic-free handler failure tears down exactly one participant.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info};

use vanish_core::{ClientMessage, ErrorCode, RelayError, RelayMessage};

use crate::relay::{SignalRelay, Subscription};

/// Relay server: accept loop plus per-connection handlers
pub struct RelayServer {
    relay: Arc<SignalRelay>,
}

impl RelayServer {
    pub fn new(relay: SignalRelay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }

    /// Start serving on the given address
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", addr);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let relay = self.relay.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, relay).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }

    /// Shared relay state (for tests and embedding)
    pub fn relay(&self) -> &Arc<SignalRelay> {
        &self.relay
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<SignalRelay>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the first bytes to detect HTTP vs WebSocket
    let mut peek_buf = [0u8; 4];
    stream.peek(&mut peek_buf).await?;

    if &peek_buf == b"GET " {
        return handle_http_request(&mut stream, &relay).await;
    }

    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    debug!("New signaling connection from {}", peer_addr);

    // Outbound queue shared with the room broadcast registry
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayMessage>();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        let json = match msg.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                debug!("Failed to encode relay message: {}", e);
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_receiver.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {:?}", e);
                        break;
                    }
                };

                let request = match ClientMessage::from_json(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = tx.send(RelayMessage::error(
                            ErrorCode::InvalidMessage,
                            format!("Invalid JSON: {}", e),
                        ));
                        continue;
                    }
                };

                handle_client_message(request, &relay, &tx, &mut subscription);
            }
        }
    }

    // Cleanup on disconnect (implicit unsubscribe)
    if let Some(sub) = subscription {
        relay.unsubscribe(&sub);
    }

    debug!("Signaling connection closed: {}", peer_addr);
    Ok(())
}

/// Dispatch one parsed client message.
///
/// Every branch degrades invalid input to an error message on the outbound
/// queue; nothing here may panic past the relay boundary.
fn handle_client_message(
    msg: ClientMessage,
    relay: &SignalRelay,
    tx: &UnboundedSender<RelayMessage>,
    subscription: &mut Option<Subscription>,
) {
    match msg {
        ClientMessage::Subscribe { room_id } => {
            if subscription.is_some() {
                let _ = tx.send(RelayMessage::error(
                    ErrorCode::AlreadySubscribed,
                    "Already subscribed to a room",
                ));
                return;
            }

            match relay.subscribe(&room_id, tx.clone()) {
                Ok(sub) => *subscription = Some(sub),
                Err(RelayError::RoomNotFound) => {
                    let _ = tx.send(RelayMessage::error(
                        ErrorCode::RoomNotFound,
                        "Room unavailable",
                    ));
                }
                Err(RelayError::RoomFull) => {
                    let _ = tx.send(RelayMessage::error(ErrorCode::RoomFull, "Room is full"));
                }
            }
        }

        ClientMessage::SendSignal { data } => match subscription {
            Some(sub) => relay.relay_signal(sub, data),
            None => {
                let _ = tx.send(RelayMessage::error(
                    ErrorCode::NotSubscribed,
                    "Subscribe to a room first",
                ));
            }
        },

        ClientMessage::InitiateFileTransfer { metadata } => match subscription {
            Some(_) => {
                // Requester only, never broadcast
                let _ = tx.send(relay.initiate_file_transfer(&metadata));
            }
            None => {
                let _ = tx.send(RelayMessage::error(
                    ErrorCode::NotSubscribed,
                    "Subscribe to a room first",
                ));
            }
        },

        ClientMessage::Unsubscribe => {
            if let Some(sub) = subscription.take() {
                relay.unsubscribe(&sub);
            }
        }
    }
}

/// Handle an HTTP request (health checks and room creation)
async fn handle_http_request(
    stream: &mut TcpStream,
    relay: &SignalRelay,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, body) = match path {
        "/health" => (
            "200 OK",
            format!(
                r#"{{"status":"healthy","rooms":{},"peers":{}}}"#,
                relay.room_count(),
                relay.peer_count()
            ),
        ),
        "/stats" => (
            "200 OK",
            format!(
                r#"{{"rooms":{},"peers":{}}}"#,
                relay.room_count(),
                relay.peer_count()
            ),
        ),
        "/room/new" => {
            let token = relay.create_room();
            let body = serde_json::json!({
                "roomId": token,
                "iceServers": relay.config().ice_servers,
            });
            ("200 OK", body.to_string())
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use vanish_core::RelayConfig;

    fn test_relay() -> Arc<SignalRelay> {
        Arc::new(SignalRelay::new(
            Arc::new(MemoryStore::new()),
            RelayConfig::default(),
        ))
    }

    #[test]
    fn test_send_signal_before_subscribe_rejected() {
        let relay = test_relay();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscription = None;

        handle_client_message(
            ClientMessage::SendSignal { data: None },
            &relay,
            &tx,
            &mut subscription,
        );

        match rx.try_recv().unwrap() {
            RelayMessage::Error { code, .. } => assert_eq!(code, ErrorCode::NotSubscribed),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let relay = test_relay();
        let room = relay.create_room();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscription = None;

        handle_client_message(
            ClientMessage::Subscribe {
                room_id: room.clone(),
            },
            &relay,
            &tx,
            &mut subscription,
        );
        assert!(subscription.is_some());
        assert!(matches!(
            rx.try_recv().unwrap(),
            RelayMessage::Init { .. }
        ));

        handle_client_message(
            ClientMessage::Subscribe { room_id: room },
            &relay,
            &tx,
            &mut subscription,
        );
        match rx.try_recv().unwrap() {
            RelayMessage::Error { code, .. } => assert_eq!(code, ErrorCode::AlreadySubscribed),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsubscribe_without_subscription_is_noop() {
        let relay = test_relay();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscription = None;

        handle_client_message(ClientMessage::Unsubscribe, &relay, &tx, &mut subscription);
        assert!(rx.try_recv().is_err());
    }
}
