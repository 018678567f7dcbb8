//! Per-participant session state machine
//!
//! Drives peer connection establishment from the relay's message stream.
//! Whether this endpoint creates the offer is decided by the relay (the
//! first participant admitted is the initiator); the machine itself derives
//! everything else from the messages it is fed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use vanish_core::{ClientMessage, RelayMessage};

use crate::transport::{PeerTransport, TransportEvent};

/// Connection establishment states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `init` (or, as initiator, for `peer_ready`)
    New,
    /// Responder waiting for the remote offer
    AwaitingOffer,
    /// Initiator has emitted its offer
    HasLocalOffer,
    /// Remote description applied; ICE completion pending
    HaveRemoteDescription,
    /// Peer connection established; channels usable
    Connected,
    /// Terminal. All session state has been scrubbed.
    Closed,
}

/// Signaling payload exchanged between the two peers through the relay.
///
/// Opaque to the relay; each message is self-describing so the protocol
/// tolerates cross-sender reordering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerSignal {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: serde_json::Value },
}

/// Events surfaced to the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Peer connection established (emitted at most once)
    Connected,
    /// Session ended; all state scrubbed, sending disabled
    Closed,
    /// Relay authorized the requested file transfer
    TransferAuthorized,
    /// Relay rejected the requested file transfer
    TransferDenied(String),
}

/// The session state machine for one participant
pub struct PeerSession<T: PeerTransport> {
    transport: Arc<T>,
    state: SessionState,
    connection_id: Option<String>,
    initiator: bool,
    file_sharing_enabled: bool,
    outbound: UnboundedSender<ClientMessage>,
    events: UnboundedSender<SessionEvent>,
}

impl<T: PeerTransport> PeerSession<T> {
    /// Create a session over an established relay subscription.
    ///
    /// `outbound` feeds the relay socket; `events` feeds the application.
    pub fn new(
        transport: Arc<T>,
        outbound: UnboundedSender<ClientMessage>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            state: SessionState::New,
            connection_id: None,
            initiator: false,
            file_sharing_enabled: false,
            outbound,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn file_sharing_enabled(&self) -> bool {
        self.file_sharing_enabled
    }

    /// Feed one message from the relay stream into the machine
    pub async fn handle_relay_message(&mut self, msg: RelayMessage) {
        if self.state == SessionState::Closed {
            return;
        }

        match msg {
            RelayMessage::Init {
                connection_id,
                initiator,
                file_sharing_enabled,
            } => {
                self.connection_id = Some(connection_id);
                self.initiator = initiator;
                self.file_sharing_enabled = file_sharing_enabled;
                // The initiator holds its offer until peer_ready so it never
                // races a not-yet-subscribed responder
                self.state = if initiator {
                    SessionState::New
                } else {
                    SessionState::AwaitingOffer
                };
            }

            RelayMessage::PeerReady => {
                if self.initiator && self.state == SessionState::New {
                    self.create_and_send_offer().await;
                }
            }

            RelayMessage::Signal {
                data,
                connection_id,
            } => {
                // Broadcasts include the origin; self-filter by connection id
                if Some(connection_id.as_str()) == self.connection_id() {
                    return;
                }
                let signal = match data.and_then(|d| serde_json::from_value::<PeerSignal>(d).ok())
                {
                    Some(s) => s,
                    None => {
                        debug!("Ignoring malformed signal payload");
                        return;
                    }
                };
                self.handle_peer_signal(signal).await;
            }

            RelayMessage::PeerLeft { connection_id } => {
                // A self-originated notification must not close the session
                if Some(connection_id.as_str()) == self.connection_id() {
                    return;
                }
                debug!("Peer left, closing session");
                self.close().await;
            }

            RelayMessage::FileTransferAuthorized => {
                let _ = self.events.send(SessionEvent::TransferAuthorized);
            }

            RelayMessage::FileTransferError { error } => {
                let _ = self.events.send(SessionEvent::TransferDenied(error));
            }

            RelayMessage::Error { code, message } => {
                warn!("Relay error {:?}: {}", code, message);
            }
        }
    }

    /// Feed one transport-level event into the machine
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                // Idempotent: a duplicate connected notification must not
                // re-run connection-established side effects
                if self.state != SessionState::Connected && self.state != SessionState::Closed {
                    self.state = SessionState::Connected;
                    let _ = self.events.send(SessionEvent::Connected);
                }
            }
            TransportEvent::Failed | TransportEvent::Closed => {
                self.close().await;
            }
        }
    }

    async fn handle_peer_signal(&mut self, signal: PeerSignal) {
        match signal {
            PeerSignal::Offer { sdp } => {
                if self.initiator {
                    debug!("Initiator ignoring unexpected offer");
                    return;
                }
                if let Err(e) = self.transport.set_remote_offer(&sdp).await {
                    warn!("Failed to apply remote offer: {}", e);
                    return;
                }
                match self.transport.create_answer().await {
                    Ok(answer) => {
                        self.send_signal(PeerSignal::Answer { sdp: answer });
                        self.state = SessionState::HaveRemoteDescription;
                    }
                    Err(e) => warn!("Failed to create answer: {}", e),
                }
            }

            PeerSignal::Answer { sdp } => {
                if !self.initiator {
                    debug!("Responder ignoring unexpected answer");
                    return;
                }
                match self.transport.set_remote_answer(&sdp).await {
                    Ok(()) => self.state = SessionState::HaveRemoteDescription,
                    Err(e) => warn!("Failed to apply remote answer: {}", e),
                }
            }

            PeerSignal::Candidate { candidate } => {
                // Candidates may arrive before or after description exchange;
                // failures here are logged and swallowed, never surfaced
                if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                    debug!("Dropped ICE candidate: {}", e);
                }
            }
        }
    }

    async fn create_and_send_offer(&mut self) {
        match self.transport.create_offer().await {
            Ok(sdp) => {
                self.send_signal(PeerSignal::Offer { sdp });
                self.state = SessionState::HasLocalOffer;
            }
            Err(e) => warn!("Failed to create offer: {}", e),
        }
    }

    fn send_signal(&self, signal: PeerSignal) {
        let data = match serde_json::to_value(&signal) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Failed to encode signal: {}", e);
                return;
            }
        };
        let _ = self.outbound.send(ClientMessage::SendSignal { data });
    }

    /// Terminal transition: scrub all session state, disable further
    /// sending, and unsubscribe from the relay.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.connection_id = None;
        self.file_sharing_enabled = false;
        self.transport.close().await;
        let _ = self.outbound.send(ClientMessage::Unsubscribe);
        let _ = self.events.send(SessionEvent::Closed);
    }
}
