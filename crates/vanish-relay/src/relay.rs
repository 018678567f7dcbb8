//! The signaling relay: gatekeeper and blind forwarder for room traffic
//!
//! Admission is increment-first: the participant counter in the shared store
//! is incremented atomically, then validated, and rolled back on overshoot.
//! The relay holds no lock of its own around this sequence; correctness rests
//! entirely on the store's atomic increment, so multiple relay processes can
//! share one store.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use vanish_core::crypto::{generate_connection_id, generate_room_token};
use vanish_core::{RelayConfig, RelayError, RelayMessage, TransferMetadata, MAX_ROOM_PARTICIPANTS};

use crate::room::RoomRegistry;
use crate::store::RoomCounterStore;

/// A successful admission to a room.
///
/// The connection identity is relay-assigned, random, and unrelated to any
/// persistent identity; it lives only as long as this subscription.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub room_id: String,
    pub connection_id: String,
    /// True iff this participant was the first admitted
    pub initiator: bool,
}

/// Per-process relay state shared by all connection handlers
pub struct SignalRelay {
    store: Arc<dyn RoomCounterStore>,
    rooms: RoomRegistry,
    config: RelayConfig,
}

fn room_key(room_id: &str) -> String {
    format!("room:{}", room_id)
}

fn counter_key(room_id: &str) -> String {
    format!("room:{}:count", room_id)
}

impl SignalRelay {
    pub fn new(store: Arc<dyn RoomCounterStore>, config: RelayConfig) -> Self {
        Self {
            store,
            rooms: RoomRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Create a new room and return its opaque token.
    ///
    /// The room existence key and the counter key carry independent TTLs;
    /// the counter outlives the room slightly so a decrement racing expiry
    /// never resurrects a counter without its room.
    pub fn create_room(&self) -> String {
        let token = generate_room_token();
        self.store
            .set_with_ttl(&room_key(&token), "1", self.config.room_ttl_secs);
        self.store
            .set_with_ttl(&counter_key(&token), "0", self.config.counter_ttl_secs);

        info!("Room created: {}", token);
        token
    }

    /// Admit a participant to a room.
    ///
    /// On success the `init` message has already been queued on `sender`,
    /// and `peer_ready` has been broadcast if the room just became full.
    pub fn subscribe(
        &self,
        room_id: &str,
        sender: UnboundedSender<RelayMessage>,
    ) -> Result<Subscription, RelayError> {
        if !self.store.exists(&room_key(room_id)) {
            return Err(RelayError::RoomNotFound);
        }

        // Increment-first, then validate. Checking before incrementing would
        // let two late joiners both observe count <= 2 and both get in.
        let count = self.store.increment(&counter_key(room_id));
        if count > MAX_ROOM_PARTICIPANTS {
            // Roll back or the room permanently loses an admission slot
            self.store.decrement(&counter_key(room_id));
            return Err(RelayError::RoomFull);
        }

        let connection_id = generate_connection_id();
        let initiator = count == 1;
        self.rooms.join(room_id, &connection_id, sender);

        self.rooms.send_to(
            room_id,
            &connection_id,
            RelayMessage::Init {
                connection_id: connection_id.clone(),
                initiator,
                file_sharing_enabled: self.config.file_sharing_enabled,
            },
        );

        if count == MAX_ROOM_PARTICIPANTS {
            self.rooms.broadcast(room_id, &RelayMessage::PeerReady);
        }

        debug!(
            "Connection {} joined room {} (count={}, initiator={})",
            connection_id, room_id, count, initiator
        );

        Ok(Subscription {
            room_id: room_id.to_string(),
            connection_id,
            initiator,
        })
    }

    /// Broadcast an opaque signaling payload to the subscriber's room.
    ///
    /// The payload is not interpreted; a missing payload is relayed as
    /// `data: null` so a malformed client cannot crash the relay.
    pub fn relay_signal(&self, sub: &Subscription, data: Option<serde_json::Value>) {
        self.rooms.broadcast(
            &sub.room_id,
            &RelayMessage::Signal {
                data,
                connection_id: sub.connection_id.clone(),
            },
        );
    }

    /// Remove a participant and update room lifecycle state.
    ///
    /// Safe to call for subscriptions that already left (duplicate teardown
    /// callbacks); the registry removal and the store existence re-check both
    /// degrade to a no-op.
    pub fn unsubscribe(&self, sub: &Subscription) {
        if !self.rooms.leave(&sub.room_id, &sub.connection_id) {
            return;
        }

        // The room may have been torn down since this participant joined
        if !self.store.exists(&room_key(&sub.room_id)) {
            return;
        }

        let remaining = self.store.decrement(&counter_key(&sub.room_id));

        if remaining >= 1 {
            self.rooms.broadcast(
                &sub.room_id,
                &RelayMessage::PeerLeft {
                    connection_id: sub.connection_id.clone(),
                },
            );
        }

        if self.config.destroy_on_leave {
            // Delete both keys so a half-vacated room cannot be rejoined
            // via cached links or history
            self.store
                .delete(&[&room_key(&sub.room_id), &counter_key(&sub.room_id)]);
            info!("Room destroyed on leave: {}", sub.room_id);
        }

        debug!(
            "Connection {} left room {} (remaining={})",
            sub.connection_id, sub.room_id, remaining
        );
    }

    /// Authorization gate ahead of a peer-to-peer file transfer.
    ///
    /// Returns the message for the requesting participant only; this is a
    /// server-visible circuit breaker, not a data path.
    pub fn initiate_file_transfer(&self, metadata: &TransferMetadata) -> RelayMessage {
        if !self.config.file_sharing_enabled {
            return RelayMessage::FileTransferError {
                error: "File sharing is disabled for this session".into(),
            };
        }

        if metadata.file_size > self.config.max_file_size {
            warn!(
                "Rejected transfer of {} ({} bytes over limit)",
                metadata.file_name,
                metadata.file_size - self.config.max_file_size
            );
            return RelayMessage::FileTransferError {
                error: format!(
                    "File too large: maximum size is {}",
                    vanish_core::MAX_FILE_SIZE_LABEL
                ),
            };
        }

        RelayMessage::FileTransferAuthorized
    }

    /// Number of rooms with at least one registered connection
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    /// Total registered connections (for monitoring)
    pub fn peer_count(&self) -> usize {
        self.rooms.connection_count()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn RoomCounterStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    fn relay_with(config: RelayConfig) -> SignalRelay {
        SignalRelay::new(Arc::new(MemoryStore::new()), config)
    }

    #[test]
    fn test_subscribe_unknown_room_rejects_without_mutation() {
        let relay = relay_with(RelayConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(
            relay.subscribe("nope", tx).unwrap_err(),
            RelayError::RoomNotFound
        );
        assert_eq!(relay.store().get("room:nope:count"), None);
    }

    #[test]
    fn test_first_join_is_initiator() {
        let relay = relay_with(RelayConfig::default());
        let room = relay.create_room();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = relay.subscribe(&room, tx).unwrap();
        assert!(sub.initiator);

        match rx.try_recv().unwrap() {
            RelayMessage::Init {
                connection_id,
                initiator,
                file_sharing_enabled,
            } => {
                assert_eq!(connection_id, sub.connection_id);
                assert!(initiator);
                assert!(file_sharing_enabled);
            }
            other => panic!("expected init, got {:?}", other),
        }
        // No peer_ready until the second participant arrives
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_transfer_gate_boundary() {
        let relay = relay_with(RelayConfig::default());

        let ok = relay.initiate_file_transfer(&TransferMetadata {
            file_name: "a.bin".into(),
            file_size: 25_165_824,
        });
        assert!(matches!(ok, RelayMessage::FileTransferAuthorized));

        let too_big = relay.initiate_file_transfer(&TransferMetadata {
            file_name: "b.bin".into(),
            file_size: 25_165_825,
        });
        match too_big {
            RelayMessage::FileTransferError { error } => assert!(error.contains("24 MB")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_file_transfer_gate_disabled() {
        let config = RelayConfig {
            file_sharing_enabled: false,
            ..RelayConfig::default()
        };
        let relay = relay_with(config);

        let denied = relay.initiate_file_transfer(&TransferMetadata {
            file_name: "a.bin".into(),
            file_size: 1,
        });
        assert!(matches!(denied, RelayMessage::FileTransferError { .. }));
    }
}
