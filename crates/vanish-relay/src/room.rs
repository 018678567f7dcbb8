//! Per-room broadcast registry
//!
//! Maps each room to the set of subscribed participant connections and their
//! outbound message queues. The registry carries delivery plumbing only;
//! admission capacity lives in the counter store.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use vanish_core::RelayMessage;

/// One participant's outbound queue
type Outbound = UnboundedSender<RelayMessage>;

/// A room's registered participants
struct Members {
    senders: HashMap<String, Outbound>,
}

/// Registry of active rooms and their subscribed connections
pub struct RoomRegistry {
    rooms: DashMap<String, Members>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Register a connection on a room's broadcast stream
    pub fn join(&self, room_id: &str, connection_id: &str, sender: Outbound) {
        let mut members = self.rooms.entry(room_id.to_string()).or_insert(Members {
            senders: HashMap::new(),
        });
        members
            .senders
            .insert(connection_id.to_string(), sender);
    }

    /// Remove a connection; drops the room once empty.
    /// Returns false if the connection was not registered.
    pub fn leave(&self, room_id: &str, connection_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut members) => members.senders.remove(connection_id).is_some(),
            None => return false,
        };

        if removed {
            self.rooms
                .remove_if(room_id, |_, members| members.senders.is_empty());
        }
        removed
    }

    /// Broadcast a message to every connection in a room.
    ///
    /// Dead queues (receiver task already gone) are skipped; the socket
    /// teardown path is responsible for unregistering them.
    pub fn broadcast(&self, room_id: &str, msg: &RelayMessage) {
        if let Some(members) = self.rooms.get(room_id) {
            for (connection_id, sender) in &members.senders {
                if sender.send(msg.clone()).is_err() {
                    debug!("Dropped broadcast to dead connection {}", connection_id);
                }
            }
        }
    }

    /// Send a message to a single connection in a room
    pub fn send_to(&self, room_id: &str, connection_id: &str, msg: RelayMessage) {
        if let Some(members) = self.rooms.get(room_id) {
            if let Some(sender) = members.senders.get(connection_id) {
                let _ = sender.send(msg);
            }
        }
    }

    /// Number of connections registered in a room
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|m| m.senders.len())
            .unwrap_or(0)
    }

    /// Number of active rooms (for monitoring)
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total registered connections (for monitoring)
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|m| m.senders.len()).sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
