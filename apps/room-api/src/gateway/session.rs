//! Per-connection gateway session state.

use std::collections::HashSet;

use crate::broker::Topic;

/// State for a single WebSocket connection, owned by its event loop.
pub struct GatewaySession {
    /// Unique session identifier (`gw_` prefixed ULID); also the member id in
    /// the user's presence session set.
    pub session_id: String,
    pub user_id: String,
    /// Rooms whose chat topic this socket follows.
    rooms: HashSet<String>,
    seq: u64,
}

impl GatewaySession {
    pub fn new(session_id: String, user_id: String) -> Self {
        Self {
            session_id,
            user_id,
            rooms: HashSet::new(),
            seq: 0,
        }
    }

    /// Next sequence number for a dispatch event.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Returns false if already subscribed.
    pub fn subscribe(&mut self, room_id: &str) -> bool {
        self.rooms.insert(room_id.to_string())
    }

    pub fn unsubscribe(&mut self, room_id: &str) -> bool {
        self.rooms.remove(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether envelopes on `topic` are forwarded to this socket. The user's
    /// own notification topic is always followed; kicks are handled apart.
    pub fn wants(&self, topic: &Topic) -> bool {
        match topic {
            Topic::ChatRoom(room_id) => self.rooms.contains(room_id),
            Topic::UserNotification(user_id) => *user_id == self.user_id,
            Topic::UserKick => false,
        }
    }
}
