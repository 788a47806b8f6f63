// src/broadcast.rs

use std::fmt;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::models::event::{RoomEvent, RoomMessage};

/// Default buffer per room. Slow subscribers that fall further behind skip ahead.
pub const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Failure reported by a message bus when it could not accept an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishError(pub String);

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish failed: {}", self.0)
    }
}

impl std::error::Error for PublishError {}

/// The narrow interface the engine uses to reach a room's subscribers.
/// Implementations must not block; delivery is best-effort.
pub trait Publisher: Send + Sync {
    fn publish(&self, room_code: &str, event: RoomEvent) -> Result<(), PublishError>;
}

/// Publishes and logs a failure instead of returning it.
/// State changes are committed before broadcasting and never rolled back.
pub fn publish_or_log(publisher: &dyn Publisher, room_code: &str, event: RoomEvent) {
    let kind = event.kind();
    match publisher.publish(room_code, event) {
        Ok(()) => tracing::trace!(room = %room_code, event = kind, "published"),
        Err(e) => tracing::warn!(room = %room_code, event = kind, "broadcast dropped: {}", e),
    }
}

/// In-process fan-out: one tokio broadcast channel per room code.
#[derive(Debug)]
pub struct RoomHub {
    rooms: DashMap<String, broadcast::Sender<RoomMessage>>,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(ROOM_CHANNEL_CAPACITY)
    }
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Registers a subscriber for every subsequent event of `room_code`.
    pub fn subscribe(&self, room_code: &str) -> broadcast::Receiver<RoomMessage> {
        self.rooms
            .entry(room_code.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, room_code: &str) -> usize {
        self.rooms
            .get(room_code)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drops the room's channel once its last subscriber is gone.
    pub fn prune(&self, room_code: &str) {
        self.rooms
            .remove_if(room_code, |_, tx| tx.receiver_count() == 0);
    }
}

impl Publisher for RoomHub {
    fn publish(&self, room_code: &str, event: RoomEvent) -> Result<(), PublishError> {
        let Some(tx) = self.rooms.get(room_code) else {
            // Nobody has subscribed to this room yet.
            return Ok(());
        };
        // A send error only means every receiver has gone away.
        let _ = tx.send(RoomMessage::new(room_code, event));
        Ok(())
    }
}
