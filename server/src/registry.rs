//! Keyed room storage, passed explicitly into every handler.

use crate::room::Room;
use std::collections::HashMap;

/// Key of the room every connection currently lands in.
pub const DEFAULT_ROOM: &str = "main";

/// Owns one [`Room`] per key. There is no ambient global; the registry
/// lives inside the server loop and is handed to whatever needs it.
/// Rooms are fully independent of each other.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    /// Creates a registry holding the default room.
    pub fn new() -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(DEFAULT_ROOM.to_string(), Room::new());
        RoomRegistry { rooms }
    }

    pub fn room_mut(&mut self, key: &str) -> Option<&mut Room> {
        self.rooms.get_mut(key)
    }

    pub fn room(&self, key: &str) -> Option<&Room> {
        self.rooms.get(key)
    }

    /// Fetches a room, creating it on first use. Extension point for
    /// multi-room play; nothing routes clients anywhere but the default
    /// room today.
    pub fn ensure_room(&mut self, key: &str) -> &mut Room {
        self.rooms.entry(key.to_string()).or_default()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Room)> {
        self.rooms.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_room_exists() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.len(), 1);
        assert!(registry.room_mut(DEFAULT_ROOM).is_some());
        assert!(registry.room_mut("other").is_none());
    }

    #[test]
    fn test_ensure_room_creates_once() {
        let mut registry = RoomRegistry::new();
        registry.ensure_room("duel-2").join(1);
        assert_eq!(registry.len(), 2);

        // second call returns the same room, players intact
        let room = registry.ensure_room("duel-2");
        assert!(room.side_of(1).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rooms_are_independent() {
        let mut registry = RoomRegistry::new();
        registry.ensure_room("a").join(1);
        registry.ensure_room("b").join(2);

        assert!(registry.room("a").unwrap().side_of(2).is_none());
        assert!(registry.room("b").unwrap().side_of(1).is_none());
    }
}
