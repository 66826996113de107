//! Connection bookkeeping and outbound message fan-out.
//!
//! Each live WebSocket gets a server-assigned id, a room key, and an
//! unbounded channel drained by that connection's writer task. All room
//! mutation happens elsewhere; this module only knows who is connected,
//! where, and how to reach them.

use log::{debug, error, info};
use shared::ServerEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A connected client and the channel its writer task drains.
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server.
    pub id: u32,
    /// Network address, for log correlation only.
    pub addr: SocketAddr,
    /// Key of the room this connection is subscribed to.
    pub room: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl Client {
    fn new(id: u32, addr: SocketAddr, room: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Client {
            id,
            addr,
            room,
            sender,
        }
    }

    /// Queues a pre-encoded frame. A failed send means the writer task is
    /// gone; the disconnect notification is already on its way, so the
    /// frame is just dropped.
    fn send_text(&self, json: String) {
        if self.sender.send(Message::Text(json)).is_err() {
            debug!("client {}: writer gone, dropping frame", self.id);
        }
    }
}

/// Tracks all connected clients, enforces the connection cap, and routes
/// unicast and room-broadcast events onto per-client channels.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID.
    clients: HashMap<u32, Client>,
    /// Reverse index for associating socket events with clients.
    by_addr: HashMap<SocketAddr, u32>,
    /// Next available client ID for new connections.
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed.
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty roster with the given capacity limit. Client IDs
    /// start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        ClientManager {
            clients: HashMap::new(),
            by_addr: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a new connection into a room.
    ///
    /// Returns the assigned client id, or None when the server is at
    /// capacity — in that case a close frame is queued so the peer's
    /// socket shuts down cleanly.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        room: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            let _ = sender.send(Message::Close(None));
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, room.to_string(), sender));
        self.by_addr.insert(addr, client_id);
        Some(client_id)
    }

    /// Removes a client, returning its record so the caller can clean up
    /// the room it belonged to.
    pub fn remove_client(&mut self, addr: &SocketAddr) -> Option<Client> {
        let client_id = self.by_addr.remove(addr)?;
        let client = self.clients.remove(&client_id);
        if let Some(client) = &client {
            info!("client {} disconnected", client.id);
        }
        client
    }

    /// Finds a client ID by network address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).copied()
    }

    /// Room key a client is subscribed to.
    pub fn room_of(&self, client_id: u32) -> Option<&str> {
        self.clients.get(&client_id).map(|c| c.room.as_str())
    }

    /// Unicasts an event to one client.
    pub fn send_to(&self, client_id: u32, event: &ServerEvent) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };
        match serde_json::to_string(event) {
            Ok(json) => client.send_text(json),
            Err(e) => error!("failed to encode event: {}", e),
        }
    }

    /// Broadcasts an event to every connection subscribed to a room.
    /// The event is encoded once and the text shared across sends.
    pub fn broadcast_room(&self, room: &str, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to encode event: {}", e);
                return;
            }
        };

        for client in self.clients.values() {
            if client.room == room {
                client.send_text(json.clone());
            }
        }
    }

    /// Returns the number of currently connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Side;

    fn test_addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn channel() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_ids_are_sequential_and_addressable() {
        let mut manager = ClientManager::new(8);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let id1 = manager.add_client(test_addr(1000), "main", tx1).unwrap();
        let id2 = manager.add_client(test_addr(1001), "main", tx2).unwrap();

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(manager.find_client_by_addr(test_addr(1001)), Some(2));
        assert_eq!(manager.find_client_by_addr(test_addr(9999)), None);
        assert_eq!(manager.room_of(id1), Some("main"));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_capacity_queues_close_frame() {
        let mut manager = ClientManager::new(1);
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();

        assert!(manager.add_client(test_addr(1000), "main", tx1).is_some());
        assert!(manager.add_client(test_addr(1001), "main", tx2).is_none());

        match rx2.try_recv() {
            Ok(Message::Close(_)) => {}
            other => panic!("expected close frame, got {:?}", other),
        }
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_returns_record() {
        let mut manager = ClientManager::new(8);
        let (tx, _rx) = channel();
        let addr = test_addr(1000);
        let id = manager.add_client(addr, "main", tx).unwrap();

        let client = manager.remove_client(&addr).unwrap();
        assert_eq!(client.id, id);
        assert_eq!(client.room, "main");
        assert!(manager.is_empty());
        assert!(manager.remove_client(&addr).is_none());
    }

    #[test]
    fn test_broadcast_respects_room_boundaries() {
        let mut manager = ClientManager::new(8);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        manager.add_client(test_addr(1000), "main", tx1);
        manager.add_client(test_addr(1001), "side-room", tx2);

        manager.broadcast_room("main", &ServerEvent::PlayerLeft { id: 9 });

        match rx1.try_recv() {
            Ok(Message::Text(json)) => {
                assert!(json.contains("playerLeft"));
                assert!(json.contains("\"id\":9"));
            }
            other => panic!("expected text frame, got {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_unicast_targets_one_client() {
        let mut manager = ClientManager::new(8);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let id1 = manager.add_client(test_addr(1000), "main", tx1).unwrap();
        manager.add_client(test_addr(1001), "main", tx2);

        manager.send_to(id1, &ServerEvent::Assigned { side: Side::A });

        match rx1.try_recv() {
            Ok(Message::Text(json)) => assert!(json.contains("assigned")),
            other => panic!("expected text frame, got {:?}", other),
        }
        assert!(rx2.try_recv().is_err());

        // unknown ids are ignored
        manager.send_to(999, &ServerEvent::Assigned { side: Side::B });
    }

    #[test]
    fn test_send_to_dead_writer_does_not_panic() {
        let mut manager = ClientManager::new(8);
        let (tx, rx) = channel();
        let id = manager.add_client(test_addr(1000), "main", tx).unwrap();
        drop(rx);

        manager.send_to(id, &ServerEvent::PlayerLeft { id: 1 });
    }
}
