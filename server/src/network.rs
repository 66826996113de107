//! WebSocket transport and the single-owner game loop.
//!
//! Connection tasks only decode frames and forward them; every mutation of
//! room state happens inside [`Server::run`], which owns the registry and
//! the client roster outright. The 60 Hz tick and all client events funnel
//! through the same `select!`, so "apply input" and "advance physics" can
//! never interleave — mutual exclusion by construction, no per-room lock.

use crate::client_manager::ClientManager;
use crate::physics;
use crate::registry::{RoomRegistry, DEFAULT_ROOM};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Messages sent from connection tasks to the game loop.
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    },
    EventReceived {
        addr: SocketAddr,
        event: ClientEvent,
    },
    ClientDisconnected {
        addr: SocketAddr,
    },
}

/// Main server coordinating the WebSocket transport and game simulation.
pub struct Server {
    listener: Option<TcpListener>,
    clients: ClientManager,
    rooms: RoomRegistry,
    tick_duration: Duration,
    rng: StdRng,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            clients: ClientManager::new(max_clients),
            rooms: RoomRegistry::new(),
            tick_duration,
            rng: StdRng::from_entropy(),
            server_tx,
            server_rx,
        })
    }

    /// Actual bound address, useful when listening on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Spawns the task that accepts sockets and hands each one to its own
    /// connection task.
    fn spawn_acceptor(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self.listener.take().ok_or("server is already running")?;
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let server_tx = server_tx.clone();
                        tokio::spawn(handle_connection(stream, addr, server_tx));
                    }
                    Err(e) => {
                        error!("error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });

        Ok(())
    }

    /// Main loop: processes connection events and advances every room on
    /// the fixed tick cadence, broadcasting the post-tick snapshot.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor()?;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::ClientConnected { addr, sender }) => {
                            self.handle_connect(addr, sender);
                        }
                        Some(ServerMessage::EventReceived { addr, event }) => {
                            self.handle_event(addr, event);
                        }
                        Some(ServerMessage::ClientDisconnected { addr }) => {
                            self.handle_disconnect(addr);
                        }
                        None => {
                            info!("server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.advance_rooms();
                },
            }
        }

        Ok(())
    }

    /// Admits a connection: seat assignment, `assigned` ack, and the
    /// auto-start when the second paddle seat fills.
    fn handle_connect(&mut self, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) {
        let Some(client_id) = self.clients.add_client(addr, DEFAULT_ROOM, sender) else {
            warn!("connection limit reached, rejecting {}", addr);
            return;
        };

        let Some(room) = self.rooms.room_mut(DEFAULT_ROOM) else {
            return;
        };

        let side = room.join(client_id);
        self.clients
            .send_to(client_id, &ServerEvent::Assigned { side });

        if physics::start_match(room, &mut self.rng) {
            info!(
                "room {}: both sides seated, side {:?} serving",
                DEFAULT_ROOM, room.serving_side
            );
            self.clients.broadcast_room(
                DEFAULT_ROOM,
                &ServerEvent::GameStart {
                    serving_side: room.serving_side,
                },
            );
        }
    }

    /// Applies one decoded client event to the sender's room.
    ///
    /// Out-of-precondition operations (paddle input from a spectator,
    /// serve while running) fall through as no-ops rather than errors.
    fn handle_event(&mut self, addr: SocketAddr, event: ClientEvent) {
        let Some(client_id) = self.clients.find_client_by_addr(addr) else {
            return;
        };
        let Some(room_key) = self.clients.room_of(client_id) else {
            return;
        };
        let Some(room) = self.rooms.room_mut(room_key) else {
            return;
        };

        match event {
            ClientEvent::Paddle { y } => {
                room.set_paddle_y(client_id, y);
            }
            ClientEvent::Serve {} => {
                if physics::start_match(room, &mut self.rng) {
                    info!(
                        "room {}: serve accepted, side {:?} serving",
                        room_key, room.serving_side
                    );
                    self.clients.broadcast_room(
                        room_key,
                        &ServerEvent::GameStart {
                            serving_side: room.serving_side,
                        },
                    );
                }
            }
            ClientEvent::RequestState {} => {
                // out-of-band unicast so late joiners need not wait a tick
                self.clients
                    .send_to(client_id, &ServerEvent::State(room.snapshot()));
            }
        }
    }

    /// Tears down a departed connection and informs the rest of the room.
    fn handle_disconnect(&mut self, addr: SocketAddr) {
        let Some(client) = self.clients.remove_client(&addr) else {
            return;
        };

        if let Some(room) = self.rooms.room_mut(&client.room) {
            if room.leave(client.id).is_some() {
                self.clients
                    .broadcast_room(&client.room, &ServerEvent::PlayerLeft { id: client.id });
            }
        }
    }

    /// One tick: advance physics in every room, then push the post-tick
    /// snapshot to all of its connections.
    fn advance_rooms(&mut self) {
        let dt = self.tick_duration.as_secs_f32();

        for (key, room) in self.rooms.iter_mut() {
            physics::step(room, dt, &mut self.rng);
            self.clients
                .broadcast_room(key, &ServerEvent::State(room.snapshot()));

            if room.tick % 600 == 0 {
                debug!(
                    "room {}: tick {}, phase {:?}, score {}-{}",
                    key,
                    room.tick,
                    room.phase(),
                    room.score_a,
                    room.score_b
                );
            }
        }
    }
}

/// Per-connection task: performs the WebSocket handshake, registers with
/// the game loop, then shuttles frames until the socket dies. Malformed or
/// unknown messages are dropped silently — never surfaced to the sender.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    if server_tx
        .send(ServerMessage::ClientConnected {
            addr,
            sender: out_tx,
        })
        .is_err()
    {
        return;
    }

    // writer: drains the game loop's queue onto the socket
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if ws_sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    // reader: decodes inbound frames at the boundary
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if server_tx
                        .send(ServerMessage::EventReceived { addr, event })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!("discarding malformed message from {}: {}", addr, e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {
                debug!("ignoring non-text frame from {}", addr);
            }
            Err(e) => {
                debug!("websocket error from {}: {}", addr, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::ClientDisconnected { addr });
    writer_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Side, CANVAS_H, CANVAS_W, PADDLE_Y_MIN, WIN_SCORE};

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", Duration::from_millis(16), 8)
            .await
            .expect("failed to bind test server")
    }

    fn test_addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn recv_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> ServerEvent {
        match rx.try_recv().expect("expected a queued frame") {
            Message::Text(json) => serde_json::from_str(&json).expect("invalid frame json"),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let server = test_server().await;
        let addr = server.local_addr().expect("no local addr");
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_join_flow_assigns_sides_and_starts() {
        let mut server = test_server().await;
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        server.handle_connect(test_addr(4001), tx1);
        match recv_event(&mut rx1) {
            ServerEvent::Assigned { side } => assert_eq!(side, Side::A),
            other => panic!("expected assigned, got {:?}", other),
        }

        server.handle_connect(test_addr(4002), tx2);
        match recv_event(&mut rx2) {
            ServerEvent::Assigned { side } => assert_eq!(side, Side::B),
            other => panic!("expected assigned, got {:?}", other),
        }

        // both connections observe the auto-start
        match recv_event(&mut rx1) {
            ServerEvent::GameStart { serving_side } => assert_eq!(serving_side, Side::A),
            other => panic!("expected gameStart, got {:?}", other),
        }
        match recv_event(&mut rx2) {
            ServerEvent::GameStart { serving_side } => assert_eq!(serving_side, Side::A),
            other => panic!("expected gameStart, got {:?}", other),
        }

        let room = server.rooms.room(DEFAULT_ROOM).unwrap();
        assert!(room.running);
        assert!(room.ball.velocity() > 0.0);
    }

    #[tokio::test]
    async fn test_paddle_event_clamps_hostile_input() {
        let mut server = test_server().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr = test_addr(4001);
        server.handle_connect(addr, tx);

        server.handle_event(addr, ClientEvent::Paddle { y: -100.0 });

        let room = server.rooms.room(DEFAULT_ROOM).unwrap();
        assert_eq!(room.paddle_y(Side::A), Some(PADDLE_Y_MIN));
    }

    #[tokio::test]
    async fn test_events_from_unknown_connections_dropped() {
        let mut server = test_server().await;
        server.handle_event(test_addr(5555), ClientEvent::Serve {});
        server.handle_disconnect(test_addr(5555));

        let room = server.rooms.room(DEFAULT_ROOM).unwrap();
        assert!(!room.running);
    }

    #[tokio::test]
    async fn test_player_disconnect_halts_and_notifies() {
        let mut server = test_server().await;
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let addr1 = test_addr(4001);
        let addr2 = test_addr(4002);
        server.handle_connect(addr1, tx1);
        server.handle_connect(addr2, tx2);

        // drain assigned + gameStart for the first client
        let _ = recv_event(&mut rx1);
        let _ = recv_event(&mut rx1);

        server.handle_disconnect(addr2);

        match recv_event(&mut rx1) {
            ServerEvent::PlayerLeft { id } => assert_eq!(id, 2),
            other => panic!("expected playerLeft, got {:?}", other),
        }

        let room = server.rooms.room(DEFAULT_ROOM).unwrap();
        assert!(!room.running);
        assert_eq!(room.ball.x, CANVAS_W / 2.0);
        assert_eq!(room.ball.y, CANVAS_H / 2.0);
        assert_eq!(room.ball.vx, 0.0);
        assert_eq!(room.ball.vy, 0.0);
    }

    #[tokio::test]
    async fn test_serve_refused_while_running_or_finished() {
        let mut server = test_server().await;
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let addr1 = test_addr(4001);
        server.handle_connect(addr1, tx1);
        server.handle_connect(test_addr(4002), tx2);

        // auto-start already ran; a second serve is a no-op
        let before = server.rooms.room(DEFAULT_ROOM).unwrap().ball;
        server.handle_event(addr1, ClientEvent::Serve {});
        let after = server.rooms.room(DEFAULT_ROOM).unwrap().ball;
        assert_eq!(before.vx, after.vx);
        assert_eq!(before.vy, after.vy);

        // finished match cannot be re-served either
        {
            let room = server.rooms.room_mut(DEFAULT_ROOM).unwrap();
            room.running = false;
            room.score_a = WIN_SCORE;
        }
        server.handle_event(addr1, ClientEvent::Serve {});
        assert!(!server.rooms.room(DEFAULT_ROOM).unwrap().running);
    }

    #[tokio::test]
    async fn test_request_state_unicasts_snapshot() {
        let mut server = test_server().await;
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let addr1 = test_addr(4001);
        server.handle_connect(addr1, tx1);
        server.handle_connect(test_addr(4002), tx2);

        // drain join traffic
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        server.handle_event(addr1, ClientEvent::RequestState {});

        match recv_event(&mut rx1) {
            ServerEvent::State(snapshot) => {
                assert!(snapshot.running);
                assert_eq!(snapshot.players.len(), 2);
            }
            other => panic!("expected state, got {:?}", other),
        }
        // requester only, no broadcast
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tick_broadcasts_snapshot_to_room() {
        let mut server = test_server().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.handle_connect(test_addr(4001), tx);
        while rx.try_recv().is_ok() {}

        server.advance_rooms();

        match recv_event(&mut rx) {
            ServerEvent::State(snapshot) => {
                // lone player: idle room still gets its post-tick snapshot
                assert!(!snapshot.running);
                assert_eq!(snapshot.players.len(), 1);
            }
            other => panic!("expected state, got {:?}", other),
        }
    }
}
