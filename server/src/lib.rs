//! # Pong Game Server Library
//!
//! This library provides the authoritative server implementation for a
//! networked two-player pong game. It owns the canonical match state,
//! validates client inputs, advances physics on a fixed timestep, and
//! broadcasts state snapshots to all connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the only real version of the game. Clients send intent
//! (paddle positions, serve requests) and render whatever the server says
//! happened; no client-computed outcome is ever trusted.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections including:
//! - Connection establishment and seat assignment (side A, side B, spectator)
//! - Input validation and clamping
//! - Disconnection handling, seat release, and match reset
//!
//! ### State Broadcasting
//! After every simulation tick the server pushes a full JSON snapshot of
//! the room to each of its connections, whether or not a point is in
//! flight. Clients never extrapolate from silence.
//!
//! ## Architecture Design
//!
//! The game loop is the single owner of all room state. Connection tasks
//! decode WebSocket frames and forward them over a channel; the loop
//! interleaves those events with fixed-rate ticks through one `select!`,
//! so input application and physics advancement are serialized without a
//! single lock.
//!
//! ## Module Organization
//!
//! - [`client_manager`]: connection roster, capacity cap, and outbound
//!   fan-out onto per-connection writer channels.
//! - [`registry`]: keyed room storage, passed explicitly into handlers.
//! - [`room`]: seats, score, ball, and the room lifecycle phases.
//! - [`physics`]: serve, fixed-timestep integration, collisions, scoring.
//! - [`network`]: WebSocket transport and the game loop itself.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // 60Hz = ~16.67ms per tick
//!         32,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod physics;
pub mod registry;
pub mod room;
