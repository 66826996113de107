//! Authoritative per-match state: seats, ball kinematics, scores.

use log::info;
use shared::{
    clamp_paddle_y, BallView, PlayerEntry, Side, Snapshot, BALL_RADIUS, BALL_SPEED, CANVAS_H,
    CANVAS_W, PADDLE_START_Y, WIN_SCORE,
};
use std::collections::BTreeSet;

/// Ball kinematics in playfield coordinates.
///
/// `speed` is the base serve speed; bounce acceleration lives only in the
/// velocity vector and is discarded whenever the ball resets.
#[derive(Debug, Clone, Copy)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub speed: f32,
    pub r: f32,
}

impl Ball {
    /// A ball centered on the playfield with zero velocity.
    pub fn centered() -> Self {
        Ball {
            x: CANVAS_W / 2.0,
            y: CANVAS_H / 2.0,
            vx: 0.0,
            vy: 0.0,
            speed: BALL_SPEED,
            r: BALL_RADIUS,
        }
    }

    /// Recenters the ball and kills its velocity.
    pub fn reset(&mut self) {
        self.x = CANVAS_W / 2.0;
        self.y = CANVAS_H / 2.0;
        self.vx = 0.0;
        self.vy = 0.0;
    }

    /// Current velocity magnitude.
    pub fn velocity(&self) -> f32 {
        self.vx.hypot(self.vy)
    }
}

/// A paddle seat occupied by one connection.
#[derive(Debug, Clone, Copy)]
pub struct PaddleSlot {
    pub client_id: u32,
    pub y: f32,
}

/// Coarse room lifecycle, derived from state rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Fewer than two active players.
    Idle,
    /// Both seats occupied, awaiting serve.
    Ready,
    /// Simulation advancing.
    Playing,
    /// A side reached the win score; scores frozen.
    Finished,
}

/// One isolated match: two paddle slots, any number of spectators, ball
/// and scores. The slot array makes the at-most-one-connection-per-side
/// invariant structural; `join` fills the earliest open side, so the first
/// joiner is always A.
#[derive(Debug, Clone)]
pub struct Room {
    slots: [Option<PaddleSlot>; 2],
    spectators: BTreeSet<u32>,
    pub ball: Ball,
    pub score_a: u32,
    pub score_b: u32,
    pub serving_side: Side,
    pub running: bool,
    /// Monotonic tick counter for diagnostics; not on the wire.
    pub tick: u64,
}

const SLOT_SIDES: [Side; 2] = [Side::A, Side::B];

impl Room {
    pub fn new() -> Self {
        Room {
            slots: [None, None],
            spectators: BTreeSet::new(),
            ball: Ball::centered(),
            score_a: 0,
            score_b: 0,
            serving_side: Side::A,
            running: false,
            tick: 0,
        }
    }

    /// Seats a new connection: earliest open side first, spectator otherwise.
    pub fn join(&mut self, client_id: u32) -> Side {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(PaddleSlot {
                    client_id,
                    y: PADDLE_START_Y,
                });
                let side = SLOT_SIDES[i];
                info!("client {} seated as side {:?}", client_id, side);
                return side;
            }
        }

        self.spectators.insert(client_id);
        info!("client {} joined as spectator", client_id);
        Side::Spectator
    }

    /// Removes a departing connection and reports the seat it held.
    ///
    /// Losing either active player ends the match: the room drops back to
    /// Idle with the ball recentered and the match state reset, so a fresh
    /// pair of players starts from zero. Spectators leaving have no
    /// simulation effect.
    pub fn leave(&mut self, client_id: u32) -> Option<Side> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.map(|s| s.client_id) == Some(client_id) {
                *slot = None;
                let side = SLOT_SIDES[i];
                info!("player {:?} (client {}) left, match reset", side, client_id);
                self.reset_match();
                return Some(side);
            }
        }

        if self.spectators.remove(&client_id) {
            info!("spectator (client {}) left", client_id);
            return Some(Side::Spectator);
        }

        None
    }

    /// Returns the match to its initial state, keeping seated connections.
    pub fn reset_match(&mut self) {
        self.score_a = 0;
        self.score_b = 0;
        self.serving_side = Side::A;
        self.running = false;
        self.ball.reset();
    }

    /// Seat held by a connection, if it is a member of this room.
    pub fn side_of(&self, client_id: u32) -> Option<Side> {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.map(|s| s.client_id) == Some(client_id) {
                return Some(SLOT_SIDES[i]);
            }
        }
        if self.spectators.contains(&client_id) {
            return Some(Side::Spectator);
        }
        None
    }

    /// Paddle position for a playing side, if that seat is occupied.
    pub fn paddle_y(&self, side: Side) -> Option<f32> {
        match side {
            Side::A => self.slots[0].map(|s| s.y),
            Side::B => self.slots[1].map(|s| s.y),
            Side::Spectator => None,
        }
    }

    /// Applies a paddle move from a connection.
    ///
    /// Input from spectators or non-members is ignored, as are non-finite
    /// positions; accepted values are clamped to the playfield. Returns
    /// whether the paddle actually moved.
    pub fn set_paddle_y(&mut self, client_id: u32, y: f32) -> bool {
        let Some(clamped) = clamp_paddle_y(y) else {
            return false;
        };

        for slot in self.slots.iter_mut().flatten() {
            if slot.client_id == client_id {
                slot.y = clamped;
                return true;
            }
        }
        false
    }

    pub fn both_sides_present(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    pub fn win_reached(&self) -> bool {
        self.score_a >= WIN_SCORE || self.score_b >= WIN_SCORE
    }

    pub fn phase(&self) -> RoomPhase {
        if self.running {
            RoomPhase::Playing
        } else if self.win_reached() {
            RoomPhase::Finished
        } else if self.both_sides_present() {
            RoomPhase::Ready
        } else {
            RoomPhase::Idle
        }
    }

    /// Encodes the room for broadcast: sides A and B first, then
    /// spectators in id order (spectators carry the resting paddle Y).
    pub fn snapshot(&self) -> Snapshot {
        let mut players = Vec::with_capacity(2 + self.spectators.len());
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                players.push(PlayerEntry {
                    id: slot.client_id,
                    side: SLOT_SIDES[i],
                    y: slot.y,
                });
            }
        }
        for &id in &self.spectators {
            players.push(PlayerEntry {
                id,
                side: Side::Spectator,
                y: PADDLE_START_Y,
            });
        }

        Snapshot {
            ball: BallView {
                x: self.ball.x,
                y: self.ball.y,
                r: self.ball.r,
            },
            score_a: self.score_a,
            score_b: self.score_b,
            players,
            running: self.running,
            serving_side: self.serving_side,
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Room::new()
    }
}
