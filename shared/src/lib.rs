use serde::{Deserialize, Serialize};

pub const CANVAS_W: f32 = 900.0;
pub const CANVAS_H: f32 = 520.0;
pub const WALL_INSET: f32 = 4.0;
pub const PADDLE_HEIGHT: f32 = 110.0;
pub const PADDLE_X: f32 = 30.0;
pub const PADDLE_W: f32 = 14.0;
pub const PADDLE_Y_MIN: f32 = 6.0;
pub const PADDLE_Y_MAX: f32 = CANVAS_H - PADDLE_HEIGHT - 6.0;
pub const PADDLE_START_Y: f32 = CANVAS_H / 2.0 - PADDLE_HEIGHT / 2.0;
pub const BALL_RADIUS: f32 = 9.0;
pub const BALL_SPEED: f32 = 360.0;
pub const WIN_SCORE: u32 = 10;
pub const SERVE_JITTER: f32 = 0.3;
pub const BOUNCE_ACCEL: f32 = 1.04;
pub const MAX_BOUNCE_ANGLE: f32 = std::f32::consts::FRAC_PI_3;
pub const MISS_MARGIN: f32 = 40.0;

/// X coordinate of the left paddle's striking face.
pub const LEFT_PADDLE_FACE: f32 = PADDLE_X + PADDLE_W;
/// X coordinate of the right paddle's striking face.
pub const RIGHT_PADDLE_FACE: f32 = CANVAS_W - PADDLE_X - PADDLE_W;

/// Seat a connection holds in a room.
///
/// Sides A and B each control one paddle; everyone else observes as a
/// spectator. Serialized as `"A"`, `"B"` and `"S"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
    #[serde(rename = "S")]
    Spectator,
}

impl Side {
    /// True for the two paddle-controlling seats.
    pub fn is_player(self) -> bool {
        matches!(self, Side::A | Side::B)
    }
}

/// Sanitizes a client-supplied paddle position.
///
/// Non-finite values (NaN, infinities from overflowing JSON numbers) are
/// rejected outright; finite values are clamped to the playfield so the
/// paddle can never leave it, whatever the client sent.
pub fn clamp_paddle_y(y: f32) -> Option<f32> {
    if y.is_finite() {
        Some(y.clamp(PADDLE_Y_MIN, PADDLE_Y_MAX))
    } else {
        None
    }
}

/// Messages accepted from clients, decoded once at the connection boundary.
/// Frames carrying an unknown tag or an unparseable payload never construct
/// a variant and are dropped by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Paddle { y: f32 },
    Serve {},
    RequestState {},
}

/// Messages pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Assigned {
        side: Side,
    },
    #[serde(rename_all = "camelCase")]
    GameStart {
        serving_side: Side,
    },
    State(Snapshot),
    PlayerLeft {
        id: u32,
    },
}

/// Ball fields exposed to clients; velocity stays server-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallView {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

/// One entry in the snapshot player list. Spectators appear with side `"S"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: u32,
    pub side: Side,
    pub y: f32,
}

/// Full room state as broadcast after every tick and on `requestState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub ball: BallView,
    pub score_a: u32,
    pub score_b: u32,
    pub players: Vec<PlayerEntry>,
    pub running: bool,
    pub serving_side: Side,
}
