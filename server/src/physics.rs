//! Fixed-timestep ball simulation and scoring resolution.
//!
//! The tick engine is the sole writer of ball kinematics and the sole
//! trigger of scoring. It runs off a wall-clock interval owned by the
//! server loop; nothing here suspends. All randomness (serve jitter) comes
//! in through the caller's `Rng` so tests can seed it.

use crate::room::{Ball, Room, RoomPhase};
use log::info;
use rand::Rng;
use shared::{
    Side, BOUNCE_ACCEL, CANVAS_H, CANVAS_W, LEFT_PADDLE_FACE, MAX_BOUNCE_ANGLE, MISS_MARGIN,
    PADDLE_HEIGHT, RIGHT_PADDLE_FACE, SERVE_JITTER, WALL_INSET, WIN_SCORE,
};

/// Default simulation timestep (60 Hz).
pub const DT: f32 = 1.0 / 60.0;

/// Launches the ball from the center toward the receiving side, with a
/// small random angular jitter around the serving direction.
pub fn serve_ball<R: Rng>(room: &mut Room, rng: &mut R) {
    let angle = rng.gen_range(-SERVE_JITTER..SERVE_JITTER);
    let dir = if room.serving_side == Side::B {
        -1.0
    } else {
        1.0
    };
    let speed = room.ball.speed;
    room.ball.vx = dir * speed * angle.cos();
    room.ball.vy = speed * angle.sin();
    room.ball.x = CANVAS_W / 2.0;
    room.ball.y = CANVAS_H / 2.0;
}

/// Starts play if the room is Ready: both seats taken, not already
/// running, neither score at the win threshold. Returns whether a match
/// actually started.
pub fn start_match<R: Rng>(room: &mut Room, rng: &mut R) -> bool {
    if room.phase() != RoomPhase::Ready {
        return false;
    }
    serve_ball(room, rng);
    room.running = true;
    true
}

/// Resolves a point: bumps the winner's score, hands the serve to the
/// conceding side, recenters the ball and either re-serves immediately or
/// freezes the match at the win threshold.
fn award_point<R: Rng>(room: &mut Room, winner: Side, rng: &mut R) {
    match winner {
        Side::A => {
            room.score_a += 1;
            room.serving_side = Side::B;
        }
        Side::B => {
            room.score_b += 1;
            room.serving_side = Side::A;
        }
        Side::Spectator => return,
    }

    room.running = room.score_a < WIN_SCORE && room.score_b < WIN_SCORE;
    room.ball.reset();

    if room.running {
        serve_ball(room, rng);
        info!(
            "point for side {:?}, score {}-{}",
            winner, room.score_a, room.score_b
        );
    } else {
        info!(
            "match over, side {:?} wins {}-{}",
            winner, room.score_a, room.score_b
        );
    }
}

/// Reflects the ball off a paddle face.
///
/// The exit angle maps linearly from the strike offset (±1 across the
/// paddle half-height to ±60°) and the outgoing speed picks up the 4%
/// per-bounce acceleration. The ball is snapped just outside the face so
/// the same tick cannot re-collide. `dir` is +1 off the left paddle,
/// -1 off the right.
fn reflect(ball: &mut Ball, paddle_y: f32, dir: f32, face_x: f32) {
    let relative = (ball.y - (paddle_y + PADDLE_HEIGHT / 2.0)) / (PADDLE_HEIGHT / 2.0);
    let bounce = relative * MAX_BOUNCE_ANGLE;
    let speed = ball.velocity() * BOUNCE_ACCEL;
    ball.vx = dir * speed * bounce.cos();
    ball.vy = speed * bounce.sin();
    ball.x = face_x + dir * (ball.r + 0.5);
}

/// Advances one room by one tick.
///
/// A missing side acts as an open goal: the opponent scores as soon as the
/// ball's edge reaches that boundary. A present paddle either reflects the
/// ball or, once the ball has traveled past the miss margin, concedes the
/// point. Scoring at the win threshold clears `running`; otherwise the
/// engine re-serves immediately without waiting for client action.
pub fn step<R: Rng>(room: &mut Room, dt: f32, rng: &mut R) {
    room.tick = room.tick.wrapping_add(1);
    if !room.running {
        return;
    }

    room.ball.x += room.ball.vx * dt;
    room.ball.y += room.ball.vy * dt;

    // elastic reflection off the top/bottom margins
    let b = &mut room.ball;
    if b.y - b.r <= WALL_INSET {
        b.y = b.r + WALL_INSET;
        b.vy = -b.vy;
    }
    if b.y + b.r >= CANVAS_H - WALL_INSET {
        b.y = CANVAS_H - b.r - WALL_INSET;
        b.vy = -b.vy;
    }

    // left side
    match room.paddle_y(Side::A) {
        Some(py) => {
            if room.ball.x - room.ball.r <= LEFT_PADDLE_FACE {
                if room.ball.y >= py && room.ball.y <= py + PADDLE_HEIGHT {
                    reflect(&mut room.ball, py, 1.0, LEFT_PADDLE_FACE);
                } else if room.ball.x < 0.0 {
                    award_point(room, Side::B, rng);
                }
            }
        }
        None => {
            if room.ball.x - room.ball.r <= 0.0 {
                award_point(room, Side::B, rng);
            }
        }
    }

    // right side
    match room.paddle_y(Side::B) {
        Some(py) => {
            if room.ball.x + room.ball.r >= RIGHT_PADDLE_FACE {
                if room.ball.y >= py && room.ball.y <= py + PADDLE_HEIGHT {
                    reflect(&mut room.ball, py, -1.0, RIGHT_PADDLE_FACE);
                } else if room.ball.x > RIGHT_PADDLE_FACE + MISS_MARGIN {
                    award_point(room, Side::A, rng);
                }
            }
        }
        None => {
            if room.ball.x + room.ball.r >= CANVAS_W {
                award_point(room, Side::A, rng);
            }
        }
    }

    // safety net: running can never survive a reached win threshold
    if room.win_reached() {
        room.running = false;
    }
}
