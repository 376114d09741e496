//! Board geometry, ball and paddle movement, collision tests

use rand::Rng;

use crate::ws::protocol::{Key, Side};

pub const BOARD_WIDTH: f32 = 800.0;
pub const BOARD_HEIGHT: f32 = 400.0;

pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
pub const LEFT_PADDLE_X: f32 = 10.0;
pub const RIGHT_PADDLE_X: f32 = BOARD_WIDTH - PADDLE_WIDTH;
/// Highest legal paddle top edge
pub const PADDLE_MAX_Y: f32 = BOARD_HEIGHT - PADDLE_HEIGHT;
/// Units per tick while a human holds a key
pub const HUMAN_PADDLE_SPEED: f32 = 5.0;

pub const BALL_RADIUS: f32 = 10.0;
/// Units per tick on each axis after a reset
pub const BASE_BALL_SPEED: f32 = 2.0;
pub const MAX_BALL_SPEED: f32 = 8.0;
/// Vertical perturbation applied on paddle contact
pub const BOUNCE_JITTER: f32 = 0.25;

/// The ball (authoritative)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
}

impl Ball {
    /// A ball at board center with base speed and random direction
    pub fn served(rng: &mut impl Rng) -> Self {
        let mut ball = Self {
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            radius: BALL_RADIUS,
        };
        ball.reset(rng);
        ball
    }

    pub fn reset(&mut self, rng: &mut impl Rng) {
        self.x = BOARD_WIDTH / 2.0;
        self.y = BOARD_HEIGHT / 2.0;
        self.vx = random_sign(rng) * BASE_BALL_SPEED;
        self.vy = random_sign(rng) * BASE_BALL_SPEED;
    }

    pub fn integrate(&mut self) {
        self.x += self.vx;
        self.y += self.vy;
    }

    /// Reflect off the top and bottom walls, radius-inclusive
    pub fn bounce_off_walls(&mut self) {
        if self.y - self.radius <= 0.0 {
            self.vy = self.vy.abs();
        } else if self.y + self.radius >= BOARD_HEIGHT {
            self.vy = -self.vy.abs();
        }
    }

    pub fn clamp_speed(&mut self) {
        self.vx = self.vx.clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
        self.vy = self.vy.clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
    }

    /// True while the ball travels toward the paddle on `side`
    pub fn approaches(&self, side: Side) -> bool {
        self.vx * side.away_sign() < 0.0
    }

    /// Edge the ball has completely left the board through, if any
    pub fn exited(&self) -> Option<Side> {
        if self.x + self.radius < 0.0 {
            Some(Side::Left)
        } else if self.x - self.radius > BOARD_WIDTH {
            Some(Side::Right)
        } else {
            None
        }
    }
}

fn random_sign(rng: &mut impl Rng) -> f32 {
    if rng.gen_bool(0.5) {
        1.0
    } else {
        -1.0
    }
}

/// A paddle (authoritative)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub side: Side,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Velocity intent, consumed by the next step
    pub vy: f32,
    /// Absolute position requested by `paddleMove`, consumed by the next step
    pub pending_y: Option<f32>,
    pub score: u32,
}

impl Paddle {
    pub fn new(side: Side) -> Self {
        let x = match side {
            Side::Left => LEFT_PADDLE_X,
            Side::Right => RIGHT_PADDLE_X,
        };
        Self {
            side,
            x,
            y: PADDLE_MAX_Y / 2.0,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            vy: 0.0,
            pending_y: None,
            score: 0,
        }
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn integrate(&mut self) {
        if let Some(y) = self.pending_y.take() {
            self.y = y;
        }
        self.y = (self.y + self.vy).clamp(0.0, BOARD_HEIGHT - self.height);
    }

    pub fn press(&mut self, key: Key) {
        self.vy = match key {
            Key::Up => -HUMAN_PADDLE_SPEED,
            Key::Down => HUMAN_PADDLE_SPEED,
        };
    }

    /// Stop only if the released key is the one currently driving the paddle
    pub fn release(&mut self, key: Key) {
        let moving = match key {
            Key::Up => self.vy < 0.0,
            Key::Down => self.vy > 0.0,
        };
        if moving {
            self.vy = 0.0;
        }
    }

    /// Whether the ball's leading edge has reached this paddle's x-span
    pub fn face_reached(&self, ball: &Ball) -> bool {
        match self.side {
            Side::Left => ball.x - ball.radius <= self.x + self.width,
            Side::Right => ball.x + ball.radius >= self.x,
        }
    }
}

/// Collision rules shared by the simulation and AI prediction
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// The ball's leading edge lies within the paddle's x-span while its
    /// y-span overlaps the paddle's y-span
    pub fn check_paddle_contact(ball: &Ball, paddle: &Paddle) -> bool {
        let leading_edge = match paddle.side {
            Side::Left => ball.x - ball.radius,
            Side::Right => ball.x + ball.radius,
        };
        let x_inside = leading_edge >= paddle.x && leading_edge <= paddle.x + paddle.width;
        let y_overlap =
            ball.y + ball.radius >= paddle.y && ball.y - ball.radius <= paddle.y + paddle.height;
        x_inside && y_overlap
    }

    /// Send the ball away from `paddle` with a small vertical perturbation.
    /// Returns false when there was no contact.
    pub fn resolve_paddle_contact(ball: &mut Ball, paddle: &Paddle, rng: &mut impl Rng) -> bool {
        if !ball.approaches(paddle.side) || !Self::check_paddle_contact(ball, paddle) {
            return false;
        }

        ball.vx = paddle.side.away_sign() * ball.vx.abs();
        ball.vy += rng.gen_range(-BOUNCE_JITTER..=BOUNCE_JITTER);
        ball.clamp_speed();
        true
    }
}
