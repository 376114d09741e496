//! Read-only copies of match state: AI perception input and wire updates

use crate::ws::protocol::{BallState, PaddleState, ServerMsg, Side};

use super::physics::{Ball, Paddle};
use super::GameMatch;

/// Immutable copy of the state needed to predict the ball.
/// Taken under the match guard, then used without touching live state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSnapshot {
    pub ball: Ball,
    pub left: Paddle,
    pub right: Paddle,
}

impl MatchSnapshot {
    pub fn capture(game: &GameMatch) -> Self {
        Self {
            ball: game.ball,
            left: game.left,
            right: game.right,
        }
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Build the per-tick `gameUpdate` broadcast
pub fn game_update(game: &GameMatch) -> ServerMsg {
    let ball = game.ball;
    ServerMsg::GameUpdate {
        ball: BallState {
            x: ball.x,
            y: ball.y,
            vx: ball.vx,
            vy: ball.vy,
            radius: ball.radius,
        },
        player1: paddle_state(&game.left),
        player2: paddle_state(&game.right),
    }
}

fn paddle_state(paddle: &Paddle) -> PaddleState {
    PaddleState {
        x: paddle.x,
        y: paddle.y,
        width: paddle.width,
        height: paddle.height,
        score: paddle.score,
    }
}
