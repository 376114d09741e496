//! Match state and the fixed-step simulation

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{Difficulty, Key, ServerMsg, Side};

use super::ai::AiController;
use super::physics::{Ball, Paddle, PhysicsSystem};
use super::snapshot::MatchSnapshot;

pub type MatchId = Uuid;
pub type ConnectionId = Uuid;

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Fewer than two seats filled, not simulated
    Waiting,
    /// Both seats filled, simulated every tick
    Ready,
    /// Terminal; awaiting eviction
    Destroyed,
}

/// A human connection seated in a match
#[derive(Debug, Clone)]
pub struct Participant {
    pub conn_id: ConnectionId,
    outbox: mpsc::Sender<ServerMsg>,
}

impl Participant {
    pub fn new(conn_id: ConnectionId, outbox: mpsc::Sender<ServerMsg>) -> Self {
        Self { conn_id, outbox }
    }

    /// Queue a message without blocking the caller
    pub fn send(&self, msg: ServerMsg) {
        match self.outbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %self.conn_id, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %self.conn_id, "Outbound queue closed");
            }
        }
    }
}

/// Occupant of one paddle slot
#[derive(Debug)]
pub enum Seat {
    Human(Participant),
    Ai,
}

/// Paddle input from a human, applied on the next step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaddleInput {
    MoveTo(f32),
    Press(Key),
    Release(Key),
}

/// One game instance (authoritative)
#[derive(Debug)]
pub struct GameMatch {
    pub id: MatchId,
    pub phase: MatchPhase,
    pub ball: Ball,
    pub left: Paddle,
    pub right: Paddle,
    pub difficulty: Difficulty,
    pub tick: u64,
    left_seat: Option<Seat>,
    right_seat: Option<Seat>,
    ai: Option<AiController>,
    rng: ChaCha8Rng,
}

impl GameMatch {
    pub fn new(id: MatchId, seed: u64, difficulty: Difficulty) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            id,
            phase: MatchPhase::Waiting,
            ball: Ball::served(&mut rng),
            left: Paddle::new(Side::Left),
            right: Paddle::new(Side::Right),
            difficulty,
            tick: 0,
            left_seat: None,
            right_seat: None,
            ai: None,
            rng,
        }
    }

    pub fn seat(&self, side: Side) -> Option<&Seat> {
        match side {
            Side::Left => self.left_seat.as_ref(),
            Side::Right => self.right_seat.as_ref(),
        }
    }

    fn seat_slot(&mut self, side: Side) -> &mut Option<Seat> {
        match side {
            Side::Left => &mut self.left_seat,
            Side::Right => &mut self.right_seat,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn ai(&self) -> Option<&AiController> {
        self.ai.as_ref()
    }

    pub fn ai_mut(&mut self) -> Option<&mut AiController> {
        self.ai.as_mut()
    }

    pub fn is_ready(&self) -> bool {
        self.phase == MatchPhase::Ready
    }

    pub fn occupied_seats(&self) -> usize {
        [&self.left_seat, &self.right_seat]
            .into_iter()
            .filter(|s| s.is_some())
            .count()
    }

    pub fn humans(&self) -> impl Iterator<Item = &Participant> {
        [&self.left_seat, &self.right_seat]
            .into_iter()
            .filter_map(|seat| match seat {
                Some(Seat::Human(p)) => Some(p),
                _ => None,
            })
    }

    pub fn human_count(&self) -> usize {
        self.humans().count()
    }

    pub fn side_of(&self, conn_id: ConnectionId) -> Option<Side> {
        [Side::Left, Side::Right].into_iter().find(|&side| {
            matches!(self.seat(side), Some(Seat::Human(p)) if p.conn_id == conn_id)
        })
    }

    /// Free side a PvP joiner may take, Left first.
    /// Only waiting, human-only matches qualify.
    pub fn open_pvp_side(&self) -> Option<Side> {
        if self.phase != MatchPhase::Waiting || self.ai.is_some() {
            return None;
        }
        [Side::Left, Side::Right]
            .into_iter()
            .find(|&side| self.seat(side).is_none())
    }

    pub fn seat_human(&mut self, side: Side, participant: Participant) {
        *self.seat_slot(side) = Some(Seat::Human(participant));
        self.refresh_phase();
    }

    /// Seat an AI; its paddle starts at rest
    pub fn seat_ai(&mut self, controller: AiController) {
        let side = controller.side;
        debug!(match_id = %self.id, ?side, timer = controller.has_timer(), "AI seated");
        if let Some(mut old) = self.ai.replace(controller) {
            old.stop();
        }
        *self.seat_slot(side) = Some(Seat::Ai);
        self.paddle_mut(side).vy = 0.0;
        self.refresh_phase();
    }

    /// Empty a seat, stopping the AI if it sat there
    pub fn vacate(&mut self, side: Side) -> Option<Seat> {
        let seat = self.seat_slot(side).take();
        if matches!(seat, Some(Seat::Ai)) {
            self.detach_ai();
        }
        let paddle = self.paddle_mut(side);
        paddle.vy = 0.0;
        paddle.pending_y = None;
        self.refresh_phase();
        seat
    }

    pub fn detach_ai(&mut self) {
        if let Some(mut ai) = self.ai.take() {
            ai.stop();
            if matches!(self.seat(ai.side), Some(Seat::Ai)) {
                *self.seat_slot(ai.side) = None;
            }
            debug!(match_id = %self.id, side = ?ai.side, "AI detached");
        }
    }

    /// Enter the terminal phase; the AI timer is cancelled before returning
    pub fn destroy(&mut self) {
        if self.phase == MatchPhase::Destroyed {
            return;
        }
        self.detach_ai();
        self.left_seat = None;
        self.right_seat = None;
        self.phase = MatchPhase::Destroyed;
        info!(match_id = %self.id, tick = self.tick, "Match destroyed");
    }

    /// Destroyed, or nobody left to play
    pub fn is_defunct(&self) -> bool {
        self.phase == MatchPhase::Destroyed || self.human_count() == 0
    }

    fn refresh_phase(&mut self) {
        if self.phase == MatchPhase::Destroyed {
            return;
        }
        self.phase = if self.occupied_seats() == 2 {
            MatchPhase::Ready
        } else {
            MatchPhase::Waiting
        };
    }

    pub fn broadcast(&self, msg: &ServerMsg) {
        for participant in self.humans() {
            participant.send(msg.clone());
        }
    }

    /// Record human input; only the next step observes it
    pub fn apply_input(&mut self, side: Side, input: PaddleInput) {
        let paddle = self.paddle_mut(side);
        match input {
            PaddleInput::MoveTo(y) if y.is_finite() => paddle.pending_y = Some(y),
            PaddleInput::MoveTo(_) => {}
            PaddleInput::Press(key) => paddle.press(key),
            PaddleInput::Release(key) => paddle.release(key),
        }
    }

    /// Run one AI perception cycle over a fresh snapshot.
    /// Returns false when no AI is attached.
    pub fn run_ai_cycle(&mut self) -> bool {
        let snapshot = MatchSnapshot::capture(self);
        match self.ai.as_mut() {
            Some(ai) => {
                let events = ai.perceive_and_act(&snapshot);
                if !events.is_empty() {
                    debug!(
                        match_id = %self.id,
                        target_y = ?ai.target_y(),
                        actuation = ?ai.actuation(),
                        cycle = ai.cycles(),
                        ?events,
                        "AI actuation"
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Apply the AI's held key to its paddle, then advance
    pub fn step(&mut self) {
        let actuation = self.ai.as_ref().map(|ai| (ai.side, ai.paddle_velocity()));
        if let Some((side, vy)) = actuation {
            self.paddle_mut(side).vy = vy;
        }
        self.advance();
    }

    /// Advance the simulation by exactly one tick
    pub fn advance(&mut self) {
        self.tick += 1;

        self.left.integrate();
        self.right.integrate();

        self.ball.integrate();
        self.ball.bounce_off_walls();

        if !PhysicsSystem::resolve_paddle_contact(&mut self.ball, &self.left, &mut self.rng) {
            PhysicsSystem::resolve_paddle_contact(&mut self.ball, &self.right, &mut self.rng);
        }

        if let Some(exit) = self.ball.exited() {
            let scorer = exit.opposite();
            let paddle = self.paddle_mut(scorer);
            paddle.score += 1;
            let (left, right) = (self.left.score, self.right.score);
            self.ball.reset(&mut self.rng);
            debug!(match_id = %self.id, ?scorer, left, right, "Point scored");
        }
    }

    /// Random seed for a controller owned by this match
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{BASE_BALL_SPEED, BOARD_HEIGHT, PADDLE_MAX_Y};

    fn ready_match() -> (GameMatch, mpsc::Receiver<ServerMsg>, mpsc::Receiver<ServerMsg>) {
        let mut game = GameMatch::new(Uuid::new_v4(), 42, Difficulty::Medium);
        let (tx1, rx1) = mpsc::channel(16);
        let (tx2, rx2) = mpsc::channel(16);
        game.seat_human(Side::Left, Participant::new(Uuid::new_v4(), tx1));
        game.seat_human(Side::Right, Participant::new(Uuid::new_v4(), tx2));
        (game, rx1, rx2)
    }

    fn place_ball(game: &mut GameMatch, x: f32, y: f32, vx: f32, vy: f32) {
        game.ball.x = x;
        game.ball.y = y;
        game.ball.vx = vx;
        game.ball.vy = vy;
    }

    #[test]
    fn one_advance_moves_ball_by_velocity() {
        let (mut game, _rx1, _rx2) = ready_match();
        place_ball(&mut game, 400.0, 200.0, 2.0, 2.0);
        let (left_y, right_y) = (game.left.y, game.right.y);

        game.advance();

        assert_eq!((game.ball.x, game.ball.y), (402.0, 202.0));
        assert_eq!(game.left.y, left_y);
        assert_eq!(game.right.y, right_y);
    }

    #[test]
    fn exiting_left_scores_for_right_and_resets() {
        let (mut game, _rx1, _rx2) = ready_match();
        place_ball(&mut game, -9.0, 30.0, -2.0, 1.0);

        game.advance();

        assert_eq!(game.right.score, 1);
        assert_eq!(game.left.score, 0);
        assert_eq!((game.ball.x, game.ball.y), (400.0, 200.0));
        assert_eq!(game.ball.vx.abs(), BASE_BALL_SPEED);
        assert_eq!(game.ball.vy.abs(), BASE_BALL_SPEED);
    }

    #[test]
    fn exiting_right_scores_for_left() {
        let (mut game, _rx1, _rx2) = ready_match();
        place_ball(&mut game, 809.0, 30.0, 2.0, 1.0);
        game.advance();
        assert_eq!((game.left.score, game.right.score), (1, 0));
    }

    #[test]
    fn paddle_hit_sends_ball_away() {
        let (mut game, _rx1, _rx2) = ready_match();
        let center = game.right.center_y();
        place_ball(&mut game, 778.0, center, 3.0, 0.0);

        game.advance();

        assert!(game.ball.vx < 0.0);
        assert_eq!(game.ball.vx, -3.0);
        assert_eq!((game.left.score, game.right.score), (0, 0));
    }

    #[test]
    fn paddles_stay_in_bounds_and_one_score_per_step() {
        let (mut game, _rx1, _rx2) = ready_match();
        game.apply_input(Side::Left, PaddleInput::Press(Key::Up));
        game.apply_input(Side::Right, PaddleInput::Press(Key::Down));

        for _ in 0..5_000 {
            let before = game.left.score + game.right.score;
            game.advance();
            let after = game.left.score + game.right.score;
            assert!(after - before <= 1);
            for paddle in [&game.left, &game.right] {
                assert!(paddle.y >= 0.0 && paddle.y <= PADDLE_MAX_Y);
            }
            assert!(game.ball.y > -game.ball.radius && game.ball.y < BOARD_HEIGHT + game.ball.radius);
        }
        assert_eq!(game.left.y, 0.0);
        assert_eq!(game.right.y, PADDLE_MAX_Y);
    }

    #[test]
    fn paddle_move_is_applied_on_next_step() {
        let (mut game, _rx1, _rx2) = ready_match();
        game.apply_input(Side::Left, PaddleInput::MoveTo(20.0));
        assert_eq!(game.left.y, PADDLE_MAX_Y / 2.0);
        game.advance();
        assert_eq!(game.left.y, 20.0);

        game.apply_input(Side::Left, PaddleInput::MoveTo(f32::NAN));
        game.advance();
        assert_eq!(game.left.y, 20.0);
    }

    #[test]
    fn seating_both_sides_makes_ready_and_vacating_waits() {
        let (mut game, _rx1, _rx2) = ready_match();
        assert!(game.is_ready());
        assert_eq!(game.open_pvp_side(), None);

        let left_conn = match game.seat(Side::Left) {
            Some(Seat::Human(p)) => p.conn_id,
            other => panic!("unexpected seat {other:?}"),
        };
        assert_eq!(game.side_of(left_conn), Some(Side::Left));

        game.vacate(Side::Left);
        assert_eq!(game.phase, MatchPhase::Waiting);
        assert_eq!(game.open_pvp_side(), Some(Side::Left));
    }

    #[test]
    fn destroy_detaches_ai() {
        let mut game = GameMatch::new(Uuid::new_v4(), 1, Difficulty::Easy);
        let (tx, _rx) = mpsc::channel(4);
        game.seat_human(Side::Left, Participant::new(Uuid::new_v4(), tx));
        game.seat_ai(AiController::new(Side::Right, Difficulty::Easy, 5));
        assert!(game.is_ready());

        game.destroy();
        assert_eq!(game.phase, MatchPhase::Destroyed);
        assert!(game.ai().is_none());
        assert!(!game.run_ai_cycle());
    }

    #[test]
    fn broadcast_reaches_every_human() {
        let (game, mut rx1, mut rx2) = ready_match();
        game.broadcast(&ServerMsg::GameReady {
            message: "go".to_string(),
        });
        assert!(matches!(rx1.try_recv(), Ok(ServerMsg::GameReady { .. })));
        assert!(matches!(rx2.try_recv(), Ok(ServerMsg::GameReady { .. })));
    }
}
