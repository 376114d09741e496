//! AI opponent: snapshot perception, intercept prediction, key actuation

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::util::task::RepeatingTask;
use crate::ws::protocol::{Difficulty, Key, Side};

use super::physics::BOARD_HEIGHT;
use super::snapshot::MatchSnapshot;

/// No actuation while the target is this close to the paddle center
pub const DEAD_ZONE: f32 = 8.0;
/// Chance per perception cycle of letting go of the key early
pub const MISTAKE_CHANCE: f64 = 0.05;
/// Forward-simulation step bound
pub const MAX_PREDICTION_STEPS: usize = 2000;

/// Tuning per difficulty tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiProfile {
    /// Paddle units per tick while a key is held
    pub paddle_speed: f32,
    /// Max absolute error added to the predicted intercept
    pub error_magnitude: f32,
    pub refresh_period: Duration,
}

impl AiProfile {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self {
                paddle_speed: 3.0,
                error_magnitude: 45.0,
                refresh_period: Duration::from_millis(300),
            },
            Difficulty::Medium => Self {
                paddle_speed: 4.5,
                error_magnitude: 20.0,
                refresh_period: Duration::from_millis(150),
            },
            Difficulty::Hard => Self {
                paddle_speed: 6.5,
                error_magnitude: 5.0,
                refresh_period: Duration::from_millis(60),
            },
        }
    }
}

/// Key currently held by the AI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Actuation {
    #[default]
    Idle,
    PressingUp,
    PressingDown,
}

impl Actuation {
    fn held_key(self) -> Option<Key> {
        match self {
            Self::Idle => None,
            Self::PressingUp => Some(Key::Up),
            Self::PressingDown => Some(Key::Down),
        }
    }
}

/// Discrete key transition emitted by a perception cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(Key),
    Release(Key),
}

/// One AI opponent, owned by the match it plays in
#[derive(Debug)]
pub struct AiController {
    pub side: Side,
    difficulty: Difficulty,
    profile: AiProfile,
    target_y: Option<f32>,
    actuation: Actuation,
    cycles: u64,
    mistake_chance: f64,
    rng: ChaCha8Rng,
    timer: Option<RepeatingTask>,
}

impl AiController {
    pub fn new(side: Side, difficulty: Difficulty, seed: u64) -> Self {
        Self {
            side,
            difficulty,
            profile: AiProfile::for_difficulty(difficulty),
            target_y: None,
            actuation: Actuation::Idle,
            cycles: 0,
            mistake_chance: MISTAKE_CHANCE,
            rng: ChaCha8Rng::seed_from_u64(seed),
            timer: None,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn profile(&self) -> AiProfile {
        self.profile
    }

    pub fn actuation(&self) -> Actuation {
        self.actuation
    }

    pub fn target_y(&self) -> Option<f32> {
        self.target_y
    }

    /// Perception cycles run since the controller was attached
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn has_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Install the refresh timer, cancelling any previous one
    pub fn set_timer(&mut self, timer: RepeatingTask) {
        if let Some(old) = self.timer.replace(timer) {
            old.cancel();
        }
    }

    /// Swap in a new difficulty profile and its freshly started timer
    pub fn restart(&mut self, difficulty: Difficulty, timer: RepeatingTask) {
        self.difficulty = difficulty;
        self.profile = AiProfile::for_difficulty(difficulty);
        self.set_timer(timer);
        debug!(side = ?self.side, ?difficulty, "AI profile replaced");
    }

    /// Cancel the refresh timer and let go of any key
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.actuation = Actuation::Idle;
    }

    /// Velocity intent for the AI paddle given the held key
    pub fn paddle_velocity(&self) -> f32 {
        match self.actuation {
            Actuation::Idle => 0.0,
            Actuation::PressingUp => -self.profile.paddle_speed,
            Actuation::PressingDown => self.profile.paddle_speed,
        }
    }

    /// One perception cycle over a snapshot; returns the key transitions made
    pub fn perceive_and_act(&mut self, snapshot: &MatchSnapshot) -> Vec<KeyEvent> {
        self.cycles += 1;
        let intercept = predict_intercept(snapshot, self.side).clamp(0.0, BOARD_HEIGHT);
        let error = self.rng.gen_range(-1.0f32..=1.0) * self.profile.error_magnitude;
        let target = intercept + error;
        self.target_y = Some(target);

        let delta = target - snapshot.paddle(self.side).center_y();
        let mut events = Vec::new();

        if delta.abs() <= DEAD_ZONE {
            self.release(&mut events);
        } else if delta < 0.0 {
            self.press(Key::Up, &mut events);
        } else {
            self.press(Key::Down, &mut events);
        }

        if self.rng.gen_bool(self.mistake_chance) {
            trace!(side = ?self.side, "AI mistake, releasing early");
            self.release(&mut events);
        }

        events
    }

    fn press(&mut self, key: Key, events: &mut Vec<KeyEvent>) {
        if self.actuation.held_key() == Some(key) {
            return;
        }
        self.release(events);
        self.actuation = match key {
            Key::Up => Actuation::PressingUp,
            Key::Down => Actuation::PressingDown,
        };
        events.push(KeyEvent::Press(key));
    }

    fn release(&mut self, events: &mut Vec<KeyEvent>) {
        if let Some(key) = self.actuation.held_key() {
            events.push(KeyEvent::Release(key));
            self.actuation = Actuation::Idle;
        }
    }

    #[cfg(test)]
    pub(crate) fn with_mistake_chance(mut self, chance: f64) -> Self {
        self.mistake_chance = chance;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_profile(mut self, profile: AiProfile) -> Self {
        self.profile = profile;
        self
    }
}

/// Forward-simulate the ball until it reaches `side`'s paddle face.
/// A ball moving away is bounced off the opponent's face and followed back.
pub fn predict_intercept(snapshot: &MatchSnapshot, side: Side) -> f32 {
    let own = snapshot.paddle(side);
    let opponent = snapshot.paddle(side.opposite());
    let mut ball = snapshot.ball;

    if ball.vx == 0.0 {
        return ball.y;
    }

    for _ in 0..MAX_PREDICTION_STEPS {
        ball.integrate();
        ball.bounce_off_walls();

        if ball.approaches(side) {
            if own.face_reached(&ball) {
                return ball.y;
            }
        } else if opponent.face_reached(&ball) {
            ball.vx = -ball.vx;
        }
    }

    ball.y
}
