//! Match registry - matchmaking, seat management and AI timer lifecycle

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::ai::{AiController, AiProfile};
use crate::game::{ConnectionId, GameMatch, MatchId, PaddleInput, Participant};
use crate::util::task::{CancelToken, RepeatingTask};
use crate::ws::protocol::{Difficulty, ServerMsg, Side};

/// Where a connection was seated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub match_id: MatchId,
    pub side: Side,
}

/// Registry errors. None of these are fatal; callers log and move on.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Match not found: {0}")]
    NotFound(MatchId),

    #[error("Match {0} has no AI opponent")]
    NotAiBacked(MatchId),

    #[error("Connection {0} is not seated in a match")]
    NotSeated(ConnectionId),
}

/// Registry of all live matches.
///
/// Every match sits behind its own map entry lock; structural operations
/// (join, leave, difficulty changes) are additionally serialized by the
/// matchmaking lock so two joiners can never race for one seat.
pub struct MatchRegistry {
    matches: DashMap<MatchId, GameMatch>,
    connections: DashMap<ConnectionId, MatchId>,
    matchmaking: Mutex<()>,
    ai_backfill: bool,
    this: Weak<MatchRegistry>,
}

impl MatchRegistry {
    pub fn new(ai_backfill: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            matches: DashMap::new(),
            connections: DashMap::new(),
            matchmaking: Mutex::new(()),
            ai_backfill,
            this: this.clone(),
        })
    }

    pub(crate) fn matches(&self) -> &DashMap<MatchId, GameMatch> {
        &self.matches
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.connections.len()
    }

    pub fn match_of(&self, conn_id: &ConnectionId) -> Option<MatchId> {
        self.connections.get(conn_id).map(|m| *m)
    }

    /// Seat a human in a waiting PvP match, creating one if none is open
    pub fn join_pvp(&self, participant: Participant) -> Assignment {
        let _guard = self.matchmaking.lock();

        for mut entry in self.matches.iter_mut() {
            let game = entry.value_mut();
            if let Some(side) = game.open_pvp_side() {
                return self.seat_joiner(game, side, participant);
            }
        }

        let mut game = GameMatch::new(Uuid::new_v4(), rand::random(), Difficulty::default());
        info!(match_id = %game.id, "Created PvP match");
        let assignment = self.seat_joiner(&mut game, Side::Left, participant);
        self.matches.insert(game.id, game);
        assignment
    }

    /// Start a fresh match against the AI; it is ready immediately
    pub fn join_vs_ai(&self, participant: Participant, difficulty: Difficulty) -> Assignment {
        let _guard = self.matchmaking.lock();

        let mut game = GameMatch::new(Uuid::new_v4(), rand::random(), difficulty);
        let match_id = game.id;
        info!(match_id = %match_id, ?difficulty, "Created AI match");

        self.attach_ai(&mut game, Side::Right, difficulty);
        let assignment = self.seat_joiner(&mut game, Side::Left, participant);
        self.matches.insert(match_id, game);
        assignment
    }

    fn seat_joiner(&self, game: &mut GameMatch, side: Side, participant: Participant) -> Assignment {
        let conn_id = participant.conn_id;
        let joiner = participant.clone();
        game.seat_human(side, participant);
        self.connections.insert(conn_id, game.id);

        let players_in_room = game.occupied_seats();
        joiner.send(ServerMsg::PlayerAssignment {
            side,
            room_id: game.id,
            players_in_room,
            message: format!("You are the {} paddle", side_label(side)),
        });

        if game.is_ready() {
            game.broadcast(&ServerMsg::GameReady {
                message: "Game starting".to_string(),
            });
        } else {
            joiner.send(ServerMsg::WaitingForPlayer {
                message: "Waiting for an opponent".to_string(),
            });
        }

        info!(
            match_id = %game.id,
            conn_id = %conn_id,
            ?side,
            players_in_room,
            "Player seated"
        );

        Assignment {
            match_id: game.id,
            side,
        }
    }

    /// Remove a connection from its match. Empty matches are destroyed;
    /// a lone human left in a PvP match gets an AI opponent when backfill is on.
    pub fn leave(&self, conn_id: ConnectionId) {
        let _guard = self.matchmaking.lock();

        let Some((_, match_id)) = self.connections.remove(&conn_id) else {
            return;
        };
        let Some(mut game) = self.matches.get_mut(&match_id) else {
            return;
        };
        let Some(side) = game.side_of(conn_id) else {
            return;
        };

        game.vacate(side);
        info!(match_id = %match_id, conn_id = %conn_id, ?side, "Player left match");

        if game.human_count() == 0 {
            game.destroy();
            return;
        }

        game.broadcast(&ServerMsg::PlayerDisconnected {
            message: "Your opponent disconnected".to_string(),
        });

        if game.ai().is_none() && self.ai_backfill {
            let difficulty = game.difficulty;
            self.attach_ai(&mut game, side, difficulty);
            game.broadcast(&ServerMsg::GameReady {
                message: "An AI opponent has taken over".to_string(),
            });
        } else if !game.is_ready() {
            game.broadcast(&ServerMsg::WaitingForPlayer {
                message: "Waiting for an opponent".to_string(),
            });
        }
    }

    /// Replace the AI profile of an AI-backed match and restart its timer
    pub fn set_difficulty(&self, match_id: MatchId, difficulty: Difficulty) -> Result<(), MatchError> {
        let _guard = self.matchmaking.lock();

        let mut game = self
            .matches
            .get_mut(&match_id)
            .ok_or(MatchError::NotFound(match_id))?;
        if game.ai().is_none() {
            return Err(MatchError::NotAiBacked(match_id));
        }

        let timer = self.spawn_ai_timer(match_id, AiProfile::for_difficulty(difficulty));
        game.difficulty = difficulty;
        if let Some(ai) = game.ai_mut() {
            let previous = ai.difficulty();
            ai.restart(difficulty, timer);
            info!(match_id = %match_id, from = ?previous, to = ?difficulty, "AI difficulty changed");
        }

        Ok(())
    }

    /// Route paddle input to the connection's own paddle
    pub fn apply_input(&self, conn_id: ConnectionId, input: PaddleInput) -> Result<(), MatchError> {
        let match_id = self.match_of(&conn_id).ok_or(MatchError::NotSeated(conn_id))?;
        let mut game = self
            .matches
            .get_mut(&match_id)
            .ok_or(MatchError::NotFound(match_id))?;
        let side = game.side_of(conn_id).ok_or(MatchError::NotSeated(conn_id))?;

        game.apply_input(side, input);
        Ok(())
    }

    fn attach_ai(&self, game: &mut GameMatch, side: Side, difficulty: Difficulty) {
        let mut controller = AiController::new(side, difficulty, game.next_seed());
        controller.set_timer(self.spawn_ai_timer(game.id, controller.profile()));
        game.seat_ai(controller);
        info!(match_id = %game.id, ?side, ?difficulty, "AI attached");
    }

    fn spawn_ai_timer(&self, match_id: MatchId, profile: AiProfile) -> RepeatingTask {
        let token = CancelToken::new();
        let cycle_token = token.clone();
        let registry = self.this.clone();

        RepeatingTask::spawn(profile.refresh_period, token, move || {
            registry
                .upgrade()
                .is_some_and(|registry| registry.run_ai_cycle(match_id, &cycle_token))
        })
    }

    /// One AI refresh for `match_id`. The token is checked under the match
    /// guard, so a detached controller never touches the match again.
    fn run_ai_cycle(&self, match_id: MatchId, token: &CancelToken) -> bool {
        let Some(mut game) = self.matches.get_mut(&match_id) else {
            debug!(match_id = %match_id, "AI timer outlived its match");
            return false;
        };
        if token.is_cancelled() {
            return false;
        }
        game.run_ai_cycle()
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Left => "left",
        Side::Right => "right",
    }
}
