//! Session gateway - per-connection session records and message dispatch

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::{ConnectionId, PaddleInput, Participant};
use crate::matchmaking::{Assignment, MatchRegistry};
use crate::ws::protocol::{ClientMsg, Difficulty, GameMode, ServerMsg};

/// Outbound queue depth per connection
const OUTBOX_CAPACITY: usize = 64;

/// Per-connection state, owned by the gateway
#[derive(Debug)]
pub struct Session {
    pub conn_id: ConnectionId,
    outbox: mpsc::Sender<ServerMsg>,
    pub assignment: Option<Assignment>,
}

/// Maps transport connections onto registry operations
pub struct SessionGateway {
    sessions: DashMap<ConnectionId, Session>,
    registry: Arc<MatchRegistry>,
}

impl SessionGateway {
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
        }
    }

    /// Open a session; the receiver yields everything the server sends it
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMsg>) {
        let conn_id = Uuid::new_v4();
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.sessions.insert(
            conn_id,
            Session {
                conn_id,
                outbox,
                assignment: None,
            },
        );
        debug!(conn_id = %conn_id, "Session opened");
        (conn_id, rx)
    }

    /// Close a session and free its seat
    pub fn disconnect(&self, conn_id: ConnectionId) {
        if let Some((_, session)) = self.sessions.remove(&conn_id) {
            if session.assignment.is_some() {
                self.registry.leave(session.conn_id);
            }
            info!(conn_id = %session.conn_id, "Session closed");
        }
    }

    pub fn assignment(&self, conn_id: &ConnectionId) -> Option<Assignment> {
        self.sessions.get(conn_id).and_then(|s| s.assignment)
    }

    /// Dispatch one inbound message. Out-of-context messages are dropped.
    pub fn handle(&self, conn_id: ConnectionId, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinGame { mode, level } => self.join(conn_id, mode, level.unwrap_or_default()),
            ClientMsg::PaddleMove { y } => self.input(conn_id, PaddleInput::MoveTo(y)),
            ClientMsg::KeyPress { key } => self.input(conn_id, PaddleInput::Press(key)),
            ClientMsg::KeyRelease { key } => self.input(conn_id, PaddleInput::Release(key)),
            ClientMsg::SetDifficulty { level } => {
                let Some(assignment) = self.assignment(&conn_id) else {
                    debug!(conn_id = %conn_id, "setDifficulty before assignment ignored");
                    return;
                };
                if let Err(e) = self.registry.set_difficulty(assignment.match_id, level) {
                    debug!(conn_id = %conn_id, error = %e, "setDifficulty ignored");
                }
            }
        }
    }

    fn join(&self, conn_id: ConnectionId, mode: GameMode, level: Difficulty) {
        let Some(mut session) = self.sessions.get_mut(&conn_id) else {
            return;
        };

        // Rejoining gives up the current seat first
        if session.assignment.take().is_some() {
            self.registry.leave(conn_id);
        }

        let participant = Participant::new(conn_id, session.outbox.clone());
        let assignment = match mode {
            GameMode::Pvp => self.registry.join_pvp(participant),
            GameMode::Ai => self.registry.join_vs_ai(participant, level),
        };
        debug!(
            conn_id = %conn_id,
            match_id = %assignment.match_id,
            side = ?assignment.side,
            "Session assigned"
        );
        session.assignment = Some(assignment);
    }

    fn input(&self, conn_id: ConnectionId, input: PaddleInput) {
        if self.assignment(&conn_id).is_none() {
            debug!(conn_id = %conn_id, "Input before assignment ignored");
            return;
        }
        if let Err(e) = self.registry.apply_input(conn_id, input) {
            debug!(conn_id = %conn_id, error = %e, "Input ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PhysicsScheduler;
    use crate::ws::protocol::{Key, Side};
    use tokio_test::assert_ok;

    fn gateway() -> (SessionGateway, Arc<MatchRegistry>) {
        let registry = MatchRegistry::new(true);
        (SessionGateway::new(registry.clone()), registry)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn assigned_side(msgs: &[ServerMsg]) -> Option<Side> {
        msgs.iter().find_map(|m| match m {
            ServerMsg::PlayerAssignment { side, .. } => Some(*side),
            _ => None,
        })
    }

    fn has_game_ready(msgs: &[ServerMsg]) -> bool {
        msgs.iter().any(|m| matches!(m, ServerMsg::GameReady { .. }))
    }

    #[tokio::test]
    async fn two_pvp_joins_get_opposite_sides_and_both_ready() {
        let (gateway, _registry) = gateway();
        let (c1, mut rx1) = gateway.connect();
        let (c2, mut rx2) = gateway.connect();

        gateway.handle(c1, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        let first = drain(&mut rx1);
        assert_eq!(assigned_side(&first), Some(Side::Left));
        assert!(!has_game_ready(&first));

        gateway.handle(c2, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        let second = drain(&mut rx2);
        assert_eq!(assigned_side(&second), Some(Side::Right));
        assert!(has_game_ready(&second));
        assert!(has_game_ready(&drain(&mut rx1)));
    }

    #[tokio::test]
    async fn ai_join_is_ready_immediately() {
        let (gateway, _registry) = gateway();
        let (c, mut rx) = gateway.connect();
        gateway.handle(
            c,
            ClientMsg::JoinGame {
                mode: GameMode::Ai,
                level: Some(Difficulty::Easy),
            },
        );

        let first = assert_ok!(rx.try_recv());
        assert!(matches!(first, ServerMsg::PlayerAssignment { side: Side::Left, .. }));
        let second = assert_ok!(rx.try_recv());
        assert!(matches!(second, ServerMsg::GameReady { .. }));
    }

    #[tokio::test]
    async fn input_before_assignment_is_ignored() {
        let (gateway, registry) = gateway();
        let (c, mut rx) = gateway.connect();
        gateway.handle(c, ClientMsg::PaddleMove { y: 10.0 });
        gateway.handle(c, ClientMsg::KeyPress { key: Key::Up });
        gateway.handle(c, ClientMsg::SetDifficulty { level: Difficulty::Hard });

        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn key_press_is_seen_by_the_next_tick() {
        let (gateway, registry) = gateway();
        let (c1, _rx1) = gateway.connect();
        let (c2, _rx2) = gateway.connect();
        gateway.handle(c1, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        gateway.handle(c2, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        let match_id = gateway.assignment(&c1).unwrap().match_id;
        let start = registry.matches().get(&match_id).unwrap().left.y;

        gateway.handle(c1, ClientMsg::KeyPress { key: Key::Down });
        assert_eq!(registry.matches().get(&match_id).unwrap().left.y, start);

        PhysicsScheduler::new(registry.clone()).tick();
        assert!(registry.matches().get(&match_id).unwrap().left.y > start);
    }

    #[tokio::test]
    async fn disconnect_frees_seat_and_backfills() {
        let (gateway, registry) = gateway();
        let (c1, mut rx1) = gateway.connect();
        let (c2, _rx2) = gateway.connect();
        gateway.handle(c1, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        gateway.handle(c2, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        drain(&mut rx1);

        gateway.disconnect(c2);

        let msgs = drain(&mut rx1);
        assert!(matches!(msgs[0], ServerMsg::PlayerDisconnected { .. }));
        let match_id = gateway.assignment(&c1).unwrap().match_id;
        assert!(registry.matches().get(&match_id).unwrap().ai().is_some());
        assert_eq!(registry.match_of(&c2), None);
    }

    #[tokio::test]
    async fn rejoin_leaves_previous_match() {
        let (gateway, registry) = gateway();
        let (c, _rx) = gateway.connect();
        gateway.handle(c, ClientMsg::JoinGame { mode: GameMode::Pvp, level: None });
        let first = gateway.assignment(&c).unwrap().match_id;

        gateway.handle(c, ClientMsg::JoinGame { mode: GameMode::Ai, level: None });
        let second = gateway.assignment(&c).unwrap().match_id;

        assert_ne!(first, second);
        assert_eq!(registry.match_of(&c), Some(second));
        assert!(registry.matches().get(&first).unwrap().is_defunct());
    }
}
