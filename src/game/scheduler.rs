//! Fixed-rate physics loop over every ready match

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::matchmaking::MatchRegistry;
use crate::util::time::{tick_duration, SIMULATION_TPS};

use super::snapshot::game_update;

/// Drives every ready match forward one step per tick and broadcasts
/// the result to that match's connections
pub struct PhysicsScheduler {
    registry: Arc<MatchRegistry>,
    ticks: u64,
}

impl PhysicsScheduler {
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self { registry, ticks: 0 }
    }

    /// Run the authoritative tick loop
    pub async fn run(mut self) {
        info!(tps = SIMULATION_TPS, "Physics scheduler started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            self.tick();
        }
    }

    /// One scheduler firing: step and broadcast ready matches, then evict dead ones
    pub fn tick(&mut self) {
        self.ticks += 1;

        for mut entry in self.registry.matches().iter_mut() {
            let game = entry.value_mut();
            if !game.is_ready() {
                continue;
            }
            game.step();
            game.broadcast(&game_update(game));
        }

        self.registry.matches().retain(|match_id, game| {
            if game.is_defunct() {
                game.destroy();
                info!(match_id = %match_id, "Match evicted");
                false
            } else {
                true
            }
        });

        if self.ticks % (SIMULATION_TPS as u64 * 10) == 0 {
            debug!(
                active_matches = self.registry.active_matches(),
                players = self.registry.total_players(),
                "Scheduler heartbeat"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchPhase, Participant};
    use crate::ws::protocol::{Difficulty, ServerMsg};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn participant() -> (Participant, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(256);
        (Participant::new(Uuid::new_v4(), tx), rx)
    }

    fn updates(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMsg::GameUpdate { .. }) {
                out.push(msg);
            }
        }
        out
    }

    #[tokio::test]
    async fn waiting_match_is_never_stepped_or_broadcast() {
        let registry = MatchRegistry::new(true);
        let (p, mut rx) = participant();
        let a = registry.join_pvp(p);
        let ball_before = registry.matches().get(&a.match_id).unwrap().ball;

        let mut scheduler = PhysicsScheduler::new(registry.clone());
        for _ in 0..10 {
            scheduler.tick();
        }

        assert!(updates(&mut rx).is_empty());
        let game = registry.matches().get(&a.match_id).unwrap();
        assert_eq!(game.phase, MatchPhase::Waiting);
        assert_eq!(game.ball, ball_before);
        assert_eq!(game.tick, 0);
    }

    #[tokio::test]
    async fn ready_match_broadcasts_every_tick() {
        let registry = MatchRegistry::new(true);
        let (p1, mut rx1) = participant();
        let (p2, mut rx2) = participant();
        registry.join_pvp(p1);
        registry.join_pvp(p2);

        let mut scheduler = PhysicsScheduler::new(registry.clone());
        for _ in 0..5 {
            scheduler.tick();
        }

        assert_eq!(updates(&mut rx1).len(), 5);
        assert_eq!(updates(&mut rx2).len(), 5);
    }

    #[tokio::test]
    async fn destroyed_match_is_evicted() {
        let registry = MatchRegistry::new(true);
        let (p, _rx) = participant();
        let conn = p.conn_id;
        registry.join_vs_ai(p, Difficulty::Easy);
        registry.leave(conn);
        assert_eq!(registry.active_matches(), 1);

        let mut scheduler = PhysicsScheduler::new(registry.clone());
        scheduler.tick();
        assert_eq!(registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn ai_paddle_moves_without_input() {
        let registry = MatchRegistry::new(true);
        let (p, mut rx) = participant();
        let a = registry.join_vs_ai(p, Difficulty::Easy);
        let start_y = {
            let mut game = registry.matches().get_mut(&a.match_id).unwrap();
            game.ball.x = 400.0;
            game.ball.y = 30.0;
            game.ball.vx = 2.0;
            game.ball.vy = 0.0;
            game.right.y
        };

        let mut scheduler = PhysicsScheduler::new(registry.clone());
        for _ in 0..10 {
            {
                let mut game = registry.matches().get_mut(&a.match_id).unwrap();
                game.run_ai_cycle();
            }
            scheduler.tick();
        }

        let right_ys: Vec<f32> = updates(&mut rx)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMsg::GameUpdate { player2, .. } => Some(player2.y),
                _ => None,
            })
            .collect();
        assert_eq!(right_ys.len(), 10);
        assert!(right_ys.last().copied().unwrap() < start_y);
    }
}
