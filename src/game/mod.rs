//! Game simulation modules

pub mod ai;
pub mod r#match;
pub mod physics;
pub mod scheduler;
pub mod snapshot;

pub use r#match::{ConnectionId, GameMatch, MatchId, MatchPhase, PaddleInput, Participant};
pub use scheduler::PhysicsScheduler;
