//! Matchmaking and match registry

pub mod registry;

pub use registry::{Assignment, MatchRegistry};
