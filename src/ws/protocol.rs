//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which paddle a seat controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Sign of horizontal velocity for a ball travelling away from this side
    pub fn away_sign(self) -> f32 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }
}

/// Directional key, as pressed by a human or the AI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Up,
    Down,
}

/// AI difficulty tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Slow and noisy
    Easy,
    #[default]
    Medium,
    /// Fast and precise
    Hard,
}

/// Matchmaking mode requested by `joinGame`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "PVP")]
    Pvp,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Request a seat in a match
    JoinGame {
        mode: GameMode,
        /// Only meaningful for AI mode. An unknown level fails the whole
        /// message, so the join is dropped rather than run at a default.
        #[serde(default)]
        level: Option<Difficulty>,
    },

    /// Absolute paddle position reported by the client
    PaddleMove { y: f32 },

    KeyPress { key: Key },

    KeyRelease { key: Key },

    /// Change the AI opponent's difficulty
    SetDifficulty { level: Difficulty },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Seat assignment after `joinGame`
    PlayerAssignment {
        side: Side,
        #[serde(rename = "roomId")]
        room_id: Uuid,
        #[serde(rename = "playersInRoom")]
        players_in_room: usize,
        message: String,
    },

    /// Both seats are filled, simulation starts
    GameReady { message: String },

    WaitingForPlayer { message: String },

    /// Full match state, sent every tick to a ready match
    GameUpdate {
        ball: BallState,
        /// Left paddle
        player1: PaddleState,
        /// Right paddle
        player2: PaddleState,
    },

    PlayerDisconnected { message: String },
}

/// Ball state in a game update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
}

/// Paddle state in a game update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: u32,
}
