//! WebSocket transport and session gateway

pub mod handler;
pub mod protocol;
pub mod session;

pub use session::SessionGateway;
