//! Connection layer for the hand-pose stream.
//!
//! Provides:
//! - Client-to-server wire messages
//! - `ConnectionManager` - single socket, reconnect, heartbeat, `set_active`
//! - `Connector` seam with a WebSocket implementation (feature: websocket)
//! - `SyncConfig` connection settings

pub mod config;
pub mod connector;
pub mod manager;
pub mod protocol;

#[cfg(test)]
mod testutil;

pub use config::SyncConfig;
pub use connector::{Connector, Socket, TransportError};
#[cfg(feature = "websocket")]
pub use connector::WsConnector;
pub use manager::ConnectionManager;
pub use protocol::ClientMessage;

/// Manager over real WebSockets.
#[cfg(feature = "websocket")]
pub type WsConnectionManager = ConnectionManager<WsConnector>;
