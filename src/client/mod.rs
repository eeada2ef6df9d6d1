//! Gateway transport
//!
//! One persistent WebSocket to the sensor gateway, reopened after a fixed
//! delay whenever it drops.

pub mod gateway_client;
pub mod reconnect;

pub use gateway_client::{ClientStats, GatewayClient};
pub use reconnect::ReconnectPolicy;

use serde::Serialize;
use std::fmt;

/// Transport state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
