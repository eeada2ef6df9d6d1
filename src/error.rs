//! Error types for the sensor hub
//!
//! Faults in the hub are absorbed into state transitions wherever possible.
//! `HubError` is what the fallible edges (configuration, logging setup,
//! frame parsing, socket plumbing) hand back internally so the caller can
//! decide between "drop the frame" and "reset and reconnect".

use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Error types for hub operations
#[derive(Error, Debug)]
pub enum HubError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// WebSocket protocol errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame arrived but is not a recognisable gateway message
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Device hint did not resolve to any known slot
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Socket is not open
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed frame error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create an unknown device error
    pub fn unknown_device<S: Into<String>>(hint: S) -> Self {
        Self::UnknownDevice(hint.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a not-connected error
    pub fn not_connected<S: Into<String>>(msg: S) -> Self {
        Self::NotConnected(msg.into())
    }

    /// Transport faults are recovered by resetting devices and reconnecting;
    /// everything else is a per-frame problem and is simply dropped.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::Connection(_)
                | HubError::WebSocket(_)
                | HubError::Timeout(_)
                | HubError::NotConnected(_)
                | HubError::Io(_)
        )
    }

    /// Short machine-readable category used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            HubError::Connection(_) | HubError::Timeout(_) | HubError::NotConnected(_) => {
                "transport"
            }
            HubError::WebSocket(_) | HubError::Io(_) => "socket",
            HubError::Json(_) | HubError::MalformedFrame(_) => "frame",
            HubError::UnknownDevice(_) => "device",
            HubError::Config(_) => "configuration",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                HubError::connection("WebSocket closed")
            }
            WsError::Io(e) => HubError::Io(e),
            other => HubError::WebSocket(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for HubError {
    fn from(err: config::ConfigError) -> Self {
        HubError::config(err.to_string())
    }
}

impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::config(format!("Invalid gateway URL: {err}"))
    }
}
