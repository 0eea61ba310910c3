//! The `error` module defines the error type shared across `lineage-hub`.
//!
//! Transport failures inside a connection never surface here: they end the
//! affected connection and are reported through its `DisconnectReason`.
//! `HubError` covers what callers of the public API can observe.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// The hub dispatch loop has stopped and no longer accepts requests.
    #[error("hub is not running")]
    Closed,

    /// A publisher handed over a value that could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}
