use serde::{Deserialize, Serialize};

pub const CONNECTED_NOTICE: &str = "WebSocket connection established";

/// Messages the server itself sends to an observer, as opposed to the
/// published payloads it relays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after the connection has been registered.
    Connected { message: String },
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::Connected {
            message: CONNECTED_NOTICE.to_string(),
        }
    }
}
