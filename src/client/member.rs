use bytes::Bytes;
use tokio::sync::mpsc::Sender;

pub type ClientId = String;

/// Generates a fresh identity for a connection.
pub fn new_client_id() -> ClientId {
    format!("client-{}", uuid::Uuid::new_v4())
}

/// A registered observer as seen by the hub.
///
/// The hub only ever offers payloads into `sender`; the receiving half
/// belongs to the connection's outbound loop. Dropping the `Client` closes
/// that queue, which is how the hub tells a connection it has been removed.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for the client.
    pub id: ClientId,

    /// Bounded outbound queue of the connection.
    pub sender: Sender<Bytes>,
}

impl Client {
    pub fn new(id: ClientId, sender: Sender<Bytes>) -> Self {
        Self { id, sender }
    }
}
