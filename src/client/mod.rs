//! The `client` module represents connected observers.
//!
//! `Client` is the hub's view of a member: its id and the sending half of
//! its outbound queue. `ClientActor` is the connection itself, bridging one
//! transport to the hub.

pub mod actor;
pub mod member;

pub use actor::{ClientActor, ConnectionState, DisconnectReason};
pub use member::{Client, ClientId, new_client_id};
