//! The `transport` module handles network communication with observers
//! over WebSockets.
//!
//! It implements the listener and upgrade entrypoint, the messages the
//! server sends on its own behalf, and the framing used when several queued
//! payloads go out in one write.

pub mod frame;
pub mod message;
pub mod websocket;

pub use message::ServerMessage;
pub use websocket::{serve, start_websocket_server, upgrade};

#[cfg(test)]
mod tests;
