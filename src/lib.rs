//! # lineage-hub
//!
//! `lineage-hub` pushes lineage graph updates to every connected observer in
//! near real time over WebSockets. Publishers hand it already-serialized
//! payloads; it fans each one out to all live connections, evicts observers
//! that cannot keep up and keeps idle connections alive with ping/pong.
//!
//! ## Core Modules
//!
//! - `hub`: the registry of connected observers and the broadcast dispatch loop.
//! - `client`: one actor per connection, bridging its transport to the hub.
//! - `config`: loads server, hub and connection settings.
//! - `transport`: the WebSocket listener, upgrade entrypoint and framing.
//! - `utils`: error type and logging setup.

pub mod client;
pub mod config;
pub mod hub;
pub mod transport;
pub mod utils;
