//! The `hub` module holds the registry of connected observers and the
//! broadcast dispatch loop, plus the lineage update payloads published
//! through it.

pub mod engine;
pub mod message;

pub use engine::{Hub, HubHandle};
pub use message::LineageUpdate;

#[cfg(test)]
mod tests;
