//! Multi-node backplane for Conductor.
//!
//! Nodes share one pub/sub channel. When a node registers a definition version it
//! announces it, and every other node fetches that version from the shared store and
//! hands it to its local loader.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backplane;
pub mod transport;

#[cfg(feature = "redis")]
pub mod redis;

pub use backplane::{handle_notification, PubSubBackplane, DEFAULT_CHANNEL};
pub use transport::{InMemoryTransport, PubSubTransport};

#[cfg(feature = "redis")]
pub use crate::redis::RedisTransport;
