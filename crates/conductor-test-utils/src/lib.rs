//! Testing utilities for the Conductor coordination layer
//!
//! - [`builders`]: entity builders with sensible defaults
//! - [`fakes`]: recording stand-ins for the engine collaborators
//! - [`harness`]: a fully wired in-memory store

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestStore;
