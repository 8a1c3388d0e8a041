//! Conductor: durable state and cluster coordination for a workflow engine.
//!
//! This facade re-exports the workspace crates under one name.

pub use conductor_cluster as cluster;
pub use conductor_core as coordination;
pub use conductor_monitoring as monitoring;
pub use conductor_node as node;
pub use conductor_state_inmemory as state_inmemory;
pub use conductor_state_postgres as state_postgres;

pub use conductor_core::{CoreError, StateRepositories};
pub use conductor_node::{ConductorNode, NodeConfig};
