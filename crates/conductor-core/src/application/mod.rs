/// Cluster backplane contract and the single-node backplane
pub mod backplane;

/// Local workflow registry collaborators
pub mod registry;

/// Definition registration and convergence
pub mod definition_service;

/// Worker-facing activity leases
pub mod activity_service;
