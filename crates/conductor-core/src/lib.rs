//!
//! Conductor Core - durable state and coordination contracts
//!
//! This crate defines the entities the workflow engine persists, the
//! repository traits every document store implements, the cluster backplane
//! contract, and the services built on top of them: definition registration
//! and worker activity leases.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, index catalogue and repository traits
pub mod domain;

/// Application services - backplane, definitions and activities
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

pub use error::CoreError;
pub use types::{from_ticks, to_ticks, Ticks};

pub use domain::definition::Definition;
pub use domain::event::{Event, EventId, ACTIVITY_EVENT_NAME};
pub use domain::execution_error::ExecutionError;
pub use domain::indexes::{Collection, IndexDescriptor, IndexSpec, LEGACY_INDEXES, REQUIRED_INDEXES};
pub use domain::repository::{
    command_handler, CommandHandler, DefinitionRepository, DrainSummary, EventRepository,
    ExecutionErrorRepository, IndexManager, ResourceRepository, ScheduledCommandRepository,
    StateRepositories, SubscriptionRepository, WorkflowRepository,
};
pub use domain::resource::{Bucket, Resource};
pub use domain::scheduled_command::ScheduledCommand;
pub use domain::subscription::{EventSubscription, Lease, SubscriptionId};
pub use domain::workflow_instance::{
    InstanceFilter, WorkflowInstance, WorkflowInstanceId, WorkflowStatus,
};

pub use application::activity_service::{
    ActivityResult, ActivityService, ActivityStatus, ActivityToken, PendingActivity,
};
pub use application::backplane::{
    ClusterBackplane, LocalBackplane, NewDefinitionNotification, NodeId,
};
pub use application::definition_service::DefinitionService;
pub use application::registry::{WorkflowLoader, WorkflowRegistry};
