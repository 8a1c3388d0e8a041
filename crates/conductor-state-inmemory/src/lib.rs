//! In-memory document store for the Conductor coordination layer
//!
//! This crate implements every repository trait from conductor-core over
//! process-local maps. It backs single-node development setups and the test
//! suites. The lease grant runs under one write lock, so it is as atomic as
//! the conditional update of a real store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

pub mod repositories;
pub use repositories::{
    InMemoryDefinitionRepository, InMemoryEventRepository, InMemoryExecutionErrorRepository,
    InMemoryIndexManager, InMemoryResourceRepository, InMemoryScheduledCommandRepository,
    InMemorySubscriptionRepository, InMemoryWorkflowRepository,
};

use conductor_core::{
    Bucket, Collection, CoreError, Definition, Event, EventSubscription, ExecutionError,
    IndexDescriptor, Resource, ScheduledCommand, StateRepositories, WorkflowInstance,
};

/// Reachability switch shared by every repository of one provider
#[derive(Debug, Clone)]
pub struct StoreHealth(Arc<AtomicBool>);

impl StoreHealth {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Fail with `StateStoreError` while the store is marked unavailable
    pub fn check(&self) -> Result<(), CoreError> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StateStoreError(
                "In-memory store is unavailable".to_string(),
            ))
        }
    }
}

pub(crate) type Shared<T> = Arc<RwLock<T>>;

/// Key of a stored index: collection and index name
pub(crate) type IndexKey = (Collection, String);

/// Key of a stored resource: bucket, name and version
pub(crate) type ResourceKey = (Bucket, String, i32);

/// Provider for in-memory repositories sharing one set of collections
pub struct InMemoryStateStoreProvider {
    workflows: Shared<HashMap<String, WorkflowInstance>>,
    subscriptions: Shared<HashMap<String, EventSubscription>>,
    events: Shared<HashMap<String, Event>>,
    errors: Shared<Vec<ExecutionError>>,
    commands: Shared<Vec<ScheduledCommand>>,
    definitions: Shared<BTreeMap<(String, i32), Definition>>,
    resources: Shared<BTreeMap<ResourceKey, Resource>>,
    indexes: Shared<BTreeMap<IndexKey, IndexDescriptor>>,
    health: StoreHealth,
}

impl InMemoryStateStoreProvider {
    /// Create a new, empty provider
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(Vec::new())),
            commands: Arc::new(RwLock::new(Vec::new())),
            definitions: Arc::new(RwLock::new(BTreeMap::new())),
            resources: Arc::new(RwLock::new(BTreeMap::new())),
            indexes: Arc::new(RwLock::new(BTreeMap::new())),
            health: StoreHealth::new(),
        }
    }

    /// Create the full repository set over this provider's collections
    pub fn create_repositories(&self) -> StateRepositories {
        StateRepositories {
            workflows: Arc::new(InMemoryWorkflowRepository::new(
                self.workflows.clone(),
                self.subscriptions.clone(),
                self.health.clone(),
            )),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new(
                self.subscriptions.clone(),
                self.health.clone(),
            )),
            events: Arc::new(InMemoryEventRepository::new(
                self.events.clone(),
                self.health.clone(),
            )),
            errors: Arc::new(InMemoryExecutionErrorRepository::new(
                self.errors.clone(),
                self.health.clone(),
            )),
            commands: Arc::new(InMemoryScheduledCommandRepository::new(
                self.commands.clone(),
                self.health.clone(),
            )),
            definitions: Arc::new(InMemoryDefinitionRepository::new(
                self.definitions.clone(),
                self.health.clone(),
            )),
            resources: Arc::new(InMemoryResourceRepository::new(
                self.resources.clone(),
                self.health.clone(),
            )),
            indexes: Arc::new(self.index_manager()),
        }
    }

    /// Index manager over this provider's index table
    pub fn index_manager(&self) -> InMemoryIndexManager {
        InMemoryIndexManager::new(self.indexes.clone(), self.health.clone())
    }

    /// Simulate the backing store going away or coming back
    pub fn set_available(&self, available: bool) {
        if !available {
            warn!("In-memory store marked unavailable");
        }
        self.health.0.store(available, Ordering::SeqCst);
    }

    /// Number of execution errors recorded so far
    pub async fn error_count(&self) -> usize {
        self.errors.read().await.len()
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
