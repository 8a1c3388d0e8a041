// Conductor Integration Tests
//
// Scenario tests that cross crate boundaries: store, services, backplane and
// node wiring together.

/// Shared setup for the scenario tests
pub mod utils {
    use std::sync::Arc;
    use std::time::Duration;

    use conductor_cluster::{InMemoryTransport, PubSubBackplane};
    use conductor_core::{
        ActivityService, ClusterBackplane, DefinitionService, StateRepositories,
    };
    use conductor_test_utils::{CountingDefinitionRepository, RecordingWorkflowLoader, TestStore};

    /// Fresh in-memory store with indexes in place
    pub async fn store() -> anyhow::Result<TestStore> {
        Ok(TestStore::new().await?)
    }

    /// Activity service with a fast poll, so idle workers give up quickly
    pub fn activity_service(repos: &StateRepositories) -> ActivityService {
        ActivityService::new(repos.subscriptions.clone(), repos.events.clone())
            .with_poll_interval(Duration::from_millis(5))
    }

    /// One simulated engine node joined to a shared hub and store
    pub struct ClusterNode {
        /// Backplane of this node
        pub backplane: Arc<PubSubBackplane>,
        /// Loader and registry stand-in
        pub loader: Arc<RecordingWorkflowLoader>,
        /// Definition store as seen by this node's backplane
        pub definitions: Arc<CountingDefinitionRepository>,
        /// Definition service wired to this node's backplane
        pub service: DefinitionService,
    }

    /// Join a node to `hub`, sharing `repos`
    pub fn cluster_node(hub: &InMemoryTransport, repos: &StateRepositories) -> ClusterNode {
        let loader = Arc::new(RecordingWorkflowLoader::new());
        let definitions = Arc::new(CountingDefinitionRepository::new(repos.definitions.clone()));
        let backplane = Arc::new(PubSubBackplane::new(
            Arc::new(hub.connect()),
            definitions.clone(),
            loader.clone(),
        ));
        let service = DefinitionService::new(
            repos.definitions.clone(),
            loader.clone(),
            loader.clone(),
            backplane.clone() as Arc<dyn ClusterBackplane>,
        );
        ClusterNode {
            backplane,
            loader,
            definitions,
            service,
        }
    }
}
