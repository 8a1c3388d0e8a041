//! In-memory store wired the way a node wires it.

use conductor_core::{CoreError, StateRepositories};
use conductor_state_inmemory::InMemoryStateStoreProvider;

/// Repositories over one fresh in-memory store, indexes already ensured
pub struct TestStore {
    /// The provider, for health toggles and inspection
    pub provider: InMemoryStateStoreProvider,
    /// Repositories sharing the provider's collections
    pub repos: StateRepositories,
}

impl TestStore {
    /// Fresh store
    pub async fn new() -> Result<Self, CoreError> {
        let provider = InMemoryStateStoreProvider::new();
        let repos = provider.create_repositories();
        repos.indexes.ensure_indexes().await?;
        Ok(Self { provider, repos })
    }
}
