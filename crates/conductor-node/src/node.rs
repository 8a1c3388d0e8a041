//! Wiring of store, backplane and services for one node.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use conductor_cluster::PubSubBackplane;
use conductor_core::{
    ActivityService, ClusterBackplane, DefinitionService, LocalBackplane, StateRepositories,
};
use conductor_state_inmemory::InMemoryStateStoreProvider;
use conductor_state_postgres::{PostgresConfig, PostgresStateStoreProvider};

use crate::config::{NodeConfig, StoreKind};
use crate::error::{NodeError, NodeResult};
use crate::registry::InMemoryWorkflowRegistry;

/// Open the configured document store
pub async fn open_store(config: &NodeConfig) -> NodeResult<StateRepositories> {
    match config.store_kind()? {
        StoreKind::InMemory => {
            info!("Using in-memory document store");
            Ok(InMemoryStateStoreProvider::new().create_repositories())
        }
        StoreKind::Postgres => {
            info!(
                max_connections = config.max_connections,
                "Using PostgreSQL document store"
            );
            let provider = PostgresStateStoreProvider::with_config(PostgresConfig {
                connection_string: config.store_url.clone(),
                max_connections: config.max_connections,
                acquire_timeout_secs: config.acquire_timeout_secs,
                run_migrations: true,
            })
            .await
            .map_err(|e| NodeError::StoreError(e.to_string()))?;
            Ok(provider.create_repositories())
        }
    }
}

/// Build the backplane the configuration asks for
pub async fn build_backplane(
    config: &NodeConfig,
    repos: &StateRepositories,
    registry: Arc<InMemoryWorkflowRegistry>,
) -> NodeResult<Arc<dyn ClusterBackplane>> {
    let Some(redis_url) = &config.redis_url else {
        info!("No Redis configured, running as a single node");
        return Ok(Arc::new(LocalBackplane::new()));
    };

    let transport = connect_transport(redis_url).await?;
    let backplane = PubSubBackplane::new(transport, repos.definitions.clone(), registry)
        .with_channel(config.backplane_channel.clone());
    info!(node_id = %backplane.node_id(), channel = %config.backplane_channel, "Using Redis backplane");
    Ok(Arc::new(backplane))
}

#[cfg(feature = "redis")]
async fn connect_transport(
    redis_url: &str,
) -> NodeResult<Arc<dyn conductor_cluster::PubSubTransport>> {
    let transport = conductor_cluster::RedisTransport::connect(redis_url)
        .await
        .map_err(|e| NodeError::BackplaneError(e.to_string()))?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "redis"))]
async fn connect_transport(
    redis_url: &str,
) -> NodeResult<Arc<dyn conductor_cluster::PubSubTransport>> {
    Err(NodeError::ConfigError(format!(
        "Redis backplane requested ({}) but this build lacks the `redis` feature",
        redis_url
    )))
}

/// A running coordination node
pub struct ConductorNode {
    repos: StateRepositories,
    registry: Arc<InMemoryWorkflowRegistry>,
    backplane: Arc<dyn ClusterBackplane>,
    definitions: Arc<DefinitionService>,
    activities: Arc<ActivityService>,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl ConductorNode {
    /// Open the store, prepare indexes and build the backplane
    pub async fn build(config: &NodeConfig) -> NodeResult<Self> {
        let repos = open_store(config).await?;
        repos.indexes.ensure_indexes().await?;

        let registry = Arc::new(InMemoryWorkflowRegistry::new());
        let backplane = build_backplane(config, &repos, registry.clone()).await?;
        Ok(Self::assemble(repos, registry, backplane))
    }

    /// Node over an already opened store and backplane
    pub fn assemble(
        repos: StateRepositories,
        registry: Arc<InMemoryWorkflowRegistry>,
        backplane: Arc<dyn ClusterBackplane>,
    ) -> Self {
        let definitions = Arc::new(DefinitionService::new(
            repos.definitions.clone(),
            registry.clone(),
            registry.clone(),
            backplane.clone(),
        ));
        let activities = Arc::new(ActivityService::new(
            repos.subscriptions.clone(),
            repos.events.clone(),
        ));

        Self {
            repos,
            registry,
            backplane,
            definitions,
            activities,
            sweep: Mutex::new(None),
        }
    }

    /// Load stored definitions, start the backplane and the periodic sweep
    pub async fn start(&self, sweep_interval: Option<Duration>) -> NodeResult<()> {
        let loaded = self.definitions.load_definitions_from_storage().await?;
        info!(loaded, "Loaded definitions from storage");

        self.backplane
            .start()
            .await
            .map_err(|e| NodeError::BackplaneError(e.to_string()))?;

        if let Some(period) = sweep_interval {
            let handle = spawn_sweep(self.definitions.clone(), period);
            let previous = match self.sweep.lock() {
                Ok(mut guard) => guard.replace(handle),
                Err(poisoned) => poisoned.into_inner().replace(handle),
            };
            if let Some(previous) = previous {
                previous.abort();
            }
        }
        Ok(())
    }

    /// Stop the sweep and the backplane
    pub async fn stop(&self) -> NodeResult<()> {
        let sweep = match self.sweep.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sweep) = sweep {
            sweep.abort();
        }

        self.backplane
            .stop()
            .await
            .map_err(|e| NodeError::BackplaneError(e.to_string()))?;
        info!("Node stopped");
        Ok(())
    }

    /// Start, wait for `shutdown`, then stop
    pub async fn run_until<F>(&self, sweep_interval: Option<Duration>, shutdown: F) -> NodeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start(sweep_interval).await?;
        info!("Node running");
        shutdown.await;
        info!("Shutdown requested");
        self.stop().await
    }

    /// Store repositories
    pub fn repositories(&self) -> &StateRepositories {
        &self.repos
    }

    /// Definitions loaded on this node
    pub fn registry(&self) -> &Arc<InMemoryWorkflowRegistry> {
        &self.registry
    }

    /// Definition lifecycle service
    pub fn definitions(&self) -> &Arc<DefinitionService> {
        &self.definitions
    }

    /// Worker-facing activity service
    pub fn activities(&self) -> &Arc<ActivityService> {
        &self.activities
    }

    /// The backplane in use
    pub fn backplane(&self) -> &Arc<dyn ClusterBackplane> {
        &self.backplane
    }
}

fn spawn_sweep(definitions: Arc<DefinitionService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match definitions.load_definitions_from_storage().await {
                Ok(loaded) => info!(loaded, "Definition sweep complete"),
                Err(e) if e.is_store_unavailable() => {
                    warn!(error = %e, "Definition sweep skipped, store unavailable")
                }
                Err(e) => error!(error = %e, "Definition sweep failed"),
            }
        }
    })
}
