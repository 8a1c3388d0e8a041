//! Definition registration and cluster-wide convergence.
//!
//! Registering a version writes it to the store and announces it; peers that
//! miss the announcement converge on their next storage sweep.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::backplane::ClusterBackplane;
use super::registry::{WorkflowLoader, WorkflowRegistry};
use crate::domain::definition::Definition;
use crate::domain::repository::DefinitionRepository;
use crate::CoreError;

/// Service owning the lifecycle of stored workflow definitions
pub struct DefinitionService {
    repository: Arc<dyn DefinitionRepository>,
    loader: Arc<dyn WorkflowLoader>,
    registry: Arc<dyn WorkflowRegistry>,
    backplane: Arc<dyn ClusterBackplane>,
}

impl DefinitionService {
    /// Create a new definition service
    pub fn new(
        repository: Arc<dyn DefinitionRepository>,
        loader: Arc<dyn WorkflowLoader>,
        registry: Arc<dyn WorkflowRegistry>,
        backplane: Arc<dyn ClusterBackplane>,
    ) -> Self {
        Self {
            repository,
            loader,
            registry,
            backplane,
        }
    }

    /// Load the latest version of every stored definition locally.
    ///
    /// A definition that fails to load is logged and skipped. Returns how
    /// many loaded.
    #[instrument(skip(self))]
    pub async fn load_definitions_from_storage(&self) -> Result<usize, CoreError> {
        let definitions = self.repository.get_all().await?;
        let mut loaded = 0;

        for definition in &definitions {
            match self.loader.load_definition(definition) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(
                    definition_id = %definition.id,
                    version = definition.version,
                    error = %e,
                    "Failed to load stored definition"
                ),
            }
        }

        info!(loaded, total = definitions.len(), "Loaded definitions from storage");
        Ok(loaded)
    }

    /// Register `definition` as the next version of its id.
    ///
    /// The version becomes latest + 1, or 1 for a new id. Returns the stored
    /// definition.
    #[instrument(skip(self, definition), fields(definition_id = %definition.id))]
    pub async fn register_new_definition(
        &self,
        mut definition: Definition,
    ) -> Result<Definition, CoreError> {
        if definition.id.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Definition id must not be empty".to_string(),
            ));
        }

        let latest = self.repository.get_latest_version(&definition.id).await?;
        definition.version = latest.map_or(1, |v| v + 1);

        self.loader.load_definition(&definition)?;
        self.repository.save(&definition).await?;
        self.backplane.announce(&definition.id, definition.version);

        info!(version = definition.version, "Registered new definition version");
        Ok(definition)
    }

    /// Overwrite an existing version in place
    #[instrument(skip(self, definition), fields(definition_id = %definition.id, version = definition.version))]
    pub async fn replace_version(&self, definition: &Definition) -> Result<(), CoreError> {
        if self
            .registry
            .is_registered(&definition.id, definition.version)
        {
            self.registry
                .deregister_workflow(&definition.id, definition.version);
        }

        self.loader.load_definition(definition)?;
        self.repository.save(definition).await?;
        self.backplane.announce(&definition.id, definition.version);

        info!("Replaced definition version");
        Ok(())
    }

    /// Latest stored version of `id`
    pub async fn get_definition(&self, id: &str) -> Result<Definition, CoreError> {
        self.repository
            .find_latest(id)
            .await?
            .ok_or_else(|| CoreError::DefinitionNotFound(id.to_string()))
    }

    /// Latest stored version of every definition
    pub async fn get_all_definitions(&self) -> Result<Vec<Definition>, CoreError> {
        self.repository.get_all().await
    }

    /// Unload the latest version and delete every stored version.
    ///
    /// Returns `false` when nothing was stored under `id`.
    #[instrument(skip(self))]
    pub async fn delete_definition(&self, id: &str) -> Result<bool, CoreError> {
        let Some(latest) = self.repository.find_latest(id).await? else {
            return Ok(false);
        };

        self.registry.deregister_workflow(&latest.id, latest.version);
        self.repository.delete(id).await?;

        info!(version = latest.version, "Deleted definition");
        Ok(true)
    }
}
