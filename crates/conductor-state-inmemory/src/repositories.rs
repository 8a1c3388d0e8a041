use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use conductor_core::{
    domain::indexes::{LegacyIndex, LEGACY_INDEXES, REQUIRED_INDEXES},
    to_ticks, Bucket, Collection, CoreError, Definition, DefinitionRepository, Event, EventId,
    EventRepository, EventSubscription, ExecutionError, ExecutionErrorRepository,
    IndexDescriptor, IndexManager, InstanceFilter, Lease, Resource, ResourceRepository,
    ScheduledCommand, ScheduledCommandRepository, SubscriptionId, SubscriptionRepository, Ticks,
    WorkflowInstance, WorkflowInstanceId, WorkflowRepository,
};
use conductor_monitoring::metrics::StoreMetrics;

use crate::{IndexKey, ResourceKey, Shared, StoreHealth};

/// In-memory implementation of the WorkflowRepository
pub struct InMemoryWorkflowRepository {
    instances: Shared<HashMap<String, WorkflowInstance>>,
    subscriptions: Shared<HashMap<String, EventSubscription>>,
    health: StoreHealth,
}

impl InMemoryWorkflowRepository {
    /// Create a new in-memory workflow repository
    pub fn new(
        instances: Shared<HashMap<String, WorkflowInstance>>,
        subscriptions: Shared<HashMap<String, EventSubscription>>,
        health: StoreHealth,
    ) -> Self {
        Self {
            instances,
            subscriptions,
            health,
        }
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_new_workflow(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceId, CoreError> {
        self.health.check()?;
        let mut stored = instance.clone();
        if stored.id.is_empty() {
            stored.id = WorkflowInstanceId::generate();
        }
        let id = stored.id.clone();
        self.instances.write().await.insert(id.0.clone(), stored);
        Ok(id)
    }

    async fn persist_workflow(&self, instance: &WorkflowInstance) -> Result<(), CoreError> {
        self.health.check()?;
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance.id.0) {
            Some(existing) => *existing = instance.clone(),
            None => debug!(workflow_id = %instance.id, "Persist of unknown workflow ignored"),
        }
        Ok(())
    }

    async fn persist_workflow_with_subscriptions(
        &self,
        instance: &WorkflowInstance,
        subscriptions: &[EventSubscription],
    ) -> Result<(), CoreError> {
        self.persist_workflow(instance).await?;

        let mut stored = self.subscriptions.write().await;
        for subscription in subscriptions {
            let mut subscription = subscription.clone();
            if subscription.id.is_empty() {
                subscription.id = SubscriptionId::generate();
            }
            stored.insert(subscription.id.0.clone(), subscription);
        }
        Ok(())
    }

    async fn get_workflow_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<WorkflowInstance, CoreError> {
        self.health.check()?;
        self.instances
            .read()
            .await
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::WorkflowInstanceNotFound(id.0.clone()))
    }

    async fn get_workflow_instances_by_ids(
        &self,
        ids: &[WorkflowInstanceId],
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        self.health.check()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let instances = self.instances.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| instances.get(&id.0).cloned())
            .collect())
    }

    async fn get_runnable_instances(
        &self,
        as_at: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceId>, CoreError> {
        self.health.check()?;
        let now = to_ticks(as_at);
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .filter(|instance| instance.is_runnable_at(now))
            .map(|instance| instance.id.clone())
            .collect())
    }

    async fn get_workflow_instances(
        &self,
        filter: &InstanceFilter,
        skip: usize,
        take: usize,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        self.health.check()?;
        let instances = self.instances.read().await;
        let mut matching: Vec<&WorkflowInstance> =
            instances.values().filter(|instance| filter.matches(instance)).collect();
        matching.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }
}

/// In-memory implementation of the SubscriptionRepository
pub struct InMemorySubscriptionRepository {
    subscriptions: Shared<HashMap<String, EventSubscription>>,
    health: StoreHealth,
}

impl InMemorySubscriptionRepository {
    /// Create a new in-memory subscription repository
    pub fn new(subscriptions: Shared<HashMap<String, EventSubscription>>, health: StoreHealth) -> Self {
        Self {
            subscriptions,
            health,
        }
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<SubscriptionId, CoreError> {
        self.health.check()?;
        let mut stored = subscription.clone();
        if stored.id.is_empty() {
            stored.id = SubscriptionId::generate();
        }
        let id = stored.id.clone();
        self.subscriptions.write().await.insert(id.0.clone(), stored);
        Ok(id)
    }

    async fn terminate_subscription(&self, id: &SubscriptionId) -> Result<(), CoreError> {
        self.health.check()?;
        self.subscriptions.write().await.remove(&id.0);
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<EventSubscription>, CoreError> {
        self.health.check()?;
        Ok(self.subscriptions.read().await.get(&id.0).cloned())
    }

    async fn get_subscriptions(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventSubscription>, CoreError> {
        self.health.check()?;
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .filter(|sub| sub.matches(event_name, event_key, as_of))
            .cloned()
            .collect())
    }

    async fn get_first_open_subscription(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<EventSubscription>, CoreError> {
        self.health.check()?;
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .find(|sub| sub.is_open() && sub.matches(event_name, event_key, as_of))
            .cloned())
    }

    async fn set_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
        worker_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        self.health.check()?;
        let mut subscriptions = self.subscriptions.write().await;
        let granted = match subscriptions.get_mut(&id.0) {
            Some(sub) if sub.lease.is_none() => {
                sub.lease = Some(Lease::new(token, worker_id, expiry));
                true
            }
            _ => false,
        };
        drop(subscriptions);

        StoreMetrics::record_lease_attempt(granted);
        debug!(subscription_id = %id, worker_id, granted, "Lease attempt");
        Ok(granted)
    }

    async fn clear_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
    ) -> Result<bool, CoreError> {
        self.health.check()?;
        let mut subscriptions = self.subscriptions.write().await;
        let cleared = match subscriptions.get_mut(&id.0) {
            Some(sub) if sub.lease_token() == Some(token) => {
                sub.lease = None;
                true
            }
            _ => false,
        };
        drop(subscriptions);

        if cleared {
            StoreMetrics::record_lease_release();
        }
        debug!(subscription_id = %id, cleared, "Lease release");
        Ok(cleared)
    }
}

/// In-memory implementation of the EventRepository
pub struct InMemoryEventRepository {
    events: Shared<HashMap<String, Event>>,
    health: StoreHealth,
}

impl InMemoryEventRepository {
    /// Create a new in-memory event repository
    pub fn new(events: Shared<HashMap<String, Event>>, health: StoreHealth) -> Self {
        Self { events, health }
    }

    async fn set_processed(&self, id: &EventId, processed: bool) -> Result<(), CoreError> {
        self.health.check()?;
        if let Some(event) = self.events.write().await.get_mut(&id.0) {
            event.is_processed = processed;
        }
        Ok(())
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn create_event(&self, event: &Event) -> Result<EventId, CoreError> {
        self.health.check()?;
        let mut stored = event.clone();
        if stored.id.is_empty() {
            stored.id = EventId::generate();
        }
        let id = stored.id.clone();
        self.events.write().await.insert(id.0.clone(), stored);
        Ok(id)
    }

    async fn get_event(&self, id: &EventId) -> Result<Event, CoreError> {
        self.health.check()?;
        self.events
            .read()
            .await
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::EventNotFound(id.0.clone()))
    }

    async fn get_runnable_events(&self, as_at: DateTime<Utc>) -> Result<Vec<EventId>, CoreError> {
        self.health.check()?;
        let events = self.events.read().await;
        Ok(events
            .values()
            .filter(|event| event.is_runnable_at(as_at))
            .map(|event| event.id.clone())
            .collect())
    }

    async fn get_events(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventId>, CoreError> {
        self.health.check()?;
        let events = self.events.read().await;
        Ok(events
            .values()
            .filter(|event| event.matches(event_name, event_key, as_of))
            .map(|event| event.id.clone())
            .collect())
    }

    async fn mark_event_processed(&self, id: &EventId) -> Result<(), CoreError> {
        self.set_processed(id, true).await
    }

    async fn mark_event_unprocessed(&self, id: &EventId) -> Result<(), CoreError> {
        self.set_processed(id, false).await
    }
}

/// In-memory implementation of the ExecutionErrorRepository
pub struct InMemoryExecutionErrorRepository {
    errors: Shared<Vec<ExecutionError>>,
    health: StoreHealth,
}

impl InMemoryExecutionErrorRepository {
    /// Create a new in-memory execution error repository
    pub fn new(errors: Shared<Vec<ExecutionError>>, health: StoreHealth) -> Self {
        Self { errors, health }
    }
}

#[async_trait]
impl ExecutionErrorRepository for InMemoryExecutionErrorRepository {
    async fn insert_errors(&self, errors: &[ExecutionError]) -> Result<(), CoreError> {
        self.health.check()?;
        self.errors.write().await.extend_from_slice(errors);
        Ok(())
    }
}

/// In-memory implementation of the ScheduledCommandRepository
pub struct InMemoryScheduledCommandRepository {
    commands: Shared<Vec<ScheduledCommand>>,
    health: StoreHealth,
}

impl InMemoryScheduledCommandRepository {
    /// Create a new in-memory scheduled command repository
    pub fn new(commands: Shared<Vec<ScheduledCommand>>, health: StoreHealth) -> Self {
        Self { commands, health }
    }
}

#[async_trait]
impl ScheduledCommandRepository for InMemoryScheduledCommandRepository {
    async fn schedule_command(&self, command: &ScheduledCommand) -> Result<(), CoreError> {
        self.health.check()?;
        self.commands.write().await.push(command.clone());
        Ok(())
    }

    async fn find_due_commands(&self, as_of: Ticks) -> Result<Vec<ScheduledCommand>, CoreError> {
        self.health.check()?;
        let commands = self.commands.read().await;
        Ok(commands
            .iter()
            .filter(|command| command.is_due(as_of))
            .cloned()
            .collect())
    }

    async fn delete_command(
        &self,
        command_name: &str,
        execute_time: Ticks,
    ) -> Result<(), CoreError> {
        self.health.check()?;
        let mut commands = self.commands.write().await;
        if let Some(position) = commands
            .iter()
            .position(|command| command.same_key(command_name, execute_time))
        {
            commands.remove(position);
        }
        Ok(())
    }
}

/// In-memory implementation of the DefinitionRepository
pub struct InMemoryDefinitionRepository {
    definitions: Shared<BTreeMap<(String, i32), Definition>>,
    health: StoreHealth,
}

impl InMemoryDefinitionRepository {
    /// Create a new in-memory definition repository
    pub fn new(definitions: Shared<BTreeMap<(String, i32), Definition>>, health: StoreHealth) -> Self {
        Self { definitions, health }
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn find_latest(&self, id: &str) -> Result<Option<Definition>, CoreError> {
        self.health.check()?;
        let definitions = self.definitions.read().await;
        Ok(definitions
            .range((id.to_string(), i32::MIN)..=(id.to_string(), i32::MAX))
            .next_back()
            .map(|(_, definition)| definition.clone()))
    }

    async fn find(&self, id: &str, version: i32) -> Result<Option<Definition>, CoreError> {
        self.health.check()?;
        Ok(self
            .definitions
            .read()
            .await
            .get(&(id.to_string(), version))
            .cloned())
    }

    async fn get_latest_version(&self, id: &str) -> Result<Option<i32>, CoreError> {
        Ok(self.find_latest(id).await?.map(|definition| definition.version))
    }

    async fn get_all(&self) -> Result<Vec<Definition>, CoreError> {
        self.health.check()?;
        let definitions = self.definitions.read().await;
        let mut latest: BTreeMap<&str, &Definition> = BTreeMap::new();
        // Keys iterate in (id, version) order, so the last write per id wins.
        for ((id, _), definition) in definitions.iter() {
            latest.insert(id.as_str(), definition);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn save(&self, definition: &Definition) -> Result<(), CoreError> {
        self.health.check()?;
        self.definitions
            .write()
            .await
            .insert((definition.id.clone(), definition.version), definition.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.health.check()?;
        self.definitions
            .write()
            .await
            .retain(|(stored_id, _), _| stored_id != id);
        Ok(())
    }
}

/// In-memory implementation of the ResourceRepository
pub struct InMemoryResourceRepository {
    resources: Shared<BTreeMap<ResourceKey, Resource>>,
    health: StoreHealth,
}

impl InMemoryResourceRepository {
    /// Create a new in-memory resource repository
    pub fn new(resources: Shared<BTreeMap<ResourceKey, Resource>>, health: StoreHealth) -> Self {
        Self { resources, health }
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn find_latest(&self, bucket: Bucket, name: &str) -> Result<Option<Resource>, CoreError> {
        self.health.check()?;
        let resources = self.resources.read().await;
        Ok(resources
            .range((bucket, name.to_string(), i32::MIN)..=(bucket, name.to_string(), i32::MAX))
            .next_back()
            .map(|(_, resource)| resource.clone()))
    }

    async fn find(
        &self,
        bucket: Bucket,
        name: &str,
        version: i32,
    ) -> Result<Option<Resource>, CoreError> {
        self.health.check()?;
        Ok(self
            .resources
            .read()
            .await
            .get(&(bucket, name.to_string(), version))
            .cloned())
    }

    async fn get_latest_version(
        &self,
        bucket: Bucket,
        name: &str,
    ) -> Result<Option<i32>, CoreError> {
        Ok(self
            .find_latest(bucket, name)
            .await?
            .map(|resource| resource.version))
    }

    async fn save(&self, bucket: Bucket, resource: &Resource) -> Result<(), CoreError> {
        self.health.check()?;
        self.resources.write().await.insert(
            (bucket, resource.name.clone(), resource.version),
            resource.clone(),
        );
        debug!(bucket = %bucket, resource = %resource.key(), "Resource saved");
        Ok(())
    }
}

/// In-memory index table that enforces one name per key pattern
pub struct InMemoryIndexManager {
    indexes: Shared<BTreeMap<IndexKey, IndexDescriptor>>,
    health: StoreHealth,
}

impl InMemoryIndexManager {
    /// Create a new in-memory index manager
    pub fn new(indexes: Shared<BTreeMap<IndexKey, IndexDescriptor>>, health: StoreHealth) -> Self {
        Self { indexes, health }
    }

    /// Create one index.
    ///
    /// An existing index with the same name is accepted as already present.
    /// The same key pattern under another name is rejected, like a document
    /// store would.
    pub async fn create_index(
        &self,
        collection: Collection,
        name: &str,
        keys: &[&str],
        unique: bool,
    ) -> Result<bool, CoreError> {
        self.health.check()?;
        let mut indexes = self.indexes.write().await;
        let key = (collection, name.to_string());
        if indexes.contains_key(&key) {
            return Ok(false);
        }

        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        if let Some(((_, clash), _)) = indexes
            .iter()
            .find(|((coll, _), desc)| *coll == collection && desc.keys == keys)
        {
            return Err(CoreError::StateStoreError(format!(
                "Index with the same key pattern already exists on {} as {}",
                collection, clash
            )));
        }

        indexes.insert(
            key,
            IndexDescriptor {
                collection: collection.name().to_string(),
                name: name.to_string(),
                keys,
                unique,
            },
        );
        Ok(true)
    }

    async fn drop_index(&self, legacy: &LegacyIndex) -> Result<(), CoreError> {
        self.health.check()?;
        let removed = self
            .indexes
            .write()
            .await
            .remove(&(legacy.collection, legacy.name.to_string()));
        if removed.is_some() {
            info!(collection = %legacy.collection, index = legacy.name, "Dropped legacy index");
        }
        Ok(())
    }
}

#[async_trait]
impl IndexManager for InMemoryIndexManager {
    async fn ensure_indexes(&self) -> Result<(), CoreError> {
        for legacy in LEGACY_INDEXES {
            self.drop_index(legacy).await?;
        }
        for spec in REQUIRED_INDEXES {
            if self
                .create_index(spec.collection, spec.name, spec.keys, spec.unique)
                .await?
            {
                debug!(collection = %spec.collection, index = spec.name, "Created index");
            }
        }
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CoreError> {
        self.health.check()?;
        let indexes = self.indexes.read().await;
        let mut listed: Vec<IndexDescriptor> = indexes.values().cloned().collect();
        listed.sort();
        Ok(listed)
    }
}
