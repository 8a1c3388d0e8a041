use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};
use tracing::debug;

use conductor_core::{
    to_ticks, Bucket, CoreError, Definition, DefinitionRepository, Event, EventId,
    EventRepository, EventSubscription, ExecutionError, ExecutionErrorRepository, InstanceFilter,
    Lease, Resource, ResourceRepository, ScheduledCommand, ScheduledCommandRepository,
    SubscriptionId, SubscriptionRepository, Ticks, WorkflowInstance, WorkflowInstanceId,
    WorkflowRepository, WorkflowStatus,
};
use conductor_monitoring::metrics::StoreMetrics;

use crate::error::map_sqlx_err;
use crate::PostgresConnection;

fn decode_document<T: DeserializeOwned>(row: &PgRow) -> Result<T, CoreError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| map_sqlx_err("Error reading document", e))?;
    Ok(serde_json::from_value(data)?)
}

const INSERT_WORKFLOW_SQL: &str = r#"
    INSERT INTO workflows (id, workflow_definition_id, version, status, next_execution, create_time, data)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

const UPDATE_WORKFLOW_SQL: &str = r#"
    UPDATE workflows SET
        workflow_definition_id = $2,
        version = $3,
        status = $4,
        next_execution = $5,
        create_time = $6,
        data = $7
    WHERE id = $1
"#;

const RUNNABLE_WORKFLOWS_SQL: &str = r#"
    SELECT id FROM workflows
    WHERE status = $1 AND next_execution IS NOT NULL AND next_execution <= $2
"#;

/// Paged instance query; absent filter fields add no predicate
pub(crate) fn build_instance_query(
    filter: &InstanceFilter,
    skip: usize,
    take: usize,
) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT data FROM workflows WHERE TRUE");

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(workflow_type) = &filter.workflow_type {
        builder.push(" AND workflow_definition_id = ");
        builder.push_bind(workflow_type.clone());
    }
    if let Some(from) = filter.created_from {
        builder.push(" AND create_time >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.created_to {
        builder.push(" AND create_time <= ");
        builder.push_bind(to);
    }

    builder.push(" ORDER BY create_time, id OFFSET ");
    builder.push_bind(skip as i64);
    builder.push(" LIMIT ");
    builder.push_bind(take as i64);
    builder
}

/// Postgres implementation of the WorkflowRepository
#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    conn: PostgresConnection,
}

impl PostgresWorkflowRepository {
    /// Create a new Postgres workflow repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn create_new_workflow(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceId, CoreError> {
        let mut stored = instance.clone();
        if stored.id.is_empty() {
            stored.id = WorkflowInstanceId::generate();
        }
        let data = serde_json::to_value(&stored)?;

        sqlx::query(INSERT_WORKFLOW_SQL)
            .bind(&stored.id.0)
            .bind(&stored.workflow_definition_id)
            .bind(stored.version)
            .bind(stored.status.as_str())
            .bind(stored.next_execution)
            .bind(stored.create_time)
            .bind(&data)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to insert workflow", e))?;

        Ok(stored.id)
    }

    async fn persist_workflow(&self, instance: &WorkflowInstance) -> Result<(), CoreError> {
        let data = serde_json::to_value(instance)?;
        let result = sqlx::query(UPDATE_WORKFLOW_SQL)
            .bind(&instance.id.0)
            .bind(&instance.workflow_definition_id)
            .bind(instance.version)
            .bind(instance.status.as_str())
            .bind(instance.next_execution)
            .bind(instance.create_time)
            .bind(&data)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to persist workflow", e))?;

        if result.rows_affected() == 0 {
            debug!(workflow_id = %instance.id, "Persist of unknown workflow ignored");
        }
        Ok(())
    }

    async fn persist_workflow_with_subscriptions(
        &self,
        instance: &WorkflowInstance,
        subscriptions: &[EventSubscription],
    ) -> Result<(), CoreError> {
        let data = serde_json::to_value(instance)?;
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_err("Failed to begin transaction", e))?;

        sqlx::query(UPDATE_WORKFLOW_SQL)
            .bind(&instance.id.0)
            .bind(&instance.workflow_definition_id)
            .bind(instance.version)
            .bind(instance.status.as_str())
            .bind(instance.next_execution)
            .bind(instance.create_time)
            .bind(&data)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("Failed to persist workflow", e))?;

        for subscription in subscriptions {
            let row = SubscriptionRow::from_subscription(subscription)?;
            row.insert()
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_err("Failed to insert subscription", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("Failed to commit transaction", e))
    }

    async fn get_workflow_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<WorkflowInstance, CoreError> {
        let row = sqlx::query("SELECT data FROM workflows WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to load workflow", e))?
            .ok_or_else(|| CoreError::WorkflowInstanceNotFound(id.0.clone()))?;
        decode_document(&row)
    }

    async fn get_workflow_instances_by_ids(
        &self,
        ids: &[WorkflowInstanceId],
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let rows = sqlx::query("SELECT data FROM workflows WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to load workflows", e))?;
        rows.iter().map(decode_document).collect()
    }

    async fn get_runnable_instances(
        &self,
        as_at: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceId>, CoreError> {
        let ids: Vec<String> = sqlx::query_scalar(RUNNABLE_WORKFLOWS_SQL)
            .bind(WorkflowStatus::Runnable.as_str())
            .bind(to_ticks(as_at))
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to query runnable workflows", e))?;
        Ok(ids.into_iter().map(WorkflowInstanceId).collect())
    }

    async fn get_workflow_instances(
        &self,
        filter: &InstanceFilter,
        skip: usize,
        take: usize,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let mut builder = build_instance_query(filter, skip, take);
        let rows = builder
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to query workflows", e))?;
        rows.iter().map(decode_document).collect()
    }
}

/// Subscription split into its document and the lease columns
struct SubscriptionRow {
    id: String,
    event_name: String,
    event_key: String,
    subscribe_as_of: DateTime<Utc>,
    lease: Option<Lease>,
    data: serde_json::Value,
}

impl SubscriptionRow {
    fn from_subscription(subscription: &EventSubscription) -> Result<Self, CoreError> {
        let mut document = subscription.clone();
        if document.id.is_empty() {
            document.id = SubscriptionId::generate();
        }
        let lease = document.lease.take();
        Ok(Self {
            id: document.id.0.clone(),
            event_name: document.event_name.clone(),
            event_key: document.event_key.clone(),
            subscribe_as_of: document.subscribe_as_of,
            lease,
            data: serde_json::to_value(&document)?,
        })
    }

    fn insert(&self) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, event_name, event_key, subscribe_as_of, lease_token, lease_worker, lease_expiry, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&self.id)
        .bind(&self.event_name)
        .bind(&self.event_key)
        .bind(self.subscribe_as_of)
        .bind(self.lease.as_ref().map(|lease| lease.token.as_str()))
        .bind(self.lease.as_ref().map(|lease| lease.worker_id.as_str()))
        .bind(self.lease.as_ref().map(|lease| lease.expiry))
        .bind(&self.data)
    }
}

fn decode_subscription(row: &PgRow) -> Result<EventSubscription, CoreError> {
    let mut subscription: EventSubscription = decode_document(row)?;
    let token: Option<String> = row
        .try_get("lease_token")
        .map_err(|e| map_sqlx_err("Error reading lease", e))?;
    let worker: Option<String> = row
        .try_get("lease_worker")
        .map_err(|e| map_sqlx_err("Error reading lease", e))?;
    let expiry: Option<DateTime<Utc>> = row
        .try_get("lease_expiry")
        .map_err(|e| map_sqlx_err("Error reading lease", e))?;

    subscription.lease = match (token, worker, expiry) {
        (Some(token), Some(worker), Some(expiry)) => Some(Lease::new(token, worker, expiry)),
        _ => None,
    };
    Ok(subscription)
}

const SELECT_SUBSCRIPTION_SQL: &str =
    "SELECT data, lease_token, lease_worker, lease_expiry FROM subscriptions";

const GRANT_LEASE_SQL: &str = r#"
    UPDATE subscriptions
    SET lease_token = $2, lease_worker = $3, lease_expiry = $4
    WHERE id = $1 AND lease_token IS NULL
"#;

const RELEASE_LEASE_SQL: &str = r#"
    UPDATE subscriptions
    SET lease_token = NULL, lease_worker = NULL, lease_expiry = NULL
    WHERE id = $1 AND lease_token = $2
"#;

/// Postgres implementation of the SubscriptionRepository
#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    conn: PostgresConnection,
}

impl PostgresSubscriptionRepository {
    /// Create a new Postgres subscription repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<SubscriptionId, CoreError> {
        let row = SubscriptionRow::from_subscription(subscription)?;
        row.insert()
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to insert subscription", e))?;
        Ok(SubscriptionId(row.id))
    }

    async fn terminate_subscription(&self, id: &SubscriptionId) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(&id.0)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to delete subscription", e))?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<EventSubscription>, CoreError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_SUBSCRIPTION_SQL))
            .bind(&id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to load subscription", e))?;
        row.as_ref().map(decode_subscription).transpose()
    }

    async fn get_subscriptions(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventSubscription>, CoreError> {
        let rows = sqlx::query(&format!(
            "{} WHERE event_name = $1 AND event_key = $2 AND subscribe_as_of <= $3",
            SELECT_SUBSCRIPTION_SQL
        ))
        .bind(event_name)
        .bind(event_key)
        .bind(as_of)
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to query subscriptions", e))?;
        rows.iter().map(decode_subscription).collect()
    }

    async fn get_first_open_subscription(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<EventSubscription>, CoreError> {
        let row = sqlx::query(&format!(
            "{} WHERE event_name = $1 AND event_key = $2 AND subscribe_as_of <= $3 \
             AND lease_token IS NULL LIMIT 1",
            SELECT_SUBSCRIPTION_SQL
        ))
        .bind(event_name)
        .bind(event_key)
        .bind(as_of)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to query open subscription", e))?;
        row.as_ref().map(decode_subscription).transpose()
    }

    async fn set_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
        worker_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(GRANT_LEASE_SQL)
            .bind(&id.0)
            .bind(token)
            .bind(worker_id)
            .bind(expiry)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to grant lease", e))?;

        let granted = result.rows_affected() > 0;
        StoreMetrics::record_lease_attempt(granted);
        debug!(subscription_id = %id, worker_id, granted, "Lease attempt");
        Ok(granted)
    }

    async fn clear_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(RELEASE_LEASE_SQL)
            .bind(&id.0)
            .bind(token)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to release lease", e))?;

        let cleared = result.rows_affected() > 0;
        if cleared {
            StoreMetrics::record_lease_release();
        }
        debug!(subscription_id = %id, cleared, "Lease release");
        Ok(cleared)
    }
}

/// Postgres implementation of the EventRepository
#[derive(Clone)]
pub struct PostgresEventRepository {
    conn: PostgresConnection,
}

impl PostgresEventRepository {
    /// Create a new Postgres event repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    async fn set_processed(&self, id: &EventId, processed: bool) -> Result<(), CoreError> {
        sqlx::query("UPDATE events SET is_processed = $2 WHERE id = $1")
            .bind(&id.0)
            .bind(processed)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to update event", e))?;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn create_event(&self, event: &Event) -> Result<EventId, CoreError> {
        let mut stored = event.clone();
        if stored.id.is_empty() {
            stored.id = EventId::generate();
        }
        let data = serde_json::to_value(&stored)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, event_name, event_key, event_time, is_processed, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&stored.id.0)
        .bind(&stored.event_name)
        .bind(&stored.event_key)
        .bind(stored.event_time)
        .bind(stored.is_processed)
        .bind(&data)
        .execute(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to insert event", e))?;

        Ok(stored.id)
    }

    async fn get_event(&self, id: &EventId) -> Result<Event, CoreError> {
        let row = sqlx::query("SELECT data, is_processed FROM events WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to load event", e))?
            .ok_or_else(|| CoreError::EventNotFound(id.0.clone()))?;

        let mut event: Event = decode_document(&row)?;
        event.is_processed = row
            .try_get("is_processed")
            .map_err(|e| map_sqlx_err("Error reading event", e))?;
        Ok(event)
    }

    async fn get_runnable_events(&self, as_at: DateTime<Utc>) -> Result<Vec<EventId>, CoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM events WHERE is_processed = FALSE AND event_time <= $1",
        )
        .bind(as_at)
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to query runnable events", e))?;
        Ok(ids.into_iter().map(EventId).collect())
    }

    async fn get_events(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventId>, CoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM events WHERE event_name = $1 AND event_key = $2 AND event_time >= $3",
        )
        .bind(event_name)
        .bind(event_key)
        .bind(as_of)
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to query events", e))?;
        Ok(ids.into_iter().map(EventId).collect())
    }

    async fn mark_event_processed(&self, id: &EventId) -> Result<(), CoreError> {
        self.set_processed(id, true).await
    }

    async fn mark_event_unprocessed(&self, id: &EventId) -> Result<(), CoreError> {
        self.set_processed(id, false).await
    }
}

/// Multi-row insert for an error batch
pub(crate) fn build_error_insert(errors: &[ExecutionError]) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO execution_errors (workflow_id, execution_pointer_id, error_time, message) ",
    );
    builder.push_values(errors, |mut row, error| {
        row.push_bind(error.workflow_id.0.clone())
            .push_bind(error.execution_pointer_id.clone())
            .push_bind(error.error_time)
            .push_bind(error.message.clone());
    });
    builder
}

/// Postgres implementation of the ExecutionErrorRepository
#[derive(Clone)]
pub struct PostgresExecutionErrorRepository {
    conn: PostgresConnection,
}

impl PostgresExecutionErrorRepository {
    /// Create a new Postgres execution error repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ExecutionErrorRepository for PostgresExecutionErrorRepository {
    async fn insert_errors(&self, errors: &[ExecutionError]) -> Result<(), CoreError> {
        let mut builder = build_error_insert(errors);
        builder
            .build()
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to insert execution errors", e))?;
        Ok(())
    }
}

const DELETE_ONE_COMMAND_SQL: &str = r#"
    DELETE FROM scheduled_commands
    WHERE ctid IN (
        SELECT ctid FROM scheduled_commands
        WHERE command_name = $1 AND execute_time = $2
        LIMIT 1
    )
"#;

/// Postgres implementation of the ScheduledCommandRepository
#[derive(Clone)]
pub struct PostgresScheduledCommandRepository {
    conn: PostgresConnection,
}

impl PostgresScheduledCommandRepository {
    /// Create a new Postgres scheduled command repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ScheduledCommandRepository for PostgresScheduledCommandRepository {
    async fn schedule_command(&self, command: &ScheduledCommand) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO scheduled_commands (command_name, data, execute_time) VALUES ($1, $2, $3)",
        )
        .bind(&command.command_name)
        .bind(&command.data)
        .bind(command.execute_time)
        .execute(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to schedule command", e))?;
        Ok(())
    }

    async fn find_due_commands(&self, as_of: Ticks) -> Result<Vec<ScheduledCommand>, CoreError> {
        let rows = sqlx::query(
            "SELECT command_name, data, execute_time FROM scheduled_commands \
             WHERE execute_time <= $1 ORDER BY execute_time",
        )
        .bind(as_of)
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to query scheduled commands", e))?;

        rows.iter()
            .map(|row| -> Result<ScheduledCommand, sqlx::Error> {
                Ok(ScheduledCommand {
                    command_name: row.try_get("command_name")?,
                    data: row.try_get("data")?,
                    execute_time: row.try_get("execute_time")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_err("Error reading scheduled command", e))
    }

    async fn delete_command(
        &self,
        command_name: &str,
        execute_time: Ticks,
    ) -> Result<(), CoreError> {
        sqlx::query(DELETE_ONE_COMMAND_SQL)
            .bind(command_name)
            .bind(execute_time)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to delete scheduled command", e))?;
        Ok(())
    }
}

const UPSERT_DEFINITION_SQL: &str = r#"
    INSERT INTO definitions (definition_id, version, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (definition_id, version) DO UPDATE SET data = EXCLUDED.data
"#;

/// Postgres implementation of the DefinitionRepository
#[derive(Clone)]
pub struct PostgresDefinitionRepository {
    conn: PostgresConnection,
}

impl PostgresDefinitionRepository {
    /// Create a new Postgres definition repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DefinitionRepository for PostgresDefinitionRepository {
    async fn find_latest(&self, id: &str) -> Result<Option<Definition>, CoreError> {
        let row = sqlx::query(
            "SELECT data FROM definitions WHERE definition_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to load definition", e))?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn find(&self, id: &str, version: i32) -> Result<Option<Definition>, CoreError> {
        let row = sqlx::query("SELECT data FROM definitions WHERE definition_id = $1 AND version = $2")
            .bind(id)
            .bind(version)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to load definition", e))?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn get_latest_version(&self, id: &str) -> Result<Option<i32>, CoreError> {
        sqlx::query_scalar("SELECT MAX(version) FROM definitions WHERE definition_id = $1")
            .bind(id)
            .fetch_one(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to query definition version", e))
    }

    async fn get_all(&self) -> Result<Vec<Definition>, CoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (definition_id) data FROM definitions \
             ORDER BY definition_id, version DESC",
        )
        .fetch_all(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to load definitions", e))?;
        rows.iter().map(decode_document).collect()
    }

    async fn save(&self, definition: &Definition) -> Result<(), CoreError> {
        let data = serde_json::to_value(definition)?;
        sqlx::query(UPSERT_DEFINITION_SQL)
            .bind(&definition.id)
            .bind(definition.version)
            .bind(&data)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to save definition", e))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM definitions WHERE definition_id = $1")
            .bind(id)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to delete definition", e))?;
        Ok(())
    }
}

const UPSERT_RESOURCE_SQL: &str = r#"
    INSERT INTO resources (bucket, name, version, data)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (bucket, name, version) DO UPDATE SET data = EXCLUDED.data
"#;

/// Postgres implementation of the ResourceRepository
#[derive(Clone)]
pub struct PostgresResourceRepository {
    conn: PostgresConnection,
}

impl PostgresResourceRepository {
    /// Create a new Postgres resource repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResourceRepository for PostgresResourceRepository {
    async fn find_latest(&self, bucket: Bucket, name: &str) -> Result<Option<Resource>, CoreError> {
        let row = sqlx::query(
            "SELECT data FROM resources WHERE bucket = $1 AND name = $2 \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(bucket.as_str())
        .bind(name)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to load resource", e))?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn find(
        &self,
        bucket: Bucket,
        name: &str,
        version: i32,
    ) -> Result<Option<Resource>, CoreError> {
        let row = sqlx::query(
            "SELECT data FROM resources WHERE bucket = $1 AND name = $2 AND version = $3",
        )
        .bind(bucket.as_str())
        .bind(name)
        .bind(version)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(|e| map_sqlx_err("Failed to load resource", e))?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn get_latest_version(
        &self,
        bucket: Bucket,
        name: &str,
    ) -> Result<Option<i32>, CoreError> {
        sqlx::query_scalar("SELECT MAX(version) FROM resources WHERE bucket = $1 AND name = $2")
            .bind(bucket.as_str())
            .bind(name)
            .fetch_one(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to query resource version", e))
    }

    async fn save(&self, bucket: Bucket, resource: &Resource) -> Result<(), CoreError> {
        let data = serde_json::to_value(resource)?;
        sqlx::query(UPSERT_RESOURCE_SQL)
            .bind(bucket.as_str())
            .bind(&resource.name)
            .bind(resource.version)
            .bind(&data)
            .execute(self.conn.pool())
            .await
            .map_err(|e| map_sqlx_err("Failed to save resource", e))?;
        debug!(bucket = %bucket, resource = %resource.key(), "Resource saved");
        Ok(())
    }
}
