//! Repository traits for the coordination layer
//!
//! Every persisted entity has one trait here. Store crates implement all of
//! them over one shared backend; callers hold them as trait objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

use conductor_monitoring::metrics::StoreMetrics;

use super::definition::Definition;
use super::event::{Event, EventId};
use super::execution_error::ExecutionError;
use super::indexes::IndexDescriptor;
use super::resource::{Bucket, Resource};
use super::scheduled_command::ScheduledCommand;
use super::subscription::{EventSubscription, SubscriptionId};
use super::workflow_instance::{InstanceFilter, WorkflowInstance, WorkflowInstanceId};
use crate::types::{to_ticks, Ticks};
use crate::CoreError;

/// Repository for workflow instances
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Insert a new instance, assigning an id when it has none
    async fn create_new_workflow(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceId, CoreError>;

    /// Replace the whole stored document; a missing instance is left absent
    async fn persist_workflow(&self, instance: &WorkflowInstance) -> Result<(), CoreError>;

    /// Replace the instance, then insert each subscription
    async fn persist_workflow_with_subscriptions(
        &self,
        instance: &WorkflowInstance,
        subscriptions: &[EventSubscription],
    ) -> Result<(), CoreError>;

    /// Point lookup, `WorkflowInstanceNotFound` on a miss
    async fn get_workflow_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<WorkflowInstance, CoreError>;

    /// The subset of `ids` that exists
    async fn get_workflow_instances_by_ids(
        &self,
        ids: &[WorkflowInstanceId],
    ) -> Result<Vec<WorkflowInstance>, CoreError>;

    /// Ids of runnable instances whose next execution is due at `as_at`
    async fn get_runnable_instances(
        &self,
        as_at: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceId>, CoreError>;

    /// Paged filter query
    async fn get_workflow_instances(
        &self,
        filter: &InstanceFilter,
        skip: usize,
        take: usize,
    ) -> Result<Vec<WorkflowInstance>, CoreError>;
}

/// Repository for event subscriptions, including the lease protocol
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a subscription, assigning an id when it has none
    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<SubscriptionId, CoreError>;

    /// Delete a subscription; deleting an absent one succeeds
    async fn terminate_subscription(&self, id: &SubscriptionId) -> Result<(), CoreError>;

    /// Point lookup
    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<EventSubscription>, CoreError>;

    /// Subscriptions for `(event_name, event_key)` subscribed at or before `as_of`
    async fn get_subscriptions(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventSubscription>, CoreError>;

    /// Any matching subscription without a lease. Order is store-defined.
    async fn get_first_open_subscription(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<EventSubscription>, CoreError>;

    /// Grant a lease if none is held, as one atomic conditional write.
    ///
    /// `Ok(false)` means another worker holds the lease or the subscription
    /// no longer exists.
    async fn set_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
        worker_id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, CoreError>;

    /// Clear the lease only while it still carries `token`
    async fn clear_subscription_token(
        &self,
        id: &SubscriptionId,
        token: &str,
    ) -> Result<bool, CoreError>;
}

/// Repository for events
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert an event, assigning an id when it has none
    async fn create_event(&self, event: &Event) -> Result<EventId, CoreError>;

    /// Point lookup, `EventNotFound` on a miss
    async fn get_event(&self, id: &EventId) -> Result<Event, CoreError>;

    /// Unprocessed events with a time at or before `as_at`
    async fn get_runnable_events(&self, as_at: DateTime<Utc>) -> Result<Vec<EventId>, CoreError>;

    /// Events for `(event_name, event_key)` at or after `as_of`
    async fn get_events(
        &self,
        event_name: &str,
        event_key: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<EventId>, CoreError>;

    /// Set the processed flag
    async fn mark_event_processed(&self, id: &EventId) -> Result<(), CoreError>;

    /// Clear the processed flag. Administrative correction only.
    async fn mark_event_unprocessed(&self, id: &EventId) -> Result<(), CoreError>;
}

/// Append-only execution error log
#[async_trait]
pub trait ExecutionErrorRepository: Send + Sync {
    /// Append a non-empty batch
    async fn insert_errors(&self, errors: &[ExecutionError]) -> Result<(), CoreError>;

    /// Append a batch; an empty batch never reaches the store
    async fn persist_errors(&self, errors: &[ExecutionError]) -> Result<(), CoreError> {
        if errors.is_empty() {
            return Ok(());
        }
        self.insert_errors(errors).await
    }
}

/// Handler invoked once per due scheduled command
pub type CommandHandler =
    Arc<dyn Fn(ScheduledCommand) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`]
pub fn command_handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(ScheduledCommand) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), CoreError>> + Send + 'static,
{
    Arc::new(move |command| Box::pin(f(command)))
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Commands handled and deleted
    pub processed: usize,

    /// Commands whose handler failed; they stay queued
    pub failed: usize,
}

/// Deferred command queue
#[async_trait]
pub trait ScheduledCommandRepository: Send + Sync {
    /// Queue a command under `(command_name, execute_time)`
    async fn schedule_command(&self, command: &ScheduledCommand) -> Result<(), CoreError>;

    /// Commands with `execute_time <= as_of`
    async fn find_due_commands(&self, as_of: Ticks) -> Result<Vec<ScheduledCommand>, CoreError>;

    /// Delete one command with the given identity; absent commands are a no-op
    async fn delete_command(&self, command_name: &str, execute_time: Ticks)
        -> Result<(), CoreError>;

    /// Hand every due command to `handler`, deleting each one only after its
    /// handler succeeded.
    ///
    /// A failing handler leaves its command queued for the next pass and does
    /// not stop the drain. Store failures abort the pass.
    async fn process_commands(
        &self,
        as_of: DateTime<Utc>,
        handler: CommandHandler,
    ) -> Result<DrainSummary, CoreError> {
        let due = self.find_due_commands(to_ticks(as_of)).await?;
        let mut summary = DrainSummary::default();

        for command in due {
            let command_name = command.command_name.clone();
            let execute_time = command.execute_time;

            match handler(command).await {
                Ok(()) => {
                    self.delete_command(&command_name, execute_time).await?;
                    StoreMetrics::record_command_drained(&command_name, true);
                    summary.processed += 1;
                    debug!(command = %command_name, execute_time, "Scheduled command handled");
                }
                Err(e) => {
                    StoreMetrics::record_command_drained(&command_name, false);
                    summary.failed += 1;
                    warn!(
                        command = %command_name,
                        execute_time,
                        error = %e,
                        "Scheduled command failed, keeping it for retry"
                    );
                }
            }
        }

        Ok(summary)
    }
}

/// Repository for workflow definitions, keyed by `(id, version)`
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Highest stored version of `id`
    async fn find_latest(&self, id: &str) -> Result<Option<Definition>, CoreError>;

    /// A specific version
    async fn find(&self, id: &str, version: i32) -> Result<Option<Definition>, CoreError>;

    /// Highest stored version number of `id`
    async fn get_latest_version(&self, id: &str) -> Result<Option<i32>, CoreError>;

    /// The latest version of every stored definition
    async fn get_all(&self) -> Result<Vec<Definition>, CoreError>;

    /// Insert or replace `(id, version)`
    async fn save(&self, definition: &Definition) -> Result<(), CoreError>;

    /// Delete every version of `id`
    async fn delete(&self, id: &str) -> Result<(), CoreError>;
}

/// Versioned resources, addressed by bucket and name
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Highest stored version of `name`
    async fn find_latest(&self, bucket: Bucket, name: &str) -> Result<Option<Resource>, CoreError>;

    /// A specific version
    async fn find(
        &self,
        bucket: Bucket,
        name: &str,
        version: i32,
    ) -> Result<Option<Resource>, CoreError>;

    /// Highest stored version number of `name`
    async fn get_latest_version(&self, bucket: Bucket, name: &str)
        -> Result<Option<i32>, CoreError>;

    /// Insert or replace `(bucket, name, version)`
    async fn save(&self, bucket: Bucket, resource: &Resource) -> Result<(), CoreError>;
}

/// Startup index provisioning
#[async_trait]
pub trait IndexManager: Send + Sync {
    /// Drop legacy index names, then create every required index that is
    /// missing. Safe to run concurrently from several processes.
    async fn ensure_indexes(&self) -> Result<(), CoreError>;

    /// Secondary indexes currently present on the managed collections, sorted
    async fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CoreError>;
}

/// One handle per repository over a single backend
#[derive(Clone)]
pub struct StateRepositories {
    /// Workflow instances
    pub workflows: Arc<dyn WorkflowRepository>,
    /// Event subscriptions
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    /// Events
    pub events: Arc<dyn EventRepository>,
    /// Execution errors
    pub errors: Arc<dyn ExecutionErrorRepository>,
    /// Scheduled commands
    pub commands: Arc<dyn ScheduledCommandRepository>,
    /// Workflow definitions
    pub definitions: Arc<dyn DefinitionRepository>,
    /// Versioned resources
    pub resources: Arc<dyn ResourceRepository>,
    /// Index management
    pub indexes: Arc<dyn IndexManager>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{mock, predicate::*};
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Commands {}

        #[async_trait]
        impl ScheduledCommandRepository for Commands {
            async fn schedule_command(&self, command: &ScheduledCommand) -> Result<(), CoreError>;
            async fn find_due_commands(&self, as_of: Ticks) -> Result<Vec<ScheduledCommand>, CoreError>;
            async fn delete_command(&self, command_name: &str, execute_time: Ticks) -> Result<(), CoreError>;
        }
    }

    mock! {
        Errors {}

        #[async_trait]
        impl ExecutionErrorRepository for Errors {
            async fn insert_errors(&self, errors: &[ExecutionError]) -> Result<(), CoreError>;
        }
    }

    #[tokio::test]
    async fn drain_deletes_only_successfully_handled_commands() {
        let mut repo = MockCommands::new();
        repo.expect_find_due_commands().times(1).returning(|_| {
            Ok(vec![
                ScheduledCommand::new("ok", "a", 10),
                ScheduledCommand::new("boom", "b", 20),
            ])
        });
        repo.expect_delete_command()
            .with(eq("ok"), eq(10))
            .times(1)
            .returning(|_, _| Ok(()));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler = command_handler(move |cmd: ScheduledCommand| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if cmd.command_name == "boom" {
                    Err(CoreError::CommandHandlerError("handler exploded".into()))
                } else {
                    Ok(())
                }
            }
        });

        let summary = repo.process_commands(Utc::now(), handler).await.unwrap();
        assert_eq!(summary, DrainSummary { processed: 1, failed: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drain_passes_as_of_in_ticks() {
        let as_of = Utc::now();
        let expected = to_ticks(as_of);

        let mut repo = MockCommands::new();
        repo.expect_find_due_commands()
            .with(eq(expected))
            .times(1)
            .returning(|_| Ok(vec![]));
        repo.expect_delete_command().never();

        let handler = command_handler(|_| async { Ok::<(), CoreError>(()) });
        let summary = repo.process_commands(as_of, handler).await.unwrap();
        assert_eq!(summary, DrainSummary::default());
    }

    #[tokio::test]
    async fn drain_surfaces_store_failures() {
        let mut repo = MockCommands::new();
        repo.expect_find_due_commands()
            .returning(|_| Err(CoreError::StateStoreError("connection refused".into())));

        let handler = command_handler(|_| async { Ok::<(), CoreError>(()) });
        let err = repo.process_commands(Utc::now(), handler).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn empty_error_batch_skips_the_store() {
        let mut repo = MockErrors::new();
        repo.expect_insert_errors().never();
        repo.persist_errors(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn error_batch_is_appended() {
        let mut repo = MockErrors::new();
        repo.expect_insert_errors()
            .withf(|errors| errors.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let errors = vec![
            ExecutionError::new(WorkflowInstanceId::from("wf"), "p1", "first"),
            ExecutionError::new(WorkflowInstanceId::from("wf"), "p2", "second"),
        ];
        repo.persist_errors(&errors).await.unwrap();
    }
}
