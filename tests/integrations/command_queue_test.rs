//! Scheduled command drain and runnable-instance polling.

use std::sync::Arc;

use chrono::{Duration, Utc};
use conductor_core::{command_handler, CoreError, ScheduledCommand, WorkflowStatus};
use conductor_integration_tests::utils::store;
use conductor_test_utils::{command_at, WorkflowInstanceBuilder};
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;

#[tokio::test]
async fn command_is_delivered_once_it_is_due() -> anyhow::Result<()> {
    let store = store().await?;
    let commands = &store.repos.commands;
    let t = Utc::now();
    commands
        .schedule_command(&command_at("ping", "payload-1", t + Duration::seconds(5)))
        .await?;

    let seen: Arc<Mutex<Vec<ScheduledCommand>>> = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = seen.clone();
        command_handler(move |command| {
            let seen = seen.clone();
            async move {
                seen.lock().await.push(command);
                Ok::<(), CoreError>(())
            }
        })
    };

    let early = commands
        .process_commands(t + Duration::seconds(4), handler.clone())
        .await?;
    assert_eq!(early.processed, 0);
    assert!(seen.lock().await.is_empty());

    let due = commands
        .process_commands(t + Duration::seconds(5), handler.clone())
        .await?;
    assert_eq!(due.processed, 1);
    assert_eq!(seen.lock().await[0].data, "payload-1");

    let again = commands
        .process_commands(t + Duration::seconds(60), handler)
        .await?;
    assert_eq!(again.processed, 0);
    assert_eq!(seen.lock().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_handler_keeps_the_command_for_the_next_drain() -> anyhow::Result<()> {
    let store = store().await?;
    let commands = &store.repos.commands;
    let t = Utc::now();
    commands
        .schedule_command(&command_at("ProcessWorkflow", "wf-1", t - Duration::seconds(1)))
        .await?;
    commands
        .schedule_command(&command_at("ProcessWorkflow", "wf-2", t))
        .await?;

    let flaky = command_handler(|command: ScheduledCommand| async move {
        if command.data == "wf-1" {
            Err(CoreError::CommandHandlerError("engine busy".to_string()))
        } else {
            Ok(())
        }
    });
    let summary = commands.process_commands(t, flaky).await?;
    assert_eq!((summary.processed, summary.failed), (1, 1));

    let remaining = commands.find_due_commands(conductor_core::to_ticks(t)).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].data, "wf-1");
    Ok(())
}

#[tokio::test]
async fn only_due_runnable_instances_are_polled() -> anyhow::Result<()> {
    let store = store().await?;
    let workflows = &store.repos.workflows;
    let now = Utc::now();

    let a = workflows
        .create_new_workflow(
            &WorkflowInstanceBuilder::new("orders")
                .next_execution(Some(now - Duration::seconds(1)))
                .build(),
        )
        .await?;
    workflows
        .create_new_workflow(
            &WorkflowInstanceBuilder::new("orders")
                .next_execution(Some(now + Duration::hours(1)))
                .build(),
        )
        .await?;
    workflows
        .create_new_workflow(
            &WorkflowInstanceBuilder::new("orders")
                .status(WorkflowStatus::Complete)
                .next_execution(Some(now - Duration::seconds(1)))
                .build(),
        )
        .await?;

    assert_eq!(workflows.get_runnable_instances(now).await?, vec![a]);
    Ok(())
}
