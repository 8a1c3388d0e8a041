//! A worker picking up an activity, finishing it and reporting back.

use std::time::Duration;

use chrono::Utc;
use conductor_core::{
    ActivityResult, ActivityStatus, ActivityToken, CoreError, ACTIVITY_EVENT_NAME,
};
use conductor_integration_tests::utils::{activity_service, store};
use conductor_node::{ConductorNode, NodeConfig};
use conductor_test_utils::{SubscriptionBuilder, WorkflowInstanceBuilder};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn worker_round_trip_records_the_result_event() -> anyhow::Result<()> {
    let store = store().await?;
    let workflow_id = store
        .repos
        .workflows
        .create_new_workflow(&WorkflowInstanceBuilder::new("signup").build())
        .await?;
    let subscription = SubscriptionBuilder::activity("send-welcome-email")
        .workflow(&workflow_id)
        .step(2)
        .data(json!({ "to": "ada@example.com" }))
        .build();
    let sub_id = store
        .repos
        .subscriptions
        .create_event_subscription(&subscription)
        .await?;

    let service = activity_service(&store.repos);
    let activity = service
        .get_pending_activity("send-welcome-email", "mailer-1", Duration::from_secs(30))
        .await?
        .expect("activity is waiting");
    assert_eq!(activity.parameters, json!({ "to": "ada@example.com" }));
    assert!(activity.token_expiry > Utc::now());

    let event_id = service
        .submit_activity_success(&activity.token, json!({ "messageId": "m-1" }))
        .await?;

    let event = store.repos.events.get_event(&event_id).await?;
    assert_eq!(event.event_name, ACTIVITY_EVENT_NAME);
    assert_eq!(event.event_key, sub_id.0);
    let result: ActivityResult = serde_json::from_value(event.event_data)?;
    assert_eq!(result.status, ActivityStatus::Success);
    assert_eq!(result.subscription_id, sub_id);
    assert_eq!(result.data, json!({ "messageId": "m-1" }));

    let runnable = store.repos.events.get_runnable_events(Utc::now()).await?;
    assert!(runnable.contains(&event_id));
    Ok(())
}

#[tokio::test]
async fn failure_report_is_recorded_as_fail() -> anyhow::Result<()> {
    let store = store().await?;
    store
        .repos
        .subscriptions
        .create_event_subscription(&SubscriptionBuilder::activity("charge-card").build())
        .await?;
    let service = activity_service(&store.repos);

    let activity = service
        .get_pending_activity("charge-card", "billing-1", Duration::from_secs(5))
        .await?
        .expect("activity is waiting");
    let event_id = service
        .submit_activity_failure(&activity.token, json!({ "reason": "declined" }))
        .await?;

    let event = store.repos.events.get_event(&event_id).await?;
    let result: ActivityResult = serde_json::from_value(event.event_data)?;
    assert_eq!(result.status, ActivityStatus::Fail);
    Ok(())
}

#[tokio::test]
async fn garbage_tokens_are_rejected() -> anyhow::Result<()> {
    let store = store().await?;
    let service = activity_service(&store.repos);

    let err = service.release_activity_token("%%%").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken(_)));
    let err = service
        .submit_activity_success("bm90IGpzb24=", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken(_)));
    Ok(())
}

#[tokio::test]
async fn node_exposes_a_working_activity_service() -> anyhow::Result<()> {
    let config = NodeConfig {
        store_url: "memory://activity".to_string(),
        ..NodeConfig::default()
    };
    let node = ConductorNode::build(&config).await?;
    node.start(None).await?;

    let id = node
        .repositories()
        .subscriptions
        .create_event_subscription(&SubscriptionBuilder::activity("ping").build())
        .await?;
    let activity = node
        .activities()
        .get_pending_activity("ping", "worker", Duration::from_millis(200))
        .await?
        .expect("activity is waiting");
    assert_eq!(ActivityToken::decode(&activity.token)?.subscription_id, id);
    assert!(node.activities().release_activity_token(&activity.token).await?);

    node.stop().await?;
    Ok(())
}
