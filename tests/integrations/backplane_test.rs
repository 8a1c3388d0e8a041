//! Definition propagation between nodes sharing a store and a channel.

use std::sync::Arc;
use std::time::Duration;

use conductor_cluster::{InMemoryTransport, PubSubBackplane};
use conductor_core::{ClusterBackplane, DefinitionService, WorkflowRegistry};
use conductor_integration_tests::utils::{cluster_node, store};
use conductor_test_utils::{DefinitionBuilder, RecordingWorkflowLoader};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn registration_on_one_node_reaches_the_other() -> anyhow::Result<()> {
    let store = store().await?;
    let hub = InMemoryTransport::new();
    let a = cluster_node(&hub, &store.repos);
    let b = cluster_node(&hub, &store.repos);
    a.backplane.start().await?;
    b.backplane.start().await?;

    let registered = a
        .service
        .register_new_definition(DefinitionBuilder::new("orders").build())
        .await?;
    assert_eq!(registered.version, 1);

    assert!(b.loader.wait_for_loads(1, Duration::from_secs(2)).await);
    assert_eq!(b.loader.loaded(), vec![("orders".to_string(), 1)]);
    assert_eq!(b.definitions.find_calls(), 1);

    // Round-trip a marker from B so A has certainly seen its own announcement
    b.service
        .register_new_definition(DefinitionBuilder::new("marker").build())
        .await?;
    assert!(a.loader.wait_for_loads(2, Duration::from_secs(2)).await);
    assert_eq!(
        a.loader.loaded(),
        vec![("orders".to_string(), 1), ("marker".to_string(), 1)]
    );
    assert_eq!(a.definitions.find_calls(), 1);

    a.backplane.stop().await?;
    b.backplane.stop().await?;
    Ok(())
}

#[tokio::test]
async fn node_that_missed_the_announcement_converges_on_sweep() -> anyhow::Result<()> {
    let store = store().await?;
    let hub = InMemoryTransport::new();
    let a = cluster_node(&hub, &store.repos);
    let late = cluster_node(&hub, &store.repos);
    a.backplane.start().await?;

    a.service
        .register_new_definition(DefinitionBuilder::new("orders").build())
        .await?;
    a.service
        .register_new_definition(DefinitionBuilder::new("orders").description("v2").build())
        .await?;

    // Joined after both announcements went out
    late.backplane.start().await?;
    assert_eq!(late.loader.load_count(), 0);

    let loaded = late.service.load_definitions_from_storage().await?;
    assert_eq!(loaded, 1);
    assert!(late.loader.is_registered("orders", 2));
    assert!(!late.loader.is_registered("orders", 1));
    Ok(())
}

#[tokio::test]
async fn announce_failure_does_not_fail_registration() -> anyhow::Result<()> {
    let store = store().await?;
    let transport = InMemoryTransport::new();
    transport.set_publish_failure(true);
    let loader = Arc::new(RecordingWorkflowLoader::new());
    let backplane = Arc::new(PubSubBackplane::new(
        Arc::new(transport),
        store.repos.definitions.clone(),
        loader.clone(),
    ));
    backplane.start().await?;
    let service = DefinitionService::new(
        store.repos.definitions.clone(),
        loader.clone(),
        loader.clone(),
        backplane.clone(),
    );

    let stored = service
        .register_new_definition(DefinitionBuilder::new("orders").build())
        .await?;
    assert_eq!(stored.version, 1);
    assert!(store.repos.definitions.find("orders", 1).await?.is_some());
    assert!(loader.is_registered("orders", 1));

    tokio::task::yield_now().await;
    assert!(backplane.is_started());
    Ok(())
}

#[tokio::test]
async fn replacing_a_version_reloads_it_everywhere() -> anyhow::Result<()> {
    let store = store().await?;
    let hub = InMemoryTransport::new();
    let a = cluster_node(&hub, &store.repos);
    let b = cluster_node(&hub, &store.repos);
    a.backplane.start().await?;
    b.backplane.start().await?;

    let v1 = a
        .service
        .register_new_definition(DefinitionBuilder::new("orders").build())
        .await?;
    assert!(b.loader.wait_for_loads(1, Duration::from_secs(2)).await);

    let fixed = DefinitionBuilder::new("orders")
        .version(v1.version)
        .description("fixed")
        .build();
    a.service.replace_version(&fixed).await?;

    assert!(b.loader.wait_for_loads(2, Duration::from_secs(2)).await);
    assert_eq!(a.loader.deregistered(), vec![("orders".to_string(), 1)]);
    assert_eq!(
        store.repos.definitions.find("orders", 1).await?.and_then(|d| d.description),
        Some("fixed".to_string())
    );
    Ok(())
}
