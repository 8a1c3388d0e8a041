//! Index preparation across node restarts and concurrent startups.

use conductor_core::domain::indexes::expected_indexes;
use conductor_core::{Collection, IndexManager};
use conductor_state_inmemory::InMemoryStateStoreProvider;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn second_startup_is_a_noop() -> anyhow::Result<()> {
    let provider = InMemoryStateStoreProvider::new();
    let indexes = provider.create_repositories().indexes;

    indexes.ensure_indexes().await?;
    let first = indexes.list_indexes().await?;
    indexes.ensure_indexes().await?;
    let second = indexes.list_indexes().await?;

    assert_eq!(first, expected_indexes());
    assert_eq!(second, first);
    Ok(())
}

#[tokio::test]
async fn nodes_starting_together_converge() -> anyhow::Result<()> {
    let provider = InMemoryStateStoreProvider::new();
    let a = provider.create_repositories().indexes;
    let b = provider.create_repositories().indexes;

    let (ra, rb) = tokio::join!(a.ensure_indexes(), b.ensure_indexes());
    ra?;
    rb?;

    assert_eq!(a.list_indexes().await?, expected_indexes());
    Ok(())
}

#[tokio::test]
async fn upgrade_replaces_legacy_names() -> anyhow::Result<()> {
    let provider = InMemoryStateStoreProvider::new();
    let manager = provider.index_manager();

    // Layout left behind by an older release
    manager
        .create_index(Collection::Events, "idx_namekey", &["event_name", "event_key", "event_time"], false)
        .await?;
    manager
        .create_index(Collection::Events, "idx_processed", &["is_processed"], false)
        .await?;
    manager
        .create_index(Collection::Subscriptions, "idx_namekey", &["event_name", "event_key"], false)
        .await?;

    manager.ensure_indexes().await?;

    let names: Vec<String> = manager
        .list_indexes()
        .await?
        .into_iter()
        .map(|d| format!("{}.{}", d.collection, d.name))
        .collect();
    assert!(!names.contains(&"events.idx_namekey".to_string()));
    assert!(!names.contains(&"subscriptions.idx_namekey".to_string()));
    assert!(names.contains(&"events.idx_event_namekey".to_string()));
    assert_eq!(manager.list_indexes().await?, expected_indexes());
    Ok(())
}

#[tokio::test]
async fn unreachable_store_fails_startup() {
    let provider = InMemoryStateStoreProvider::new();
    provider.set_available(false);
    let err = provider
        .create_repositories()
        .indexes
        .ensure_indexes()
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());
}
