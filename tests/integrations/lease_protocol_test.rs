//! Lease protocol scenarios: concurrent workers, retries and releases.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conductor_core::{ActivityToken, SubscriptionId};
use conductor_integration_tests::utils::{activity_service, store};
use conductor_test_utils::SubscriptionBuilder;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn concurrent_workers_never_share_a_subscription() -> anyhow::Result<()> {
    let store = store().await?;
    let mut created = HashSet::new();
    for n in 0..3 {
        let sub = SubscriptionBuilder::activity("resize-image")
            .data(json!({ "image": n }))
            .build();
        created.insert(store.repos.subscriptions.create_event_subscription(&sub).await?);
    }

    let service = Arc::new(activity_service(&store.repos));
    let workers = (0..8).map(|w| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .get_pending_activity("resize-image", &format!("worker-{}", w), Duration::from_millis(150))
                .await
        })
    });

    let mut won = Vec::new();
    for result in futures::future::join_all(workers).await {
        if let Some(activity) = result?? {
            won.push(ActivityToken::decode(&activity.token)?.subscription_id);
        }
    }

    // Every subscription leased exactly once, the rest of the workers got nothing
    let distinct: HashSet<SubscriptionId> = won.iter().cloned().collect();
    assert_eq!(won.len(), 3);
    assert_eq!(distinct, created);
    Ok(())
}

#[tokio::test]
async fn loser_moves_on_to_the_next_open_subscription() -> anyhow::Result<()> {
    let store = store().await?;
    let repo = &store.repos.subscriptions;
    let first = repo
        .create_event_subscription(&SubscriptionBuilder::activity("ship").build())
        .await?;
    let second = repo
        .create_event_subscription(&SubscriptionBuilder::activity("ship").build())
        .await?;

    // Another worker already holds the first one
    assert!(
        repo.set_subscription_token(&first, "held", "worker-a", Utc::now() + chrono::Duration::minutes(5))
            .await?
    );

    let service = activity_service(&store.repos);
    let activity = service
        .get_pending_activity("ship", "worker-b", Duration::from_millis(100))
        .await?
        .expect("second subscription is open");
    assert_eq!(ActivityToken::decode(&activity.token)?.subscription_id, second);
    Ok(())
}

#[tokio::test]
async fn stale_release_leaves_the_current_lease_alone() -> anyhow::Result<()> {
    let store = store().await?;
    let id = store
        .repos
        .subscriptions
        .create_event_subscription(&SubscriptionBuilder::activity("ship").build())
        .await?;
    let service = activity_service(&store.repos);

    let first = service
        .get_pending_activity("ship", "worker-a", Duration::from_millis(50))
        .await?
        .expect("open subscription");
    assert!(service.release_activity_token(&first.token).await?);

    let second = service
        .get_pending_activity("ship", "worker-b", Duration::from_millis(50))
        .await?
        .expect("released subscription is open again");

    // worker-a retries its old release after worker-b took over
    assert!(!service.release_activity_token(&first.token).await?);

    let lease = store
        .repos
        .subscriptions
        .get_subscription(&id)
        .await?
        .and_then(|s| s.lease)
        .expect("worker-b still holds the lease");
    assert_eq!(lease.token, second.token);
    assert_eq!(lease.worker_id, "worker-b");
    Ok(())
}

#[tokio::test]
async fn expired_lease_still_blocks_until_released() -> anyhow::Result<()> {
    let store = store().await?;
    let id = store
        .repos
        .subscriptions
        .create_event_subscription(&SubscriptionBuilder::activity("ship").build())
        .await?;
    let repo = &store.repos.subscriptions;
    assert!(
        repo.set_subscription_token(&id, "old", "worker-a", Utc::now() - chrono::Duration::seconds(1))
            .await?
    );

    let service = activity_service(&store.repos);
    let nothing = service
        .get_pending_activity("ship", "worker-b", Duration::from_millis(30))
        .await?;
    assert!(nothing.is_none());

    assert!(repo.clear_subscription_token(&id, "old").await?);
    let activity = service
        .get_pending_activity("ship", "worker-b", Duration::from_millis(30))
        .await?;
    assert!(activity.is_some());
    Ok(())
}
