use std::time::Duration;

use meridian_provider_core::credential::ApiKeyCredential;
use meridian_provider_core::{
    Credential, CredentialPool, CredentialState, Event, EventHub, OperationalEvent,
    UnavailableReason,
};
use tokio::time::timeout;

#[tokio::test]
async fn unavailable_recovers_via_queue() {
    let hub = EventHub::new(16);
    let mut rx = hub.subscribe();
    let pool = CredentialPool::new(hub.clone());

    pool.insert(
        "test",
        1,
        Credential::Custom(ApiKeyCredential {
            api_key: "k".to_string(),
        }),
    )
    .await;

    pool.mark_unavailable(1, Duration::from_millis(50), UnavailableReason::RateLimit)
        .await;

    let ev = timeout(Duration::from_millis(200), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        ev,
        Event::Operational(OperationalEvent::UnavailableStart(_))
    ));

    let ev = timeout(Duration::from_millis(500), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        ev,
        Event::Operational(OperationalEvent::UnavailableEnd(_))
    ));

    let state = pool.state(1).await.unwrap();
    assert!(matches!(state, CredentialState::Active));
}

#[tokio::test]
async fn stale_queue_entry_does_not_recover_early() {
    let hub = EventHub::new(32);
    let pool = CredentialPool::new(hub);

    pool.insert(
        "test",
        1,
        Credential::Custom(ApiKeyCredential {
            api_key: "k".to_string(),
        }),
    )
    .await;

    pool.mark_unavailable(1, Duration::from_millis(80), UnavailableReason::Timeout)
        .await;
    pool.mark_unavailable(1, Duration::from_millis(200), UnavailableReason::Timeout)
        .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    let state = pool.state(1).await.unwrap();
    assert!(matches!(state, CredentialState::Unavailable { .. }));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let state = pool.state(1).await.unwrap();
    assert!(matches!(state, CredentialState::Active));
}

#[tokio::test]
async fn acquire_rotates_across_healthy_credentials() {
    let hub = EventHub::new(16);
    let pool = CredentialPool::new(hub);

    for id in [1i64, 2, 3] {
        pool.insert(
            "test",
            id,
            Credential::Custom(ApiKeyCredential {
                api_key: format!("k{id}"),
            }),
        )
        .await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (id, _) = pool.acquire("test").await.unwrap();
        seen.push(id);
    }

    // Three healthy credentials, three consecutive acquires: every id is
    // distinct, i.e. the selector advances instead of always returning the
    // first healthy entry.
    assert_eq!(seen.len(), 3);
    assert_ne!(seen[0], seen[1]);
    assert_ne!(seen[1], seen[2]);
    assert_ne!(seen[0], seen[2]);

    // The rotation wraps back around to the first credential on the fourth
    // acquire.
    let (fourth, _) = pool.acquire("test").await.unwrap();
    assert_eq!(fourth, seen[0]);
}
