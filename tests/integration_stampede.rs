mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Order, manager, manager_with, order};
use redstash::{LocalTierConfig, RedisConfig, RemoteStore};

const REMOTE_TTL: Duration = Duration::from_secs(60);
const LOCAL_TTL: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_concurrent_miss_invokes_factory_exactly_once() {
    let (cache, _) = manager();
    let factory_runs = Arc::new(AtomicUsize::new(0));

    let mut callers = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let factory_runs = Arc::clone(&factory_runs);
        callers.push(tokio::spawn(async move {
            cache
                .get_or_set(
                    "orders:repo:find_by_id:7",
                    || async move {
                        factory_runs.fetch_add(1, Ordering::SeqCst);
                        // A slow computation widens the miss window.
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(order(7))
                    },
                    REMOTE_TTL,
                    Duration::ZERO,
                )
                .await
        }));
    }

    for caller in callers {
        let observed = caller.await.unwrap().unwrap();
        assert_eq!(observed, order(7));
    }
    assert_eq!(factory_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hit_skips_factory() {
    let (cache, _) = manager();
    cache.set("orders:repo:find_by_id:1", &order(1), None).await.unwrap();

    let cached = cache
        .get_or_set(
            "orders:repo:find_by_id:1",
            || async { Ok(order(999)) },
            REMOTE_TTL,
            Duration::ZERO,
        )
        .await
        .unwrap();
    assert_eq!(cached, order(1));
}

#[tokio::test]
async fn test_get_or_set_rejects_malformed_key() {
    let (cache, _) = manager();
    let result = cache
        .get_or_set("orders", || async { Ok(order(1)) }, REMOTE_TTL, Duration::ZERO)
        .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_local_tier_serves_stale_value_within_local_ttl() {
    let (cache, store) = manager();
    let key = "orders:repo:find_by_id:1";
    let physical = "test:orders:repo:find_by_id:1";

    let first = cache
        .get_or_set(key, || async { Ok(order(1)) }, REMOTE_TTL, LOCAL_TTL)
        .await
        .unwrap();
    assert_eq!(first, order(1));

    // Another process updates the authoritative copy.
    let updated = serde_json::to_string(&order(2)).unwrap();
    store.set(physical, &updated, None).await.unwrap();

    // Still inside the local TTL: the stale local copy is served.
    let stale: Order = cache
        .get_or_set(key, || async { Ok(order(3)) }, REMOTE_TTL, LOCAL_TTL)
        .await
        .unwrap();
    assert_eq!(stale, order(1));

    // Past the local TTL: the remote update becomes visible, no factory run.
    tokio::time::advance(LOCAL_TTL + Duration::from_secs(1)).await;
    let fresh: Order = cache
        .get_or_set(key, || async { Ok(order(3)) }, REMOTE_TTL, LOCAL_TTL)
        .await
        .unwrap();
    assert_eq!(fresh, order(2));
}

#[tokio::test]
async fn test_local_ttl_not_below_remote_ttl_bypasses_local_tier() {
    let (cache, store) = manager();
    let key = "orders:repo:find_by_id:1";
    let physical = "test:orders:repo:find_by_id:1";

    cache
        .get_or_set(key, || async { Ok(order(1)) }, LOCAL_TTL, REMOTE_TTL)
        .await
        .unwrap();

    let updated = serde_json::to_string(&order(2)).unwrap();
    store.set(physical, &updated, None).await.unwrap();

    // local_ttl >= remote_ttl violates the tier invariant, so every read goes
    // remote and sees the update immediately.
    let fresh: Order = cache
        .get_or_set(key, || async { Ok(order(3)) }, LOCAL_TTL, REMOTE_TTL)
        .await
        .unwrap();
    assert_eq!(fresh, order(2));
}

#[tokio::test]
async fn test_disabled_local_tier_is_ignored() {
    let (cache, store) = manager_with(RedisConfig {
        key_prefix: "test".into(),
        local_tier: LocalTierConfig {
            enabled: false,
            ..LocalTierConfig::default()
        },
        ..RedisConfig::default()
    });
    let key = "orders:repo:find_by_id:1";
    let physical = "test:orders:repo:find_by_id:1";

    cache
        .get_or_set(key, || async { Ok(order(1)) }, REMOTE_TTL, LOCAL_TTL)
        .await
        .unwrap();

    let updated = serde_json::to_string(&order(2)).unwrap();
    store.set(physical, &updated, None).await.unwrap();

    let fresh: Order = cache
        .get_or_set(key, || async { Ok(order(3)) }, REMOTE_TTL, LOCAL_TTL)
        .await
        .unwrap();
    assert_eq!(fresh, order(2));
}

#[tokio::test]
async fn test_factory_error_propagates_and_leaves_no_entry() {
    let (cache, _) = manager();
    let key = "orders:repo:find_by_id:500";

    let upstream_failure =
        redstash::CacheError::from(redstash::StoreError::Script("upstream unavailable".into()));
    let result: Result<Order, _> = cache
        .get_or_set(
            key,
            || async { Err(upstream_failure) },
            REMOTE_TTL,
            Duration::ZERO,
        )
        .await;
    assert!(result.is_err());
    assert!(!cache.exists(key).await.unwrap());

    // The fill lock was released despite the error: a retry can fill.
    let recovered = cache
        .get_or_set(key, || async { Ok(order(500)) }, REMOTE_TTL, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(recovered, order(500));
}
