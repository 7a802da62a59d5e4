mod common;

use std::time::Duration;

use common::{Order, order};
use redstash::{CacheManager, RedisConfig};

// Run with: cargo test -- --ignored
// Requires a Redis instance at REDIS_HOST/REDIS_PORT (default 127.0.0.1:6379).

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_round_trip_and_counter() {
    let config = RedisConfig {
        key_prefix: "redstash-smoke".into(),
        ..RedisConfig::from_env()
    };
    let cache = CacheManager::connect(&config).await.unwrap();

    cache.set("smoke:orders:find:1", &order(1), None).await.unwrap();
    let cached: Option<Order> = cache.get("smoke:orders:find:1").await.unwrap();
    assert_eq!(cached, Some(order(1)));

    assert_eq!(cache.string_increment("smoke:metrics:hits", 5, None).await.unwrap(), 5);
    assert_eq!(cache.string_increment("smoke:metrics:hits", 3, None).await.unwrap(), 8);

    let held = cache
        .with_lock("smoke:lock", Duration::from_secs(5), true, || async { Ok(1) })
        .await
        .unwrap();
    assert_eq!(held, Some(1));

    let reply = cache
        .get_by_lua_script("return redis.call('get', KEYS[1])", &["smoke:orders:find:1".to_string()], &[])
        .await
        .unwrap();
    assert!(reply.as_str().is_some());

    cache
        .remove_many(&["smoke:orders:find:1".into(), "smoke:metrics:hits".into()])
        .await
        .unwrap();
}
