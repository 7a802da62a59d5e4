use std::sync::Arc;

use redstash::{CacheManager, MemoryStore, RedisConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: u64,
    pub total_cents: i64,
}

#[allow(dead_code)]
pub fn order(id: u64) -> Order {
    Order {
        id,
        total_cents: (id as i64) * 100,
    }
}

/// A manager over a shared in-memory store, plus a handle to that store for
/// direct manipulation (corrupting payloads, simulating remote writes).
#[allow(dead_code)]
pub fn manager_with(config: RedisConfig) -> (CacheManager, MemoryStore) {
    let store = MemoryStore::new();
    let manager = CacheManager::with_store(Arc::new(store.clone()), &config);
    (manager, store)
}

pub fn manager() -> (CacheManager, MemoryStore) {
    manager_with(RedisConfig {
        key_prefix: "test".into(),
        ..RedisConfig::default()
    })
}
