//! Local in-process cache tier.
//!
//! A private, per-process map of serialized payloads with per-entry TTL,
//! bounded by FIFO eviction. The remote store is always the source of truth;
//! this tier only absorbs repeated reads between remote round-trips, so
//! entries here may be up to their local TTL stale relative to a remote
//! change. Expired entries are dropped lazily on read and by a periodic sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct LocalEntry {
    payload: String,
    expires_at: Instant,
}

struct State {
    map: HashMap<String, LocalEntry>,
    order: VecDeque<String>, // FIFO eviction
}

/// The local tier. Cloning shares the underlying map.
#[derive(Clone)]
pub struct LocalCache {
    inner: Arc<Mutex<State>>,
    max_entries: usize,
}

impl LocalCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                map: HashMap::new(),
                order: VecDeque::new(),
            })),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the serialized payload when present and not expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut state = self.inner.lock().expect("local cache mutex poisoned");
        match state.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                state.map.remove(key);
                state.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, payload: String, ttl: Duration) {
        let mut state = self.inner.lock().expect("local cache mutex poisoned");
        if !state.map.contains_key(key) {
            state.order.push_back(key.to_string());
        }
        state.map.insert(
            key.to_string(),
            LocalEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
        while state.order.len() > self.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.map.remove(&oldest);
            }
        }
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.inner.lock().expect("local cache mutex poisoned");
        if state.map.remove(key).is_some() {
            state.order.retain(|k| k != key);
        }
    }

    /// Drops every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut state = self.inner.lock().expect("local cache mutex poisoned");
        state.map.retain(|_, entry| entry.expires_at > now);
        let live: Vec<String> = state
            .order
            .iter()
            .filter(|k| state.map.contains_key(*k))
            .cloned()
            .collect();
        state.order = live.into();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("local cache mutex poisoned").map.len()
    }

    /// Spawns the periodic sweep task. The caller owns the handle and aborts
    /// it when the manager drops.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep();
                debug!(cache.operation = "LOCAL_SWEEP", "Local tier sweep complete");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = LocalCache::new(16);
        cache.insert("a:b:c", "payload".into(), Duration::from_secs(2));
        assert_eq!(cache.get("a:b:c"), Some("payload".to_string()));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get("a:b:c"), None);
    }

    #[tokio::test]
    async fn test_fifo_eviction_at_capacity() {
        let cache = LocalCache::new(2);
        cache.insert("k:1:a", "1".into(), Duration::from_secs(60));
        cache.insert("k:2:a", "2".into(), Duration::from_secs(60));
        cache.insert("k:3:a", "3".into(), Duration::from_secs(60));

        assert_eq!(cache.get("k:1:a"), None);
        assert_eq!(cache.get("k:2:a"), Some("2".to_string()));
        assert_eq!(cache.get("k:3:a"), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_reinsert_does_not_duplicate_order_slot() {
        let cache = LocalCache::new(2);
        cache.insert("k:1:a", "1".into(), Duration::from_secs(60));
        cache.insert("k:1:a", "1b".into(), Duration::from_secs(60));
        cache.insert("k:2:a", "2".into(), Duration::from_secs(60));

        assert_eq!(cache.get("k:1:a"), Some("1b".to_string()));
        assert_eq!(cache.get("k:2:a"), Some("2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired_entries() {
        let cache = LocalCache::new(16);
        cache.insert("k:1:a", "1".into(), Duration::from_secs(1));
        cache.insert("k:2:a", "2".into(), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k:2:a"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = LocalCache::new(16);
        cache.insert("k:1:a", "1".into(), Duration::from_secs(60));
        cache.remove("k:1:a");
        assert_eq!(cache.get("k:1:a"), None);
    }
}
