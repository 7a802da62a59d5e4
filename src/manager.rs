//! The cache manager facade.
//!
//! Orchestrates the serialization codec, key convention, local tier, and
//! distributed lock over an [`Arc<dyn RemoteStore>`]. The remote store is the
//! source of truth; the local tier is a disposable, per-process copy of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redstash_config::RedisConfig;
use redstash_store::{RedisStore, RemoteStore, ScriptReply};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::codec;
use crate::error::CacheError;
use crate::key;
use crate::local::LocalCache;
use crate::lock;
use crate::pubsub::{self, Subscription};

/// TTL of the cache-fill lock taken inside `get_or_set`, which also bounds how
/// long concurrent callers wait for the winner. Long enough for a slow
/// factory, short enough that a crashed filler frees the key promptly.
const FILL_LOCK_TTL: Duration = Duration::from_secs(10);

/// Distributed cache manager.
///
/// All operations are async and caller-driven; the only background work is
/// the local-tier sweep and the dispatch loops behind [`Subscription`]
/// handles. Cloning is cheap and shares the store connection and local tier.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn RemoteStore>,
    local: Option<LocalCache>,
    sweeper: Option<Arc<SweeperHandle>>,
    key_prefix: String,
    default_ttl: Duration,
}

/// Owns the sweep task; aborts it when the last manager clone drops.
struct SweeperHandle(JoinHandle<()>);

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("key_prefix", &self.key_prefix)
            .field("default_ttl", &self.default_ttl)
            .field("local_tier", &self.local.is_some())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Connects to the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disabled`] when caching is disabled in
    /// configuration, or a connection error from the store.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        if !config.enabled {
            return Err(CacheError::Disabled);
        }
        let store = RedisStore::connect(&config.redis_url()).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Builds a manager over an already constructed store backend.
    ///
    /// This is the seam the tests use with
    /// [`MemoryStore`](redstash_store::MemoryStore).
    pub fn with_store(store: Arc<dyn RemoteStore>, config: &RedisConfig) -> Self {
        let (local, sweeper) = if config.local_tier.enabled {
            let cache = LocalCache::new(config.local_tier.max_entries);
            let sweeper = cache
                .spawn_sweeper(Duration::from_secs(config.local_tier.sweep_interval_seconds));
            (Some(cache), Some(Arc::new(SweeperHandle(sweeper))))
        } else {
            (None, None)
        };

        Self {
            store,
            local,
            sweeper,
            key_prefix: config.key_prefix.clone(),
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        key::prefixed(&self.key_prefix, key)
    }

    /// The local tier, when this entry qualifies for it: the tier is enabled
    /// and the local TTL is positive and strictly below the remote TTL, so a
    /// local copy never outlives the authoritative remote one.
    fn local_for(&self, local_ttl: Duration, remote_ttl: Duration) -> Option<&LocalCache> {
        if local_ttl > Duration::ZERO && local_ttl < remote_ttl {
            self.local.as_ref()
        } else {
            None
        }
    }

    /// Gets a cached value.
    ///
    /// Reads the remote tier only; the local tier is consulted exclusively by
    /// [`get_or_set`](Self::get_or_set), whose caller has declared a local
    /// TTL. Returns `Ok(None)` on miss and on a payload that no longer
    /// deserializes; infrastructure errors propagate.
    #[instrument(skip(self), fields(cache.operation = "GET"))]
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.store.get(&self.prefixed(key)).await? {
            Some(raw) => {
                debug!(cache.key = %key, "Cache hit");
                Ok(codec::decode_or_miss(key, &raw))
            }
            None => {
                debug!(cache.key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Returns the cached value, computing and storing it on miss.
    ///
    /// When `local_ttl` is positive and below `remote_ttl`, the local tier is
    /// checked first and refreshed on every remote read, so a remote change
    /// becomes visible to this process within `local_ttl` rather than
    /// immediately. On a miss the factory runs under a distributed lock keyed
    /// on `key`, so across all processes it is invoked at most once per miss
    /// window; concurrent callers wait for the winner and then read its
    /// result.
    ///
    /// The lock is not reentrant: a factory that calls back into
    /// [`with_lock`](Self::with_lock) for the same resource fails fast with
    /// [`CacheError::NestedLock`].
    #[instrument(skip(self, factory), fields(cache.operation = "GET_OR_SET"))]
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        factory: F,
        remote_ttl: Duration,
        local_ttl: Duration,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        key::validate(key)?;
        let physical = self.prefixed(key);
        let local = self.local_for(local_ttl, remote_ttl);

        if let Some(local) = local {
            if let Some(raw) = local.get(&physical) {
                if let Some(value) = codec::decode_or_miss(key, &raw) {
                    debug!(cache.key = %key, "Local tier hit");
                    return Ok(value);
                }
                local.remove(&physical);
            }
        }

        if let Some(raw) = self.store.get(&physical).await? {
            if let Some(value) = codec::decode_or_miss(key, &raw) {
                debug!(cache.key = %key, "Cache hit");
                if let Some(local) = local {
                    local.insert(&physical, raw, local_ttl);
                }
                return Ok(value);
            }
        }

        debug!(cache.key = %key, "Cache miss, filling under lock");
        let filled = self
            .with_lock(key, FILL_LOCK_TTL, true, || async {
                // Re-check: another caller may have filled while we waited.
                if let Some(raw) = self.store.get(&physical).await? {
                    if let Some(value) = codec::decode_or_miss(key, &raw) {
                        if let Some(local) = local {
                            local.insert(&physical, raw, local_ttl);
                        }
                        return Ok(value);
                    }
                }

                let value = factory().await?;
                let raw = codec::encode(&value)?;
                self.store.set(&physical, &raw, Some(remote_ttl)).await?;
                if let Some(local) = local {
                    local.insert(&physical, raw, local_ttl);
                }
                Ok(value)
            })
            .await?;

        filled.ok_or(CacheError::LockTimeout {
            resource: key.to_string(),
        })
    }

    /// Writes a value unconditionally.
    ///
    /// `ttl` of `None` applies the configured default TTL. A key that does
    /// not follow the naming convention is rejected with
    /// [`CacheError::InvalidKey`].
    #[instrument(skip(self, value), fields(cache.operation = "SET"))]
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        key::validate(key)?;
        let raw = codec::encode(value)?;
        let physical = self.prefixed(key);
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.store.set(&physical, &raw, Some(ttl)).await?;
        // Direct writes drop this process's local copy rather than refresh
        // it; the next get_or_set re-reads the authoritative value.
        if let Some(local) = &self.local {
            local.remove(&physical);
        }
        debug!(cache.key = %key, cache.ttl_secs = %ttl.as_secs(), "Cache set");
        Ok(true)
    }

    /// Whether a key exists remotely.
    #[instrument(skip(self), fields(cache.operation = "EXISTS"))]
    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.exists(&self.prefixed(key)).await?)
    }

    /// Removes a key from both tiers. Returns 1 when the remote key existed.
    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    pub async fn remove(&self, key: &str) -> Result<u64, CacheError> {
        self.remove_many(std::slice::from_ref(&key.to_string())).await
    }

    /// Removes a batch of keys. Returns the count actually deleted remotely.
    #[instrument(skip(self, keys), fields(cache.operation = "DEL"))]
    pub async fn remove_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let physical: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        if let Some(local) = &self.local {
            for key in &physical {
                local.remove(key);
            }
        }
        let deleted = self.store.del(&physical).await?;
        debug!(cache.deleted = %deleted, "Cache keys removed");
        Ok(deleted)
    }

    /// Sets a TTL on an existing key. Returns false when the key is missing.
    #[instrument(skip(self), fields(cache.operation = "EXPIRE"))]
    pub async fn key_expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        Ok(self.store.expire(&self.prefixed(key), ttl).await?)
    }

    /// Remaining TTL of a key. `None` when the key is missing or has no
    /// expiry.
    #[instrument(skip(self), fields(cache.operation = "TTL"))]
    pub async fn key_time_to_live(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let ttl = self.store.ttl(&self.prefixed(key)).await?;
        Ok((ttl >= 0).then(|| Duration::from_secs(ttl as u64)))
    }

    /// Adds a member to a sorted set, or updates its score. Returns the
    /// number of members newly added.
    #[instrument(skip(self, member), fields(cache.operation = "ZADD"))]
    pub async fn sorted_set_add<T>(
        &self,
        key: &str,
        member: &T,
        score: f64,
    ) -> Result<u64, CacheError>
    where
        T: Serialize,
    {
        let raw = codec::encode(member)?;
        Ok(self.store.zadd(&self.prefixed(key), &raw, score).await?)
    }

    /// Members in a rank range, ascending by score. Inclusive indices,
    /// negative counting from the end; `(0, -1)` returns the whole set.
    #[instrument(skip(self), fields(cache.operation = "ZRANGE"))]
    pub async fn sorted_set_range_by_rank<T>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let rows = self.store.zrange(&self.prefixed(key), start, stop).await?;
        rows.iter().map(|raw| codec::decode(raw)).collect()
    }

    /// Sets a hash field, optionally (re)applying a TTL to the whole hash.
    /// Returns whether the field was newly created.
    #[instrument(skip(self, value), fields(cache.operation = "HSET"))]
    pub async fn hash_set<T>(
        &self,
        key: &str,
        field: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let raw = codec::encode(value)?;
        let physical = self.prefixed(key);
        let created = self.store.hset(&physical, field, &raw).await?;
        if let Some(ttl) = ttl {
            self.store.expire(&physical, ttl).await?;
        }
        Ok(created)
    }

    /// Gets a hash field. Missing field and undecodable payload both read as
    /// `Ok(None)`.
    #[instrument(skip(self), fields(cache.operation = "HGET"))]
    pub async fn hash_get<T>(&self, key: &str, field: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.store.hget(&self.prefixed(key), field).await? {
            Some(raw) => Ok(codec::decode_or_miss(key, &raw)),
            None => Ok(None),
        }
    }

    /// All fields of a hash, deserialized.
    ///
    /// Fails fast on the first field that does not deserialize, naming it in
    /// [`CacheError::FieldDeserialization`]; callers wanting best-effort reads
    /// fall back to per-field [`hash_get`](Self::hash_get).
    #[instrument(skip(self), fields(cache.operation = "HGETALL"))]
    pub async fn hash_get_all<T>(&self, key: &str) -> Result<HashMap<String, T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let rows = self.store.hgetall(&self.prefixed(key)).await?;
        let mut values = HashMap::with_capacity(rows.len());
        for (field, raw) in rows {
            let value =
                serde_json::from_str(&raw).map_err(|e| CacheError::FieldDeserialization {
                    key: key.to_string(),
                    field: field.clone(),
                    source: e,
                })?;
            values.insert(field, value);
        }
        Ok(values)
    }

    /// Deletes hash fields. Sibling fields are untouched. Returns the count
    /// actually removed.
    #[instrument(skip(self, fields), fields(cache.operation = "HDEL"))]
    pub async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<u64, CacheError> {
        Ok(self.store.hdel(&self.prefixed(key), fields).await?)
    }

    /// Whether a hash field exists.
    #[instrument(skip(self), fields(cache.operation = "HEXISTS"))]
    pub async fn hash_exists(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        Ok(self.store.hexists(&self.prefixed(key), field).await?)
    }

    /// Atomically increments an integer value, initializing a missing key
    /// from zero, optionally (re)applying a TTL. The adjustment is a single
    /// store-side operation, never a client read-modify-write.
    #[instrument(skip(self), fields(cache.operation = "INCRBY"))]
    pub async fn string_increment(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, CacheError> {
        let physical = self.prefixed(key);
        let adjusted = self.store.incr_by(&physical, value).await?;
        if let Some(ttl) = ttl {
            self.store.expire(&physical, ttl).await?;
        }
        Ok(adjusted)
    }

    /// Atomically decrements an integer value. See
    /// [`string_increment`](Self::string_increment).
    #[instrument(skip(self), fields(cache.operation = "DECRBY"))]
    pub async fn string_decrement(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, CacheError> {
        self.string_increment(key, -value, ttl).await
    }

    /// Runs `func` under a named distributed lock.
    ///
    /// The lock is released on every exit path: success, an error from
    /// `func`, and cancellation (the guard spawns its release when dropped
    /// unreleased). With `wait` false a held lock yields `Ok(None)`
    /// immediately; with `wait` true acquisition retries until `expires`
    /// elapses, then reports [`CacheError::LockTimeout`].
    ///
    /// Not reentrant: acquiring a resource this task already holds fails
    /// fast with [`CacheError::NestedLock`] instead of deadlocking until the
    /// outer hold expires.
    #[instrument(skip(self, func), fields(cache.operation = "LOCK"))]
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource: &str,
        expires: Duration,
        wait: bool,
        func: F,
    ) -> Result<Option<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        if lock::already_held(resource) {
            return Err(CacheError::NestedLock {
                resource: resource.to_string(),
            });
        }

        let store = Arc::clone(&self.store);
        let lock_key = self.prefixed(&format!("lock:{resource}"));
        let resource_name = resource.to_string();
        lock::track(resource.to_string(), async move {
            match lock::acquire(&store, &resource_name, &lock_key, expires, wait).await? {
                None => Ok(None),
                Some(guard) => {
                    let result = func().await;
                    guard.release().await;
                    result.map(Some)
                }
            }
        })
        .await
    }

    /// Publishes a message to a channel. Returns the receiver count.
    /// Fire-and-forget: no delivery guarantee, nothing persisted.
    #[instrument(skip(self, message), fields(cache.operation = "PUBLISH"))]
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u64, CacheError> {
        Ok(self.store.publish(&self.prefixed(channel), message).await?)
    }

    /// Subscribes to a channel with broadcast semantics: every subscription
    /// receives every message published while it is live. Delivery stops when
    /// the returned handle drops.
    #[instrument(skip(self, on_message), fields(cache.operation = "SUBSCRIBE"))]
    pub async fn subscribe<F>(&self, channel: &str, on_message: F) -> Result<Subscription, CacheError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let physical = self.prefixed(channel);
        let rx = self.store.subscribe(&physical).await?;
        Ok(pubsub::spawn_dispatch(physical, rx, on_message))
    }

    /// Subscribes to a list-broadcast group as `client_id`.
    ///
    /// Competing-consumer fanout: subscribers sharing a `client_id` compete,
    /// so each message goes to exactly one of them; subscribers with distinct
    /// ids each receive every message. Pair with
    /// [`publish_list_broadcast`](Self::publish_list_broadcast).
    #[instrument(skip(self, on_message), fields(cache.operation = "SUBSCRIBE_LIST"))]
    pub async fn subscribe_list_broadcast<F>(
        &self,
        list_key: &str,
        client_id: &str,
        on_message: F,
    ) -> Result<Subscription, CacheError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let registry = self.prefixed(&format!("{list_key}:clients"));
        let consumer = self.prefixed(&format!("{list_key}:{client_id}"));
        self.store.sadd(&registry, client_id).await?;
        Ok(pubsub::spawn_list_consumer(
            Arc::clone(&self.store),
            consumer,
            on_message,
        ))
    }

    /// Publishes a message to every client id registered on a list-broadcast
    /// group. Returns the number of client lists pushed to.
    #[instrument(skip(self, message), fields(cache.operation = "PUBLISH_LIST"))]
    pub async fn publish_list_broadcast(
        &self,
        list_key: &str,
        message: &str,
    ) -> Result<u64, CacheError> {
        let registry = self.prefixed(&format!("{list_key}:clients"));
        let clients = self.store.smembers(&registry).await?;
        for client in &clients {
            let consumer = self.prefixed(&format!("{list_key}:{client}"));
            self.store.rpush(&consumer, message).await?;
        }
        Ok(clients.len() as u64)
    }

    /// Executes a server-side atomic script. Keys are prefixed like every
    /// other operation so scripts can address values written through the
    /// manager; script failures carry the store's diagnostic verbatim.
    #[instrument(skip(self, script, args), fields(cache.operation = "EVAL"))]
    pub async fn get_by_lua_script(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, CacheError> {
        let keys: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        Ok(self.store.eval(script, &keys, args).await?)
    }
}
