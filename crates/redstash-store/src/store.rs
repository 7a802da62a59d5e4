//! The store protocol: primitive commands the cache manager builds on.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Reply from a server-side script, store-agnostic.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptReply {
    Nil,
    Int(i64),
    Data(String),
    Array(Vec<ScriptReply>),
}

impl ScriptReply {
    /// The reply as a string, when it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptReply::Data(s) => Some(s),
            _ => None,
        }
    }

    /// The reply as an integer, when it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptReply::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Primitive commands over a Redis-compatible remote store.
///
/// Values are serialized strings; typed encoding belongs to the layer above.
/// TTL conventions follow the store: [`RemoteStore::ttl`] returns `-2` for a
/// missing key, `-1` for a key without expiry, and the remaining seconds
/// otherwise.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get the string value of a key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a key, with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Set a key only when absent, with a TTL. Returns whether the key was set.
    /// Atomic; this is the lock-acquisition primitive.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete keys. Returns the number of keys actually deleted.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Delete a key only when its current value equals `expected`. Atomic;
    /// this is the token-checked lock release.
    async fn del_if_equal(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Set a TTL on an existing key. Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining TTL in seconds: `-2` missing, `-1` no expiry.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically adjust an integer value, initializing a missing key from
    /// zero. Returns the value after the adjustment.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Set a hash field. Returns whether the field was newly created.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Get a hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// All fields and values of a hash.
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Delete hash fields. Returns the number of fields actually removed.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError>;

    /// Whether a hash field exists.
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Add a member to a sorted set, or update its score. Returns the number
    /// of members newly added.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError>;

    /// Members in a rank range, ascending by score. Inclusive indices;
    /// negative indices count from the end (`-1` is the last member).
    async fn zrange(&self, key: &str, start: isize, stop: isize)
    -> Result<Vec<String>, StoreError>;

    /// Append to a list. Returns the list length after the push.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Blocking pop from the head of a list, up to `timeout`.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Add a member to a set. Returns whether it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of a set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Publish a message to a channel. Returns the receiver count.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError>;

    /// Subscribe to a channel. Messages arrive on the returned receiver until
    /// it is dropped. Broadcast semantics: every subscriber receives every
    /// message published while it is connected; nothing is persisted.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError>;

    /// Execute a server-side atomic script.
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, StoreError>;
}
