//! Redis-backed implementation of the store protocol.
//!
//! Commands run through a shared [`ConnectionManager`] which reconnects
//! transparently; subscriptions get a dedicated pub/sub connection each.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, Value, aio::ConnectionManager};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{RemoteStore, ScriptReply};

/// Release a key only when it still holds the expected value.
const DEL_IF_EQUAL_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end";

/// Capacity of the per-subscription message buffer. A subscriber that stalls
/// longer than this backlog loses messages, matching the no-delivery-guarantee
/// contract of pub/sub.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Store protocol implementation over Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    client: Client,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - connection URL (e.g., "redis://localhost:6379/0")
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the connection cannot be
    /// established.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        Ok(Self { conn, client })
    }
}

fn convert_value(value: Value) -> ScriptReply {
    match value {
        Value::Nil => ScriptReply::Nil,
        Value::Int(n) => ScriptReply::Int(n),
        Value::BulkString(bytes) => {
            ScriptReply::Data(String::from_utf8_lossy(&bytes).into_owned())
        }
        Value::SimpleString(s) => ScriptReply::Data(s),
        Value::Okay => ScriptReply::Data("OK".into()),
        Value::Array(items) => ScriptReply::Array(items.into_iter().map(convert_value).collect()),
        other => ScriptReply::Data(format!("{other:?}")),
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.del(keys.to_vec()).await?)
    }

    async fn del_if_equal(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let reply = self
            .eval(DEL_IF_EQUAL_SCRIPT, &[key.to_string()], &[expected.to_string()])
            .await?;
        Ok(reply.as_int().unwrap_or(0) > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.expire(key, ttl.as_secs().max(1) as i64).await?)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.ttl(key).await?)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, delta).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let created: u64 = conn.hset(key, field, value).await?;
        Ok(created > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map.into_iter().collect())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.hdel(key, fields.to_vec()).await?)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.hexists(key, field).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zadd(key, member, score).await?)
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zrange(key, start, stop).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.rpush(key, value).await?)
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.blpop(key, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            loop {
                tokio::select! {
                    message = stream.next() => {
                        let Some(message) = message else { break };
                        match message.get_payload::<String>() {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(pubsub.channel = %channel, error = %e, "Dropping undecodable pub/sub payload");
                            }
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, StoreError> {
        let mut conn = self.conn.clone();
        let value: Value = redis::cmd("EVAL")
            .arg(script)
            .arg(keys.len())
            .arg(keys.to_vec())
            .arg(args.to_vec())
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(e.to_string()))?;
        Ok(convert_value(value))
    }
}
