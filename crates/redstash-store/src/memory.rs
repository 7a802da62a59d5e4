//! In-process implementation of the store protocol.
//!
//! Backs the manager's test suite so the full contract can be exercised
//! without a running server. Single keyspace guarded by a mutex, lazy expiry
//! on access. Uses `tokio::time::Instant` so paused-clock tests drive TTL
//! behavior deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::{RemoteStore, ScriptReply};

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Clone, Debug)]
enum Kind {
    Str(String),
    Hash(HashMap<String, String>),
    Zset(Vec<(String, f64)>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

impl Kind {
    fn name(&self) -> &'static str {
        match self {
            Kind::Str(_) => "string",
            Kind::Hash(_) => "hash",
            Kind::Zset(_) => "zset",
            Kind::List(_) => "list",
            Kind::Set(_) => "set",
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    kind: Kind,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store implementing the full [`RemoteStore`] contract except
/// server-side scripting.
#[derive(Clone, Default)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<HashMap<String, Entry>>>,
    channels: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<String>>>>>,
    list_signals: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` against the live (non-expired) entry map.
    fn with_keyspace<T>(&self, op: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let now = Instant::now();
        let mut map = self.keyspace.lock().expect("keyspace mutex poisoned");
        map.retain(|_, entry| !entry.is_expired(now));
        op(&mut map, now)
    }

    fn wrong_kind(key: &str, entry: &Entry, wanted: &str) -> StoreError {
        StoreError::WrongKind {
            key: key.to_string(),
            detail: format!("holds {}, command needs {wanted}", entry.kind.name()),
        }
    }

    fn list_signal(&self, key: &str) -> Arc<Notify> {
        let mut signals = self.list_signals.lock().expect("signal mutex poisoned");
        signals.entry(key.to_string()).or_default().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => match &entry.kind {
                Kind::Str(value) => Ok(Some(value.clone())),
                _ => Err(Self::wrong_kind(key, entry, "string")),
            },
            None => Ok(None),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with_keyspace(|map, now| {
            map.insert(
                key.to_string(),
                Entry {
                    kind: Kind::Str(value.to_string()),
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        });
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.with_keyspace(|map, now| {
            if map.contains_key(key) {
                return false;
            }
            map.insert(
                key.to_string(),
                Entry {
                    kind: Kind::Str(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            true
        }))
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        Ok(self.with_keyspace(|map, _| {
            keys.iter().filter(|key| map.remove(*key).is_some()).count() as u64
        }))
    }

    async fn del_if_equal(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        Ok(self.with_keyspace(|map, _| {
            let matches = matches!(
                map.get(key),
                Some(Entry { kind: Kind::Str(value), .. }) if value.as_str() == expected
            );
            if matches {
                map.remove(key);
            }
            matches
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.with_keyspace(|map, _| map.contains_key(key)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.with_keyspace(|map, now| match map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.with_keyspace(|map, now| match map.get(key) {
            Some(Entry { expires_at: Some(at), .. }) => {
                (at.saturating_duration_since(now)).as_secs_f64().ceil() as i64
            }
            Some(Entry { expires_at: None, .. }) => -1,
            None => -2,
        }))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_keyspace(|map, _| match map.get_mut(key) {
            Some(entry) => {
                let Kind::Str(value) = &mut entry.kind else {
                    return Err(Self::wrong_kind(key, entry, "string"));
                };
                let current: i64 = value.parse().map_err(|_| StoreError::WrongKind {
                    key: key.to_string(),
                    detail: "value is not an integer".into(),
                })?;
                let next = current + delta;
                *value = next.to_string();
                Ok(next)
            }
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        kind: Kind::Str(delta.to_string()),
                        expires_at: None,
                    },
                );
                Ok(delta)
            }
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.with_keyspace(|map, _| {
            let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
                kind: Kind::Hash(HashMap::new()),
                expires_at: None,
            });
            let Kind::Hash(fields) = &mut entry.kind else {
                return Err(Self::wrong_kind(key, entry, "hash"));
            };
            Ok(fields.insert(field.to_string(), value.to_string()).is_none())
        })
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => match &entry.kind {
                Kind::Hash(fields) => Ok(fields.get(field).cloned()),
                _ => Err(Self::wrong_kind(key, entry, "hash")),
            },
            None => Ok(None),
        })
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => match &entry.kind {
                Kind::Hash(fields) => Ok(fields
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()),
                _ => Err(Self::wrong_kind(key, entry, "hash")),
            },
            None => Ok(Vec::new()),
        })
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError> {
        self.with_keyspace(|map, _| match map.get_mut(key) {
            Some(entry) => {
                let Kind::Hash(existing) = &mut entry.kind else {
                    return Err(Self::wrong_kind(key, entry, "hash"));
                };
                let removed = fields
                    .iter()
                    .filter(|field| existing.remove(*field).is_some())
                    .count() as u64;
                if existing.is_empty() {
                    map.remove(key);
                }
                Ok(removed)
            }
            None => Ok(0),
        })
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => match &entry.kind {
                Kind::Hash(fields) => Ok(fields.contains_key(field)),
                _ => Err(Self::wrong_kind(key, entry, "hash")),
            },
            None => Ok(false),
        })
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<u64, StoreError> {
        self.with_keyspace(|map, _| {
            let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
                kind: Kind::Zset(Vec::new()),
                expires_at: None,
            });
            let Kind::Zset(members) = &mut entry.kind else {
                return Err(Self::wrong_kind(key, entry, "zset"));
            };
            match members.iter_mut().find(|(m, _)| m == member) {
                Some((_, existing)) => {
                    *existing = score;
                    Ok(0)
                }
                None => {
                    members.push((member.to_string(), score));
                    Ok(1)
                }
            }
        })
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => {
                let Kind::Zset(members) = &entry.kind else {
                    return Err(Self::wrong_kind(key, entry, "zset"));
                };
                let mut ordered: Vec<_> = members.clone();
                // Score ascending, ties broken lexically like the real store.
                ordered.sort_by(|(ma, sa), (mb, sb)| {
                    sa.total_cmp(sb).then_with(|| ma.cmp(mb))
                });

                let len = ordered.len() as isize;
                let resolve = |index: isize| {
                    if index < 0 { len + index } else { index }
                };
                let from = resolve(start).max(0);
                let to = resolve(stop).min(len - 1);
                if from > to || from >= len {
                    return Ok(Vec::new());
                }
                Ok(ordered[from as usize..=to as usize]
                    .iter()
                    .map(|(member, _)| member.clone())
                    .collect())
            }
            None => Ok(Vec::new()),
        })
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let length = self.with_keyspace(|map, _| {
            let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
                kind: Kind::List(VecDeque::new()),
                expires_at: None,
            });
            let Kind::List(items) = &mut entry.kind else {
                return Err(Self::wrong_kind(key, entry, "list"));
            };
            items.push_back(value.to_string());
            Ok(items.len() as u64)
        })?;
        self.list_signal(key).notify_one();
        Ok(length)
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let signal = self.list_signal(key);
            let popped = self.with_keyspace(|map, _| match map.get_mut(key) {
                Some(entry) => {
                    let Kind::List(items) = &mut entry.kind else {
                        return Err(Self::wrong_kind(key, entry, "list"));
                    };
                    let item = items.pop_front();
                    if items.is_empty() {
                        map.remove(key);
                    }
                    Ok(item)
                }
                None => Ok(None),
            })?;
            if popped.is_some() {
                return Ok(popped);
            }
            if tokio::time::timeout_at(deadline, signal.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with_keyspace(|map, _| {
            let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
                kind: Kind::Set(HashSet::new()),
                expires_at: None,
            });
            let Kind::Set(members) = &mut entry.kind else {
                return Err(Self::wrong_kind(key, entry, "set"));
            };
            Ok(members.insert(member.to_string()))
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_keyspace(|map, _| match map.get(key) {
            Some(entry) => match &entry.kind {
                Kind::Set(members) => Ok(members.iter().cloned().collect()),
                _ => Err(Self::wrong_kind(key, entry, "set")),
            },
            None => Ok(Vec::new()),
        })
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError> {
        let senders: Vec<_> = {
            let channels = self.channels.lock().expect("channel mutex poisoned");
            channels.get(channel).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        for sender in &senders {
            if sender.send(message.to_string()).await.is_ok() {
                delivered += 1;
            }
        }

        // Prune subscribers that have gone away.
        let mut channels = self.channels.lock().expect("channel mutex poisoned");
        if let Some(senders) = channels.get_mut(channel) {
            senders.retain(|sender| !sender.is_closed());
            if senders.is_empty() {
                channels.remove(channel);
            }
        }

        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.channels
            .lock()
            .expect("channel mutex poisoned")
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn eval(
        &self,
        _script: &str,
        _keys: &[String],
        _args: &[String],
    ) -> Result<ScriptReply, StoreError> {
        Err(StoreError::Script(
            "scripting is not supported by the in-memory store".into(),
        ))
    }
}
