//! # Redstash Store
//!
//! The store protocol for the redstash cache manager.
//!
//! This crate provides:
//! - [`RemoteStore`]: an async trait over the primitive commands the cache
//!   manager needs from a remote key-value store (strings with TTL,
//!   set-if-absent, atomic increment, hash, sorted set, list, set, pub/sub,
//!   and server-side scripting)
//! - [`RedisStore`]: the Redis-backed implementation
//! - [`MemoryStore`]: an in-process implementation of the same contract, used
//!   to test the manager without a server
//!
//! The manager is written against `Arc<dyn RemoteStore>`; nothing above this
//! crate knows which backend is in play.

pub mod error;
pub mod memory;
pub mod redis;
pub mod store;

// Re-export commonly used types at crate root
pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::{RemoteStore, ScriptReply};
