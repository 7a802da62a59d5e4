//! # Redstash
//!
//! A stampede-safe two-tier cache manager over a Redis-compatible store.
//!
//! ## Overview
//!
//! Redstash wraps a remote key-value store behind one facade, adding:
//!
//! - **Get-or-compute**: [`CacheManager::get_or_set`] fills misses under a
//!   distributed lock, so one factory run serves every concurrent caller
//! - **Two-tier caching**: an optional in-process tier with a shorter TTL
//!   than the authoritative remote copy
//! - **Distributed locking**: [`CacheManager::with_lock`] for named critical
//!   sections across processes
//! - **Collections and counters**: hash, sorted set, and atomic
//!   increment/decrement operations
//! - **Messaging**: broadcast pub/sub and competing-consumer list broadcast
//! - **Scripting**: server-side atomic Lua execution
//!
//! ## Architecture
//!
//! The manager is written against the [`RemoteStore`] trait from
//! `redstash-store`; [`RedisStore`] backs production and [`MemoryStore`]
//! backs tests. Configuration comes from `redstash-config`, built explicitly
//! or from the environment.
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use redstash::{CacheManager, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), redstash::CacheError> {
//!     let manager = CacheManager::connect(&RedisConfig::from_env()).await?;
//!
//!     let profile: Profile = manager
//!         .get_or_set(
//!             "accounts:profiles:find_by_id:42",
//!             || async { load_profile(42).await },
//!             Duration::from_secs(300),
//!             Duration::from_secs(30),
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod key;
pub mod local;
mod lock;
pub mod manager;
pub mod pubsub;

// Re-export commonly used types at crate root
pub use error::CacheError;
pub use manager::CacheManager;
pub use pubsub::Subscription;
pub use redstash_config::{LocalTierConfig, RedisConfig, RedisEndpoint};
pub use redstash_store::{MemoryStore, RedisStore, RemoteStore, ScriptReply, StoreError};
