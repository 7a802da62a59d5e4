//! # Redstash Config
//!
//! Configuration types for the redstash cache manager.
//!
//! This crate provides configuration structures loaded from environment
//! variables or constructed explicitly at startup:
//!
//! - [`redis`]: remote store connection settings and the enable flag
//! - [`local_tier`]: settings for the optional in-process cache tier
//!
//! Configuration is an explicitly constructed object passed to the manager at
//! construction time; nothing in this crate holds global state.
//!
//! # Example
//!
//! ```ignore
//! use redstash_config::RedisConfig;
//!
//! // Load from environment
//! let config = RedisConfig::from_env();
//!
//! // Or construct explicitly
//! let config = RedisConfig {
//!     key_prefix: "orders".into(),
//!     ..RedisConfig::default()
//! };
//! ```

pub mod local_tier;
pub mod redis;

// Re-export commonly used types at crate root
pub use local_tier::LocalTierConfig;
pub use redis::{RedisConfig, RedisEndpoint};
