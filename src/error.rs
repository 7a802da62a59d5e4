//! Error type for cache manager operations.

use redstash_store::StoreError;

/// Error type for cache operations.
///
/// Callers always receive a typed value, a success flag, or a count; the only
/// unstructured detail crossing this boundary is the connectivity case, which
/// is fatal per call and carried in [`CacheError::Store`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The remote store failed: unreachable, protocol error, or a server-side
    /// script rejection with the store's diagnostic.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A value could not be serialized on the write path. Read-path failures
    /// never surface here; they degrade to a cache miss.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One hash field failed to deserialize during `hash_get_all`.
    #[error("field {field:?} of {key:?} failed to deserialize: {source}")]
    FieldDeserialization {
        key: String,
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// The key does not follow the `module:class:method:args` naming
    /// convention required at the write boundary.
    #[error("cache key {key:?} does not match the module:class:method:args convention")]
    InvalidKey { key: String },

    /// A blocking lock acquisition did not succeed within its bounded wait.
    #[error("timed out waiting for lock on {resource:?}")]
    LockTimeout { resource: String },

    /// The same task tried to acquire a lock it already holds. Nested
    /// acquisition is unsupported; failing fast here is what prevents the
    /// caller from deadlocking against itself until the lock expires.
    #[error("lock on {resource:?} is already held by this task")]
    NestedLock { resource: String },

    /// Caching is disabled in configuration; the manager was not constructed.
    #[error("caching is disabled in configuration")]
    Disabled,
}
