//! Error type for store backends.

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store is unreachable or the connection failed mid-call. Fatal per
    /// call; retry policy belongs to the caller's collaborators, not here.
    #[error("store connection error: {0}")]
    Connection(#[from] redis::RedisError),

    /// A server-side script failed; the store's diagnostic is carried verbatim.
    #[error("script error: {0}")]
    Script(String),

    /// The key holds a value of the wrong kind for the requested command.
    #[error("wrong value kind for key {key}: {detail}")]
    WrongKind { key: String, detail: String },
}
