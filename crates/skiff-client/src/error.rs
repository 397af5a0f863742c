//! Error types for the skiff client.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by submission, listing, and waiting.
///
/// Timeouts and idle deadlines are *states* in wait results, never errors;
/// see [`crate::wait::WaitState`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed URL, missing batch inputs, conflicting options.
    /// Raised synchronously, before any side effects.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The passive queue check failed: nobody declared the queue
    /// (`ENOQUEUE`). Raised before any store writes.
    #[error("queue '{0}' has not been declared (ENOQUEUE)")]
    QueueMissing(String),

    /// A key-value store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// A queue publish failed. The submission engine rolls the task's
    /// descriptor and membership back best-effort.
    #[error("publish error: {0}")]
    Publish(String),

    /// An object-store listing failed.
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// The queue connection dropped; the channel cache is invalidated and
    /// the next operation reconnects.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A waiter is already registered for this task.
    #[error("waiter already registered for task {0}")]
    WaiterExists(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Other errors.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<redis::RedisError> for ClientError {
    fn from(err: redis::RedisError) -> Self {
        ClientError::Store(err.to_string())
    }
}
