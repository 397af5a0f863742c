//! Connector seams for the external systems the client talks to.
//!
//! Two traits cover the engine's outward I/O:
//!
//! - [`KvStore`]: the key-value store holding descriptors, work sets, and
//!   completion signals
//! - [`TaskQueue`]: the message queue task ids are published to
//!
//! ```text
//! Submission / wait engines
//!     ↓                    ↓
//! Arc<dyn KvStore>    Arc<dyn TaskQueue>
//!     ↓                    ↓
//! ┌──────────────────┬──────────────────┐
//! │ RedisStore       │ AmqpQueue        │   production
//! │ MemoryStore      │ MemoryQueue      │   tests / simulation
//! └──────────────────┴──────────────────┘
//! ```
//!
//! Production implementations are thin: retries, reconnection, and
//! pipelining come from the underlying client libraries. The in-memory
//! pair in [`testing`] backs the test suite and local simulation runs.

mod amqp;
mod kv;
pub mod testing;

pub use amqp::AmqpQueue;
pub use kv::RedisStore;

use async_trait::async_trait;

use crate::error::{ClientError, ClientResult};

/// Typed view of the key-value store operations the engine needs.
///
/// Keys follow the schema in [`skiff_types::keys`]. Errors propagate.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Push `value` onto the head of the list at `key`.
    async fn lpush(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Add `member` to the set at `key`.
    async fn sadd(&self, key: &str, member: &str) -> ClientResult<()>;

    /// Remove `member` from the set at `key`.
    async fn srem(&self, key: &str, member: &str) -> ClientResult<()>;

    /// Cardinality of the set at `key` (0 when absent).
    async fn scard(&self, key: &str) -> ClientResult<u64>;

    /// All members of the set at `key`.
    async fn smembers(&self, key: &str) -> ClientResult<Vec<String>>;

    /// A random member of the set at `key`, `None` when empty or absent.
    async fn srandmember(&self, key: &str) -> ClientResult<Option<String>>;

    /// One pipelined round-trip of `srandmember` over `keys`, in order.
    async fn srandmember_many(&self, keys: &[String]) -> ClientResult<Vec<Option<String>>>;

    /// Delete the value at `key`.
    async fn del(&self, key: &str) -> ClientResult<()>;
}

/// The queue operations the submission engine needs.
///
/// Queues are declared by an external operator; the connector only checks
/// for them passively and publishes.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Passively check whether `name` has been declared.
    async fn check_queue(&self, name: &str) -> ClientResult<bool>;

    /// Like [`check_queue`](Self::check_queue), but absence is an error.
    async fn check_queue_or_bail(&self, name: &str) -> ClientResult<()> {
        if self.check_queue(name).await? {
            Ok(())
        } else {
            Err(ClientError::QueueMissing(name.to_string()))
        }
    }

    /// Fire-and-forget publish.
    async fn publish(&self, name: &str, payload: &[u8]) -> ClientResult<()>;

    /// Publish and wait out the channel's outbound buffer (burst+drain).
    /// This is the backpressure point batch submission relies on.
    async fn publish_burst(&self, name: &str, payload: &[u8]) -> ClientResult<()>;

    /// Close all channels, then the connection. Idempotent.
    async fn close(&self) -> ClientResult<()>;
}
