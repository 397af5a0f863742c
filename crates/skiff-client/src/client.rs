//! The client — owns the connectors and fronts the engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Client                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │  │ KvStore      │  │ TaskQueue    │  │ Completion     │   │
//! │  │ (descriptors,│  │ (publishes)  │  │ Connector      │   │
//! │  │  sets)       │  │              │  │ (poll loop)    │   │
//! │  └──────────────┘  └──────────────┘  └────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//!        submission engine ──┘      └── wait/watch engine
//! ```
//!
//! All three connectors terminate on [`Client::close`]. The client is
//! `Send + Sync`; methods take `&self` and may run concurrently.

use std::sync::Arc;
use std::time::Duration;

use object_store::ObjectStore;
use tracing::debug;

use skiff_types::{new_work_id, work_set_key, Manifest};

use crate::completion::{CompletionConnector, DEFAULT_POLL_INTERVAL};
use crate::connector::{AmqpQueue, KvStore, RedisStore, TaskQueue};
use crate::error::ClientResult;
use crate::lister::store_from_env;

/// Configuration for [`Client::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Key-value store URL.
    pub store_url: String,
    /// Queue broker URI.
    pub queue_uri: String,
    /// Default work id for manifests that do not carry one. Minted when
    /// `None`.
    pub work_id: Option<String>,
    /// Completion connector poll interval.
    pub poll_interval: Duration,
    /// Queue connection heartbeat.
    pub heartbeat: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: "redis://127.0.0.1:6379".to_string(),
            queue_uri: "amqp://127.0.0.1:5672/%2f".to_string(),
            work_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Config pinned to an existing work id.
    pub fn for_work(work_id: &str) -> Self {
        Self {
            work_id: Some(work_id.to_string()),
            ..Self::default()
        }
    }
}

/// Handle for submitting tasks and waiting on their completion.
pub struct Client {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) queue: Arc<dyn TaskQueue>,
    pub(crate) completion: Arc<CompletionConnector>,
    work_id: String,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl Client {
    /// Connect to the store and queue named by `config`.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let store = Arc::new(RedisStore::connect(&config.store_url).await?);
        let queue = Arc::new(AmqpQueue::with_heartbeat(
            config.queue_uri.clone(),
            config.heartbeat.as_secs(),
        ));
        Ok(Self::with_connectors(store, queue, config))
    }

    /// Assemble a client from existing connectors.
    ///
    /// Primarily for embedding and tests; see
    /// [`connector::testing`](crate::connector::testing).
    pub fn with_connectors(
        store: Arc<dyn KvStore>,
        queue: Arc<dyn TaskQueue>,
        config: ClientConfig,
    ) -> Self {
        let work_id = new_work_id(config.work_id.as_deref());
        let completion = Arc::new(CompletionConnector::new(
            store.clone(),
            &work_id,
            config.poll_interval,
        ));
        Self {
            store,
            queue,
            completion,
            work_id,
            object_store: None,
        }
    }

    /// Use `store` for object listings instead of building one from the
    /// environment per bucket.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// This client's default work id.
    pub fn work_id(&self) -> &str {
        &self.work_id
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn completion(&self) -> &Arc<CompletionConnector> {
        &self.completion
    }

    /// Work id a submission runs under: the manifest's, or this client's.
    pub(crate) fn resolve_work_id(&self, manifest: &Manifest) -> String {
        match manifest.metadata.work_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.work_id.clone(),
        }
    }

    /// Object store for `bucket`: the injected one, or one built from the
    /// environment.
    pub(crate) fn object_store(&self, bucket: &str) -> ClientResult<Arc<dyn ObjectStore>> {
        match &self.object_store {
            Some(store) => Ok(store.clone()),
            None => store_from_env(bucket),
        }
    }

    /// Task ids recorded for `work_id`.
    pub async fn work_task_ids(&self, work_id: &str) -> ClientResult<Vec<String>> {
        self.store.smembers(&work_set_key(work_id)).await
    }

    /// Number of tasks recorded for `work_id`.
    pub async fn work_size(&self, work_id: &str) -> ClientResult<u64> {
        self.store.scard(&work_set_key(work_id)).await
    }

    /// Simulate a worker completion: write the exit code, then flag the
    /// task in its work's completion set.
    pub async fn notify_task_completion(&self, task_id: &str, code: i32) -> ClientResult<()> {
        self.completion.notify_task_completion(task_id, code).await
    }

    /// Stop the completion connector and close the queue connection.
    ///
    /// Outstanding waiters are not resolved; their receivers observe the
    /// closed channel.
    pub async fn close(&self) -> ClientResult<()> {
        self.completion.stop();
        self.completion.join().await;
        self.queue.close().await?;
        debug!("client closed");
        Ok(())
    }
}
