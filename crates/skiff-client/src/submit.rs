//! Submission engine — single tasks and planned batches.
//!
//! The write order is the engine's one hard guarantee: the descriptor is
//! persisted and the work-set membership recorded *before* the task id is
//! published, so a worker that dequeues an id always finds its descriptor.
//! A failed publish triggers best-effort rollback of both writes, and the
//! failure is recorded in the batch result instead of aborting the batch
//! (unless `stop_on_error` is set).

use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use skiff_types::{descriptor_key, new_task_id, work_set_key, Manifest, PlanSource, TaskDescriptor};

use crate::client::Client;
use crate::connector::{KvStore, TaskQueue};
use crate::error::ClientResult;
use crate::lister::Lister;
use crate::planner::{self, PlanStream};
use crate::s3url::parse_s3_url;

/// Outcome of [`Client::create_single`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: String,
}

/// Per-task record of a batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub source: PlanSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of [`Client::create_batch`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub work_id: String,
    pub tasks: Vec<TaskRecord>,
}

impl BatchResult {
    /// Records whose publish failed (and was rolled back).
    pub fn failed(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|record| record.error.is_some())
    }

    /// Whether every task was published.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|record| record.error.is_none())
    }
}

/// Options for [`Client::create_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Cap publishes per one-second window; `None` or 0 disables the
    /// limiter (pure burst-plus-drain).
    pub rate_per_sec: Option<u32>,
    /// Re-raise the first publish error after rollback instead of
    /// recording it and continuing.
    pub stop_on_error: bool,
}

impl Client {
    /// Submit the one task `manifest` describes.
    ///
    /// Does not invoke the planner: the single-mode plan item is built
    /// directly from the declared inputs.
    pub async fn create_single(&self, manifest: &Manifest) -> ClientResult<Submission> {
        let spec = &manifest.spec;
        let work_id = self.resolve_work_id(manifest);
        let task_id = new_task_id(&work_id);
        let item = planner::single_item(spec)?;
        let descriptor = TaskDescriptor::build(manifest, &item, &task_id);

        self.queue.check_queue_or_bail(&spec.task_type).await?;

        let payload = serde_json::to_string(&descriptor)?;
        self.store.lpush(&descriptor_key(&task_id), &payload).await?;
        self.store.sadd(&work_set_key(&work_id), &task_id).await?;
        self.queue
            .publish(&spec.task_type, task_id.as_bytes())
            .await?;

        debug!(task = %task_id, queue = %spec.task_type, "task submitted");
        Ok(Submission { task_id })
    }

    /// Expand `manifest` through the planner and submit every plan item.
    ///
    /// Plan items are consumed lazily off the listing stream; a large
    /// bucket is never materialized. Publish failures are rolled back and
    /// recorded per task; store and listing errors abort the call.
    pub async fn create_batch(
        &self,
        manifest: &Manifest,
        options: SubmitOptions,
    ) -> ClientResult<BatchResult> {
        let spec = &manifest.spec;
        let work_id = self.resolve_work_id(manifest);
        self.queue.check_queue_or_bail(&spec.task_type).await?;

        if !spec.batch_enabled() {
            let item = planner::single_item(spec)?;
            let items = stream::once(future::ready(Ok(item))).boxed();
            return self.submit_items(manifest, work_id, items, options).await;
        }

        let base = spec.io_inputs().first().ok_or_else(planner::no_inputs_error)?;
        let location = parse_s3_url(&base.url)?;
        let lister = Lister::new(self.object_store(&location.bucket)?, location.bucket.clone());
        let items = planner::plan(spec, &lister);
        self.submit_items(manifest, work_id, items, options).await
    }

    async fn submit_items(
        &self,
        manifest: &Manifest,
        work_id: String,
        mut items: PlanStream<'_>,
        options: SubmitOptions,
    ) -> ClientResult<BatchResult> {
        let queue_name = &manifest.spec.task_type;
        let mut limiter = options
            .rate_per_sec
            .filter(|rate| *rate > 0)
            .map(RateLimiter::new);
        let mut tasks = Vec::new();

        while let Some(item) = items.try_next().await? {
            let task_id = new_task_id(&work_id);
            let descriptor = TaskDescriptor::build(manifest, &item, &task_id);

            if let Some(limiter) = limiter.as_mut() {
                limiter.acquire().await;
            }

            let payload = serde_json::to_string(&descriptor)?;
            self.store.lpush(&descriptor_key(&task_id), &payload).await?;
            self.store.sadd(&work_set_key(&work_id), &task_id).await?;

            match self
                .queue
                .publish_burst(queue_name, task_id.as_bytes())
                .await
            {
                Ok(()) => {
                    tasks.push(TaskRecord {
                        task_id,
                        source: item.source,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(task = %task_id, "publish failed, rolling back: {err}");
                    self.rollback(&work_id, &task_id).await;
                    tasks.push(TaskRecord {
                        task_id,
                        source: item.source,
                        error: Some(err.to_string()),
                    });
                    if options.stop_on_error {
                        return Err(err);
                    }
                }
            }
        }

        debug!(
            work = %work_id,
            tasks = tasks.len(),
            "batch submitted"
        );
        Ok(BatchResult { work_id, tasks })
    }

    /// Best-effort removal of a task's descriptor and membership. Both
    /// deletes are attempted even if the first fails.
    async fn rollback(&self, work_id: &str, task_id: &str) {
        if let Err(err) = self.store.del(&descriptor_key(task_id)).await {
            warn!(task = %task_id, "rollback: descriptor delete failed: {err}");
        }
        if let Err(err) = self.store.srem(&work_set_key(work_id), task_id).await {
            warn!(task = %task_id, "rollback: membership removal failed: {err}");
        }
    }
}

/// Windowed token bucket: at most `rate` permits per one-second window.
///
/// When the window's permits are spent, `acquire` sleeps to the end of the
/// window, then opens a fresh one.
struct RateLimiter {
    rate: u32,
    tokens: u32,
    window_start: Instant,
}

impl RateLimiter {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new(rate: u32) -> Self {
        Self {
            rate,
            tokens: rate,
            window_start: Instant::now(),
        }
    }

    async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= Self::WINDOW {
            self.reset();
        } else if self.tokens == 0 {
            sleep(Self::WINDOW - elapsed).await;
            self.reset();
        }
        self.tokens = self.tokens.saturating_sub(1);
    }

    fn reset(&mut self) {
        self.tokens = self.rate;
        self.window_start = Instant::now();
    }
}
