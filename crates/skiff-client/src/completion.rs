//! Completion connector — the bridge between worker writes and in-process
//! waiters.
//!
//! Workers signal completion through the store: they write the decimal
//! exit code into the `<task-id>` set, *then* add the task id to the
//! work's completion set. The store has no way to long-poll a set by
//! member, so one long-lived loop per client drains the completion set
//! instead of one blocking read per waiter:
//!
//! 1. pick a random member of the completion set; none → sleep, retry
//! 2. bail out if a stop was requested
//! 3. read the task's exit code
//! 4. a registered waiter gets the code through its single-shot channel;
//!    without one the signal is cleared (late or unobserved completion)
//! 5. errors are logged and the loop continues — losing the loop would
//!    silently hang every waiter
//!
//! The loop task is spawned explicitly and its handle is owned here, so
//! [`Client::close`](crate::Client::close) can stop it cleanly: the stop
//! token also cancels an in-progress sleep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use skiff_types::{completion_set_key, extract_work_id};

use crate::connector::KvStore;
use crate::error::{ClientError, ClientResult};

/// Default interval between polls of an empty completion set.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

type ResolverTable = Arc<Mutex<HashMap<String, oneshot::Sender<String>>>>;

/// Singleton-per-client poller dispatching worker completions to waiters.
pub struct CompletionConnector {
    store: Arc<dyn KvStore>,
    completion_key: String,
    poll_interval: Duration,
    resolvers: ResolverTable,
    running: AtomicBool,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CompletionConnector {
    /// Connector polling the completion set of `work_id`.
    pub fn new(store: Arc<dyn KvStore>, work_id: &str, poll_interval: Duration) -> Self {
        Self {
            store,
            completion_key: completion_set_key(work_id),
            poll_interval,
            resolvers: Arc::new(Mutex::new(HashMap::new())),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Start the poll loop. Idempotent; later calls are no-ops.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = tokio::spawn(poll_loop(
            self.store.clone(),
            self.resolvers.clone(),
            self.cancel.clone(),
            self.completion_key.clone(),
            self.poll_interval,
        ));
        *self.handle.lock().expect("completion handle poisoned") = Some(handle);
    }

    /// Whether the loop has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Install a single-shot waiter for `task_id`.
    ///
    /// At most one waiter may exist per task at a time; a second
    /// registration fails with [`ClientError::WaiterExists`].
    pub fn wait_for_task(&self, task_id: &str) -> ClientResult<oneshot::Receiver<String>> {
        let mut resolvers = self.resolvers.lock().expect("resolver table poisoned");
        if resolvers.contains_key(task_id) {
            return Err(ClientError::WaiterExists(task_id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        resolvers.insert(task_id.to_string(), tx);
        Ok(rx)
    }

    /// Drop the waiter for `task_id`; returns whether one was removed.
    pub fn cancel_wait(&self, task_id: &str) -> bool {
        self.resolvers
            .lock()
            .expect("resolver table poisoned")
            .remove(task_id)
            .is_some()
    }

    /// Number of registered waiters.
    pub fn waiter_count(&self) -> usize {
        self.resolvers
            .lock()
            .expect("resolver table poisoned")
            .len()
    }

    /// Non-destructive read of the exit code for `task_id`, parsed when a
    /// finite integer has been written.
    pub async fn peek_exit_code(&self, task_id: &str) -> ClientResult<Option<i32>> {
        let member = self.store.srandmember(task_id).await?;
        Ok(member.and_then(|code| code.parse().ok()))
    }

    /// Record a completed task the way a worker would: write the exit code
    /// into the task's set, then flag the task in the completion set.
    ///
    /// Used by tests and local simulation; real workers perform these
    /// writes themselves.
    pub async fn notify_task_completion(&self, task_id: &str, code: i32) -> ClientResult<()> {
        self.store.sadd(task_id, &code.to_string()).await?;
        let key = match extract_work_id(task_id) {
            Some(work_id) => completion_set_key(work_id),
            None => self.completion_key.clone(),
        };
        self.store.sadd(&key, task_id).await?;
        Ok(())
    }

    /// Request the poll loop to stop; cancels any in-progress sleep.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Await loop termination after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .expect("completion handle poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn poll_loop(
    store: Arc<dyn KvStore>,
    resolvers: ResolverTable,
    cancel: CancellationToken,
    completion_key: String,
    poll_interval: Duration,
) {
    debug!(key = %completion_key, "completion poll loop started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match poll_once(&store, &resolvers, &cancel, &completion_key).await {
            // Handled a member; keep draining without sleeping.
            Ok(true) => {}
            Ok(false) => {
                if sleep_or_cancelled(&cancel, poll_interval).await {
                    break;
                }
            }
            Err(err) => {
                warn!("completion poll failed: {err}");
                if sleep_or_cancelled(&cancel, poll_interval).await {
                    break;
                }
            }
        }
    }
    debug!("completion poll loop stopped");
}

/// One pass over the completion set. `Ok(true)` when a member was handled.
async fn poll_once(
    store: &Arc<dyn KvStore>,
    resolvers: &ResolverTable,
    cancel: &CancellationToken,
    completion_key: &str,
) -> ClientResult<bool> {
    let Some(task_id) = store.srandmember(completion_key).await? else {
        return Ok(false);
    };
    if cancel.is_cancelled() {
        return Ok(false);
    }

    let Some(code) = store.srandmember(&task_id).await? else {
        // Worker-contract violation: flagged complete without an exit code.
        warn!(task = %task_id, "completion flagged without exit code; clearing");
        store.srem(completion_key, &task_id).await?;
        return Ok(true);
    };

    let sender = {
        resolvers
            .lock()
            .expect("resolver table poisoned")
            .remove(&task_id)
    };
    store.srem(completion_key, &task_id).await?;
    match sender {
        Some(tx) => {
            // The waiter may have timed out and dropped its receiver.
            let _ = tx.send(code);
        }
        None => {
            debug!(task = %task_id, "unobserved completion cleared");
        }
    }
    Ok(true)
}

/// Sleep one poll interval; true when the stop token fired first.
async fn sleep_or_cancelled(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}
