//! Wait and watch — single task, many tasks, whole work.
//!
//! Every wait starts with a *fast peek*: a non-destructive read of the
//! task's exit-code set. A code that is already there short-circuits the
//! whole machinery, and a second peek after a timeout fires closes the
//! race where the code landed while the timer was going off.
//!
//! Timeouts and idle deadlines are outcomes, not errors — store failures
//! are the only thing these calls return `Err` for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use skiff_types::work_set_key;

use crate::client::Client;
use crate::completion::CompletionConnector;
use crate::connector::KvStore;
use crate::error::ClientResult;

/// Terminal state of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Everything asked for completed.
    Done,
    /// Fail-fast tripped on a non-zero exit code.
    Failed,
    /// The overall deadline elapsed.
    Timeout,
    /// No task completed within the idle window.
    Idle,
}

/// A completed task and its exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task_id: String,
    pub code: i32,
}

/// Outcome of [`Client::wait_for_task`].
#[derive(Debug, Clone)]
pub struct TaskWait {
    pub state: WaitState,
    pub task_id: String,
    /// Present iff `state` is [`WaitState::Done`].
    pub code: Option<i32>,
}

/// Outcome of [`Client::wait_for_many`].
#[derive(Debug, Clone)]
pub struct ManyWait {
    pub state: WaitState,
    pub done: Vec<TaskCompletion>,
    pub pending: Vec<String>,
}

/// Outcome of [`Client::watch_work`].
#[derive(Debug)]
pub struct WorkWatch {
    pub state: WaitState,
    pub total: usize,
    pub results: Vec<TaskCompletion>,
}

/// Options for [`Client::wait_for_task`] and [`Client::wait_for_many`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    /// Overall deadline; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Return [`WaitState::Failed`] on the first non-zero exit code and
    /// cancel the remaining waiters (many-task waits only).
    pub fail_fast: bool,
}

/// Progress events emitted by [`Client::watch_work`].
#[derive(Debug, Clone)]
pub enum WatchEvent {
    TaskDone { task_id: String, code: i32 },
    Progress { done: usize, total: usize },
}

/// Callback receiving [`WatchEvent`]s.
pub type WatchCallback = Box<dyn Fn(WatchEvent) + Send + Sync>;

/// Options for [`Client::watch_work`].
pub struct WatchOptions {
    /// Overall deadline; `None` watches indefinitely.
    pub timeout: Option<Duration>,
    /// Give up after this long without a new completion; `None` disables.
    pub idle: Option<Duration>,
    /// Interval between sweeps over the outstanding waiters.
    pub poll: Duration,
    /// Expected task count; defaults to the work set's cardinality.
    pub expected: Option<usize>,
    /// Progress callback.
    pub on_event: Option<WatchCallback>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            idle: None,
            poll: Duration::from_millis(1000),
            expected: None,
            on_event: None,
        }
    }
}

impl Client {
    /// Wait for one task's exit code.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        options: WaitOptions,
    ) -> ClientResult<TaskWait> {
        wait_one(
            self.completion.clone(),
            task_id.to_string(),
            options.timeout,
        )
        .await
    }

    /// Wait for a batch of tasks.
    ///
    /// Starts with one pipelined peek over all ids, then waits on the rest
    /// concurrently. With `fail_fast`, the first non-zero exit code cancels
    /// every remaining waiter and returns [`WaitState::Failed`].
    pub async fn wait_for_many(
        &self,
        task_ids: &[String],
        options: WaitOptions,
    ) -> ClientResult<ManyWait> {
        let started = Instant::now();

        let peeked = self.store.srandmember_many(task_ids).await?;
        let mut done = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for (task_id, member) in task_ids.iter().zip(peeked) {
            match member.and_then(|code| code.parse::<i32>().ok()) {
                Some(code) => done.push(TaskCompletion {
                    task_id: task_id.clone(),
                    code,
                }),
                None => pending.push(task_id.clone()),
            }
        }
        if pending.is_empty() {
            return Ok(ManyWait {
                state: WaitState::Done,
                done,
                pending,
            });
        }

        self.completion.start();
        let mut waiters: FuturesUnordered<_> = pending
            .iter()
            .map(|task_id| wait_one(self.completion.clone(), task_id.clone(), None))
            .collect();
        let mut outstanding = pending;

        loop {
            let next = if let Some(total) = options.timeout {
                let left = total.saturating_sub(started.elapsed());
                if left.is_zero() {
                    break;
                }
                match timeout(left, waiters.next()).await {
                    Ok(item) => item,
                    Err(_elapsed) => break,
                }
            } else {
                waiters.next().await
            };

            let Some(result) = next else {
                // Every waiter resolved.
                break;
            };
            let finished = match result {
                Ok(finished) => finished,
                Err(err) => {
                    cancel_all(&self.completion, &outstanding);
                    return Err(err);
                }
            };

            let Some(code) = finished.code else {
                // The waiter resolved without a code (connector shut down);
                // leave the id pending.
                continue;
            };
            outstanding.retain(|id| *id != finished.task_id);
            done.push(TaskCompletion {
                task_id: finished.task_id,
                code,
            });

            if options.fail_fast && code != 0 {
                debug!(code, "fail-fast tripped; cancelling remaining waiters");
                cancel_all(&self.completion, &outstanding);
                return Ok(ManyWait {
                    state: WaitState::Failed,
                    done,
                    pending: outstanding,
                });
            }
        }

        let state = if outstanding.is_empty() {
            WaitState::Done
        } else {
            cancel_all(&self.completion, &outstanding);
            WaitState::Timeout
        };
        Ok(ManyWait {
            state,
            done,
            pending: outstanding,
        })
    }

    /// Watch a whole work until it completes, stalls, or times out.
    ///
    /// The snapshot of the work set taken on entry is authoritative: tasks
    /// submitted concurrently are not picked up mid-watch.
    pub async fn watch_work(&self, work_id: &str, options: WatchOptions) -> ClientResult<WorkWatch> {
        let started = Instant::now();
        let work_key = work_set_key(work_id);

        let expected = match options.expected {
            Some(count) => count,
            None => self.store.scard(&work_key).await? as usize,
        };
        let mut ids = self.store.smembers(&work_key).await?;
        ids.truncate(expected);

        // Fast peek over the snapshot.
        let peeked = self.store.srandmember_many(&ids).await?;
        let mut results = Vec::new();
        let mut waiting = Vec::new();
        for (task_id, member) in ids.iter().zip(peeked) {
            match member.and_then(|code| code.parse::<i32>().ok()) {
                Some(code) => {
                    emit(
                        &options,
                        WatchEvent::TaskDone {
                            task_id: task_id.clone(),
                            code,
                        },
                    );
                    results.push(TaskCompletion {
                        task_id: task_id.clone(),
                        code,
                    });
                }
                None => waiting.push(task_id.clone()),
            }
        }
        emit(
            &options,
            WatchEvent::Progress {
                done: results.len(),
                total: expected,
            },
        );
        if results.len() >= expected {
            return Ok(WorkWatch {
                state: WaitState::Done,
                total: expected,
                results,
            });
        }

        self.completion.start();
        let mut receivers: HashMap<String, oneshot::Receiver<String>> = HashMap::new();
        for task_id in &waiting {
            match self.completion.wait_for_task(task_id) {
                Ok(rx) => {
                    receivers.insert(task_id.clone(), rx);
                }
                Err(err) => {
                    for registered in receivers.keys() {
                        self.completion.cancel_wait(registered);
                    }
                    return Err(err);
                }
            }
        }

        let mut last_new = Instant::now();
        let state = loop {
            // Non-blocking sweep over the outstanding waiters.
            let mut completed: Vec<(String, String)> = Vec::new();
            receivers.retain(|task_id, rx| match rx.try_recv() {
                Ok(code) => {
                    completed.push((task_id.clone(), code));
                    false
                }
                Err(oneshot::error::TryRecvError::Empty) => true,
                Err(oneshot::error::TryRecvError::Closed) => {
                    // Connector shut down; this id can no longer resolve.
                    false
                }
            });

            let had_new = !completed.is_empty();
            for (task_id, code) in completed {
                let Ok(code) = code.parse::<i32>() else {
                    warn!(task = %task_id, "ignoring unparseable exit code");
                    continue;
                };
                emit(
                    &options,
                    WatchEvent::TaskDone {
                        task_id: task_id.clone(),
                        code,
                    },
                );
                results.push(TaskCompletion { task_id, code });
            }
            if had_new {
                last_new = Instant::now();
                emit(
                    &options,
                    WatchEvent::Progress {
                        done: results.len(),
                        total: expected,
                    },
                );
            }

            if results.len() >= expected {
                break WaitState::Done;
            }
            if let Some(total) = options.timeout {
                if started.elapsed() >= total {
                    break WaitState::Timeout;
                }
            }
            if let Some(idle) = options.idle {
                if last_new.elapsed() >= idle {
                    break WaitState::Idle;
                }
            }
            sleep(options.poll).await;
        };

        // Drop whatever is still registered so the table stays clean.
        for task_id in receivers.keys() {
            self.completion.cancel_wait(task_id);
        }
        Ok(WorkWatch {
            state,
            total: expected,
            results,
        })
    }
}

/// Wait for one task: fast peek, then a single-shot waiter, then — on
/// timeout — one last peek to close the written-as-the-timer-fired race.
async fn wait_one(
    completion: Arc<CompletionConnector>,
    task_id: String,
    deadline: Option<Duration>,
) -> ClientResult<TaskWait> {
    if let Some(code) = completion.peek_exit_code(&task_id).await? {
        return Ok(TaskWait {
            state: WaitState::Done,
            task_id,
            code: Some(code),
        });
    }

    completion.start();
    let rx = completion.wait_for_task(&task_id)?;

    let outcome = match deadline {
        Some(limit) if !limit.is_zero() => timeout(limit, rx).await,
        _ => Ok(rx.await),
    };

    match outcome {
        Ok(Ok(code)) => Ok(TaskWait {
            state: WaitState::Done,
            code: code.parse().ok(),
            task_id,
        }),
        Ok(Err(_closed)) => {
            // Connector stopped underneath us.
            completion.cancel_wait(&task_id);
            Ok(TaskWait {
                state: WaitState::Timeout,
                task_id,
                code: None,
            })
        }
        Err(_elapsed) => {
            completion.cancel_wait(&task_id);
            if let Some(code) = completion.peek_exit_code(&task_id).await? {
                return Ok(TaskWait {
                    state: WaitState::Done,
                    task_id,
                    code: Some(code),
                });
            }
            Ok(TaskWait {
                state: WaitState::Timeout,
                task_id,
                code: None,
            })
        }
    }
}

fn cancel_all(completion: &Arc<CompletionConnector>, task_ids: &[String]) {
    for task_id in task_ids {
        completion.cancel_wait(task_id);
    }
}

fn emit(options: &WatchOptions, event: WatchEvent) {
    if let Some(callback) = &options.on_event {
        callback(event);
    }
}
