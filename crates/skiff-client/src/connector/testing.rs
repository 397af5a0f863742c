//! In-memory connectors for tests and local simulation.
//!
//! [`MemoryStore`] and [`MemoryQueue`] implement the connector traits over
//! plain maps, with enough inspection hooks to assert the engine's write
//! order and rollback behavior. They are public because downstream users
//! simulate worker completions the same way the test suite does.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{KvStore, TaskQueue};
use crate::error::{ClientError, ClientResult};

/// In-memory key-value store.
///
/// Sets are ordered, so `srandmember` deterministically returns the first
/// member — the engine only ever needs *a* member, and determinism keeps
/// tests stable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Head element of the list at `key` (test assertions).
    pub fn list_head(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.lists.get(key).and_then(|list| list.front().cloned())
    }

    /// Whether a list exists at `key`.
    pub fn has_list(&self, key: &str) -> bool {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.lists.contains_key(key)
    }

    /// Whether `member` is in the set at `key`.
    pub fn set_contains(&self, key: &str, member: &str) -> bool {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn lpush(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let emptied = match inner.sets.get_mut(key) {
            Some(set) => {
                set.remove(member);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.sets.remove(key);
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> ClientResult<u64> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.sets.get(key).map(|set| set.len() as u64).unwrap_or(0))
    }

    async fn smembers(&self, key: &str) -> ClientResult<Vec<String>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn srandmember(&self, key: &str) -> ClientResult<Option<String>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .sets
            .get(key)
            .and_then(|set| set.iter().next().cloned()))
    }

    async fn srandmember_many(&self, keys: &[String]) -> ClientResult<Vec<Option<String>>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(keys
            .iter()
            .map(|key| {
                inner
                    .sets
                    .get(key)
                    .and_then(|set| set.iter().next().cloned())
            })
            .collect())
    }

    async fn del(&self, key: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.lists.remove(key);
        inner.sets.remove(key);
        Ok(())
    }
}

/// In-memory queue recording publishes.
///
/// Queues must be [`declare`](MemoryQueue::declare)d before they pass the
/// passive check, mirroring the external-operator contract. Failures can
/// be injected with [`fail_on_publish`](MemoryQueue::fail_on_publish) to
/// exercise the engine's rollback paths.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<MemoryQueueInner>,
    publish_seq: AtomicUsize,
}

#[derive(Default)]
struct MemoryQueueInner {
    declared: HashSet<String>,
    published: HashMap<String, Vec<Vec<u8>>>,
    fail_on: HashSet<usize>,
    closed: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`, as the external operator would.
    pub fn declare(&self, name: &str) {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        inner.declared.insert(name.to_string());
    }

    /// Fail the `n`-th publish (1-based, counting both publish flavors).
    pub fn fail_on_publish(&self, n: usize) {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        inner.fail_on.insert(n);
    }

    /// Payloads published to `name`, decoded as UTF-8, in order.
    pub fn published(&self, name: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner
            .published
            .get(name)
            .map(|payloads| {
                payloads
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of successful publishes to `name`.
    pub fn publish_count(&self, name: &str) -> usize {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner
            .published
            .get(name)
            .map(|payloads| payloads.len())
            .unwrap_or(0)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner.closed
    }

    fn record(&self, name: &str, payload: &[u8]) -> ClientResult<()> {
        let seq = self.publish_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        if inner.fail_on.contains(&seq) {
            return Err(ClientError::Publish(format!(
                "injected failure on publish {seq}"
            )));
        }
        inner
            .published
            .entry(name.to_string())
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn check_queue(&self, name: &str) -> ClientResult<bool> {
        let inner = self.inner.lock().expect("memory queue poisoned");
        Ok(inner.declared.contains(name))
    }

    async fn publish(&self, name: &str, payload: &[u8]) -> ClientResult<()> {
        self.record(name, payload)
    }

    async fn publish_burst(&self, name: &str, payload: &[u8]) -> ClientResult<()> {
        self.record(name, payload)
    }

    async fn close(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        inner.closed = true;
        Ok(())
    }
}
