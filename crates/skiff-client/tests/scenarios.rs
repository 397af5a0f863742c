//! End-to-end scenarios against in-memory connectors.
//!
//! These tests drive the public client API the way an application would:
//! submit, simulate worker completions, and wait — with `MemoryStore` /
//! `MemoryQueue` standing in for the external systems and an in-memory
//! object store backing the planner.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};
use serde_json::json;

use skiff_client::connector::testing::{MemoryQueue, MemoryStore};
use skiff_client::{
    Client, ClientConfig, ClientError, KvStore, SubmitOptions, WaitOptions, WaitState, WatchEvent,
    WatchOptions,
};
use skiff_types::{descriptor_key, extract_work_id, new_task_id, work_set_key, Manifest, PlanSource};

/// Client wired to fresh in-memory connectors, polling fast.
fn test_client(work_id: &str) -> (Client, Arc<MemoryStore>, Arc<MemoryQueue>) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let config = ClientConfig {
        work_id: Some(work_id.to_string()),
        poll_interval: Duration::from_millis(10),
        ..ClientConfig::default()
    };
    let client = Client::with_connectors(store.clone(), queue.clone(), config);
    (client, store, queue)
}

async fn seed_bucket(keys: &[&str]) -> Arc<InMemory> {
    let bucket = Arc::new(InMemory::new());
    for key in keys {
        bucket
            .put(&StorePath::from(*key), PutPayload::from_static(b"x"))
            .await
            .expect("seed object");
    }
    bucket
}

fn manifest(value: serde_json::Value) -> Manifest {
    serde_json::from_value(value).expect("manifest parses")
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn single_submission_persists_descriptor_membership_and_publish() {
    let (client, store, queue) = test_client("w1");
    queue.declare("q1");

    let manifest = manifest(json!({
        "metadata": { "workId": "w1" },
        "spec": {
            "taskType": "q1",
            "executable": "/usr/bin/render",
            "args": ["-in", "{in}"],
            "io": { "batch": { "enabled": false } }
        }
    }));

    let submission = client.create_single(&manifest).await.expect("create_single");
    assert!(submission.task_id.starts_with("wf:w1:task:"));
    assert_eq!(extract_work_id(&submission.task_id), Some("w1"));

    let head = store
        .list_head(&descriptor_key(&submission.task_id))
        .expect("descriptor persisted");
    let descriptor: serde_json::Value = serde_json::from_str(&head).expect("descriptor is json");
    assert_eq!(descriptor["taskId"], json!(submission.task_id));
    assert_eq!(descriptor["taskType"], json!("q1"));
    assert_eq!(descriptor["executable"], json!("/usr/bin/render"));

    assert!(store.set_contains(&work_set_key("w1"), &submission.task_id));
    assert_eq!(queue.published("q1"), vec![submission.task_id.clone()]);
}

#[tokio::test]
async fn single_submission_against_undeclared_queue_writes_nothing() {
    let (client, _store, _queue) = test_client("w1");

    let manifest = manifest(json!({
        "spec": { "taskType": "ghost", "executable": "true" }
    }));

    let err = client.create_single(&manifest).await.err().expect("fails");
    assert!(matches!(err, ClientError::QueueMissing(name) if name == "ghost"));
    assert_eq!(
        client.work_size("w1").await.expect("work size"),
        0,
        "no membership recorded before the queue check"
    );
}

#[tokio::test]
async fn object_grouped_batch_packs_and_publishes() {
    let (client, store, queue) = test_client("w2");
    queue.declare("thumbs");
    let bucket = seed_bucket(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]).await;
    let client = client.with_object_store(bucket);

    let manifest = manifest(json!({
        "spec": {
            "taskType": "thumbs",
            "executable": "convert",
            "args": ["{in0}"],
            "io": {
                "inputs": [{ "type": "s3", "url": "s3://photos/", "include": ["**/*.jpg"] }],
                "batch": { "enabled": true, "grouping": "object", "maxPerTask": 2 }
            }
        }
    }));

    let batch = client
        .create_batch(&manifest, SubmitOptions::default())
        .await
        .expect("create_batch");

    assert_eq!(batch.work_id, "w2");
    assert_eq!(batch.tasks.len(), 3);
    assert!(batch.is_complete());

    let key_counts: Vec<usize> = batch
        .tasks
        .iter()
        .map(|record| match &record.source {
            PlanSource::Keys { keys } => keys.len(),
            other => panic!("expected keys source, got {other:?}"),
        })
        .collect();
    assert_eq!(key_counts, vec![2, 2, 1]);

    assert_eq!(queue.publish_count("thumbs"), 3);
    for record in &batch.tasks {
        assert!(store.has_list(&descriptor_key(&record.task_id)));
        assert!(store.set_contains(&work_set_key("w2"), &record.task_id));
    }
}

#[tokio::test]
async fn prefix_grouped_batch_follows_listing_order() {
    let (client, _store, queue) = test_client("w3");
    queue.declare("per-sample");
    let bucket = seed_bucket(&["p1/r1.fq", "p2/r2.fq", "p3/r3.fq"]).await;
    let client = client.with_object_store(bucket);

    let manifest = manifest(json!({
        "spec": {
            "taskType": "per-sample",
            "executable": "align",
            "io": {
                "inputs": [{ "url": "s3://samples/" }],
                "batch": { "enabled": true, "grouping": "prefix", "prefixDepth": 1 }
            }
        }
    }));

    let batch = client
        .create_batch(&manifest, SubmitOptions::default())
        .await
        .expect("create_batch");

    let prefixes: Vec<String> = batch
        .tasks
        .iter()
        .map(|record| match &record.source {
            PlanSource::Prefix { prefix } => prefix.clone(),
            other => panic!("expected prefix source, got {other:?}"),
        })
        .collect();
    assert_eq!(prefixes, vec!["p1/", "p2/", "p3/"]);
    assert_eq!(queue.publish_count("per-sample"), 3);
}

#[tokio::test]
async fn publish_failure_rolls_back_and_is_recorded() {
    let (client, store, queue) = test_client("w4");
    queue.declare("q");
    queue.fail_on_publish(2);
    let bucket = seed_bucket(&["one", "two", "three"]).await;
    let client = client.with_object_store(bucket);

    let manifest = manifest(json!({
        "spec": {
            "taskType": "q",
            "executable": "p",
            "io": {
                "inputs": [{ "url": "s3://b/" }],
                "batch": { "enabled": true, "maxPerTask": 1 }
            }
        }
    }));

    let batch = client
        .create_batch(&manifest, SubmitOptions::default())
        .await
        .expect("create_batch");

    assert_eq!(batch.tasks.len(), 3);
    assert!(batch.tasks[0].error.is_none());
    assert!(batch.tasks[1].error.is_some());
    assert!(batch.tasks[2].error.is_none());
    assert_eq!(batch.failed().count(), 1);

    // The failed task's writes were rolled back; its neighbors are intact.
    let failed = &batch.tasks[1].task_id;
    assert!(!store.has_list(&descriptor_key(failed)));
    assert!(!store.set_contains(&work_set_key("w4"), failed));
    for record in [&batch.tasks[0], &batch.tasks[2]] {
        assert!(store.has_list(&descriptor_key(&record.task_id)));
        assert!(store.set_contains(&work_set_key("w4"), &record.task_id));
    }
    assert_eq!(queue.publish_count("q"), 2);
}

#[tokio::test]
async fn stop_on_error_raises_after_rollback_without_attempting_more() {
    let (client, _store, queue) = test_client("w5");
    queue.declare("q");
    queue.fail_on_publish(2);
    let bucket = seed_bucket(&["one", "two", "three"]).await;
    let client = client.with_object_store(bucket);

    let manifest = manifest(json!({
        "spec": {
            "taskType": "q",
            "executable": "p",
            "io": {
                "inputs": [{ "url": "s3://b/" }],
                "batch": { "enabled": true, "maxPerTask": 1 }
            }
        }
    }));

    let err = client
        .create_batch(
            &manifest,
            SubmitOptions {
                stop_on_error: true,
                ..SubmitOptions::default()
            },
        )
        .await
        .err()
        .expect("stop_on_error re-raises");
    assert!(matches!(err, ClientError::Publish(_)));

    // Task 3 was never attempted; only task 1 survives in the store.
    assert_eq!(queue.publish_count("q"), 1);
    assert_eq!(client.work_size("w5").await.expect("work size"), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_batch_stays_within_the_window() {
    let (client, _store, queue) = test_client("w-rate");
    queue.declare("q");
    let bucket = seed_bucket(&["1", "2", "3", "4", "5"]).await;
    let client = client.with_object_store(bucket);

    let manifest = manifest(json!({
        "spec": {
            "taskType": "q",
            "executable": "p",
            "io": {
                "inputs": [{ "url": "s3://b/" }],
                "batch": { "enabled": true, "maxPerTask": 1 }
            }
        }
    }));

    let started = tokio::time::Instant::now();
    let batch = client
        .create_batch(
            &manifest,
            SubmitOptions {
                rate_per_sec: Some(2),
                ..SubmitOptions::default()
            },
        )
        .await
        .expect("create_batch");

    assert_eq!(batch.tasks.len(), 5);
    // Five publishes at 2/s cross at least two window boundaries.
    assert!(started.elapsed() >= Duration::from_secs(2));
}

// ============================================================================
// Waiting
// ============================================================================

#[tokio::test]
async fn wait_fast_path_skips_the_connector() {
    let (client, store, _queue) = test_client("w6");
    let task_id = new_task_id("w6");
    store.sadd(&task_id, "0").await.expect("pre-write code");

    let wait = client
        .wait_for_task(&task_id, WaitOptions::default())
        .await
        .expect("wait");

    assert_eq!(wait.state, WaitState::Done);
    assert_eq!(wait.code, Some(0));
    assert!(
        !client.completion().is_running(),
        "fast path must not start the poll loop"
    );
}

#[tokio::test(start_paused = true)]
async fn wait_resolves_through_the_connector() {
    let (client, _store, _queue) = test_client("w7");
    let client = Arc::new(client);
    let task_id = new_task_id("w7");

    let notifier = {
        let client = client.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.notify_task_completion(&task_id, 7).await.expect("notify");
        })
    };

    let wait = client
        .wait_for_task(&task_id, WaitOptions::default())
        .await
        .expect("wait");
    notifier.await.expect("notifier");

    assert_eq!(wait.state, WaitState::Done);
    assert_eq!(wait.code, Some(7));
    assert_eq!(client.completion().waiter_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_timeout_peeks_once_more_before_giving_up() {
    let (client, store, _queue) = test_client("w8");
    let client = Arc::new(client);
    let task_id = new_task_id("w8");

    // The code lands mid-wait, but the completion set is never flagged, so
    // only the post-timeout peek can see it.
    let writer = {
        let store = store.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.sadd(&task_id, "0").await.expect("write code");
        })
    };

    let wait = client
        .wait_for_task(
            &task_id,
            WaitOptions {
                timeout: Some(Duration::from_millis(100)),
                ..WaitOptions::default()
            },
        )
        .await
        .expect("wait");
    writer.await.expect("writer");

    assert_eq!(wait.state, WaitState::Done, "fast-peek safety net");
    assert_eq!(wait.code, Some(0));
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_when_nothing_completes() {
    let (client, _store, _queue) = test_client("w9");
    let task_id = new_task_id("w9");

    let wait = client
        .wait_for_task(
            &task_id,
            WaitOptions {
                timeout: Some(Duration::from_millis(80)),
                ..WaitOptions::default()
            },
        )
        .await
        .expect("wait");

    assert_eq!(wait.state, WaitState::Timeout);
    assert_eq!(wait.code, None);
    assert_eq!(client.completion().waiter_count(), 0, "waiter cleaned up");
}

#[tokio::test(start_paused = true)]
async fn wait_for_many_fail_fast_cancels_remaining_waiters() {
    let (client, _store, _queue) = test_client("w10");
    let client = Arc::new(client);
    let ids: Vec<String> = (0..3).map(|_| new_task_id("w10")).collect();

    let failer = {
        let client = client.clone();
        let failing = ids[1].clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            client.notify_task_completion(&failing, 2).await.expect("notify");
        })
    };

    let wait = client
        .wait_for_many(&ids, WaitOptions {
            fail_fast: true,
            ..WaitOptions::default()
        })
        .await
        .expect("wait_for_many");
    failer.await.expect("failer");

    assert_eq!(wait.state, WaitState::Failed);
    assert_eq!(wait.done.len(), 1);
    assert_eq!(wait.done[0].code, 2);
    assert_eq!(wait.pending.len(), 2);
    assert_eq!(
        client.completion().waiter_count(),
        0,
        "fail-fast must leave no resolvers behind"
    );
}

#[tokio::test(start_paused = true)]
async fn wait_for_many_returns_done_when_all_codes_are_prewritten() {
    let (client, store, _queue) = test_client("w11");
    let ids: Vec<String> = (0..3).map(|_| new_task_id("w11")).collect();
    for id in &ids {
        store.sadd(id, "0").await.expect("pre-write");
    }

    let wait = client
        .wait_for_many(&ids, WaitOptions::default())
        .await
        .expect("wait_for_many");

    assert_eq!(wait.state, WaitState::Done);
    assert_eq!(wait.done.len(), 3);
    assert!(wait.pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn watch_work_goes_idle_when_a_task_stalls() {
    let (client, store, _queue) = test_client("w12");
    let client = Arc::new(client);

    let ids: Vec<String> = (0..3).map(|_| new_task_id("w12")).collect();
    for id in &ids {
        store.sadd(&work_set_key("w12"), id).await.expect("membership");
    }

    // Two tasks complete quickly; the third never does.
    let completer = {
        let client = client.clone();
        let fast = ids[0].clone();
        let slow = ids[1].clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            client.notify_task_completion(&fast, 0).await.expect("notify");
            tokio::time::sleep(Duration::from_millis(40)).await;
            client.notify_task_completion(&slow, 0).await.expect("notify");
        })
    };

    let events: Arc<Mutex<Vec<WatchEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let watch = client
        .watch_work(
            "w12",
            WatchOptions {
                idle: Some(Duration::from_millis(300)),
                poll: Duration::from_millis(10),
                on_event: Some(Box::new(move |event| {
                    sink.lock().expect("event sink").push(event);
                })),
                ..WatchOptions::default()
            },
        )
        .await
        .expect("watch_work");
    completer.await.expect("completer");

    assert_eq!(watch.state, WaitState::Idle);
    assert_eq!(watch.total, 3);
    assert_eq!(watch.results.len(), 2);
    assert!(watch.results.iter().all(|result| result.code == 0));
    assert_eq!(client.completion().waiter_count(), 0);

    let events = events.lock().expect("event sink");
    let done_events = events
        .iter()
        .filter(|event| matches!(event, WatchEvent::TaskDone { .. }))
        .count();
    assert_eq!(done_events, 2);
}

#[tokio::test(start_paused = true)]
async fn watch_work_completes_when_every_task_finishes() {
    let (client, store, _queue) = test_client("w13");
    let client = Arc::new(client);

    let ids: Vec<String> = (0..2).map(|_| new_task_id("w13")).collect();
    for id in &ids {
        store.sadd(&work_set_key("w13"), id).await.expect("membership");
    }
    // One pre-completed, one completing mid-watch.
    store.sadd(&ids[0], "0").await.expect("pre-write");
    let completer = {
        let client = client.clone();
        let late = ids[1].clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            client.notify_task_completion(&late, 0).await.expect("notify");
        })
    };

    let watch = client
        .watch_work(
            "w13",
            WatchOptions {
                poll: Duration::from_millis(10),
                ..WatchOptions::default()
            },
        )
        .await
        .expect("watch_work");
    completer.await.expect("completer");

    assert_eq!(watch.state, WaitState::Done);
    assert_eq!(watch.total, 2);
    assert_eq!(watch.results.len(), 2);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn close_stops_the_connector_and_the_queue() {
    let (client, _store, queue) = test_client("w14");
    // Start the loop the way a wait would.
    client.completion().start();
    assert!(client.completion().is_running());

    client.close().await.expect("close");
    assert!(!client.completion().is_running());
    assert!(queue.is_closed());
}

#[tokio::test]
async fn submissions_fall_back_to_the_client_work_id() {
    let (client, _store, queue) = test_client("fallback-work");
    queue.declare("q");

    let manifest = manifest(json!({
        "spec": { "taskType": "q", "executable": "true" }
    }));

    let submission = client.create_single(&manifest).await.expect("create_single");
    assert_eq!(extract_work_id(&submission.task_id), Some("fallback-work"));
    assert_eq!(client.work_size("fallback-work").await.expect("size"), 1);
}
