//! skiff-client: the client side of a serverless compute-batch pipeline.
//!
//! Applications describe work in a manifest; skiff expands it against an
//! object store, persists one descriptor per task, and publishes task ids
//! to a queue that a pool of remote workers consumes. Workers write exit
//! codes back into the key-value store; this crate's completion connector
//! picks them up and resolves in-process waiters.
//!
//! ```text
//! manifest ──▶ planner ──▶ plan items ──▶ submission engine
//!                │                            │        │
//!          object store                  kv store     queue ──▶ workers
//!                                             ▲                   │
//!                                             └── exit codes ◀────┘
//!                                             │
//!                                   completion connector
//!                                             │
//!                                     wait / watch API
//! ```
//!
//! # Example
//!
//! ```ignore
//! use skiff_client::{Client, ClientConfig, SubmitOptions, WatchOptions};
//!
//! let client = Client::connect(ClientConfig::default()).await?;
//! let batch = client.create_batch(&manifest, SubmitOptions::default()).await?;
//! let watch = client.watch_work(&batch.work_id, WatchOptions::default()).await?;
//! client.close().await?;
//! ```
//!
//! Queues are declared by an external operator, manifests are validated by
//! an external schema layer, and the queue is at-least-once — workers are
//! expected to be idempotent on redelivered task ids.

pub mod client;
pub mod completion;
pub mod connector;
pub mod error;
pub mod lister;
pub mod planner;
pub mod s3url;
pub mod submit;
pub mod wait;

pub use client::{Client, ClientConfig};
pub use completion::CompletionConnector;
pub use connector::{AmqpQueue, KvStore, RedisStore, TaskQueue};
pub use error::{ClientError, ClientResult};
pub use lister::{store_from_env, ListRequest, Lister, ObjMeta};
pub use planner::PlanStream;
pub use s3url::{parse_s3_url, S3Location};
pub use submit::{BatchResult, SubmitOptions, Submission, TaskRecord};
pub use wait::{
    ManyWait, TaskCompletion, TaskWait, WaitOptions, WaitState, WatchCallback, WatchEvent,
    WatchOptions, WorkWatch,
};

// Wire types (manifest, descriptors, ids) live in the leaf crate.
pub use skiff_types as types;
