//! Plan items — the batch planner's output.
//!
//! A plan item describes one task's concrete inputs before a task id has
//! been minted for it: the object-store locations to read, the basenames
//! staged into the task sandbox, and the argument vector after template
//! substitution. Plan items are transient; only the descriptor built from
//! them is persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One planned task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanItem {
    /// Object-store locations this task reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PlanInput>,
    /// Files staged into the task sandbox by basename.
    #[serde(rename = "localInputs", default, skip_serializing_if = "Vec::is_empty")]
    pub local_inputs: Vec<LocalInput>,
    /// Argument vector after template substitution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// How the planner produced this item.
    pub source: PlanSource,
}

/// One object-store location: either a prefix to walk or an exact key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInput {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// A file staged into the task sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalInput {
    /// Basename inside the sandbox.
    pub name: String,
    /// Marks the file as a workflow-managed input for the worker.
    pub workflow_input: bool,
}

/// Provenance of a plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanSource {
    /// The manifest described exactly one task (batching disabled).
    Single { single: bool },
    /// One task per child prefix.
    Prefix { prefix: String },
    /// One task per pack of listed objects.
    Keys { keys: Vec<String> },
}

impl PlanSource {
    pub fn single() -> Self {
        PlanSource::Single { single: true }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        PlanSource::Prefix {
            prefix: prefix.into(),
        }
    }

    pub fn keys(keys: Vec<String>) -> Self {
        PlanSource::Keys { keys }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, PlanSource::Single { .. })
    }
}

impl Default for PlanSource {
    fn default() -> Self {
        PlanSource::single()
    }
}

/// Last `/`-separated component of an object key.
pub fn basename(key: &str) -> &str {
    match key.rsplit_once('/') {
        Some((_, name)) => name,
        None => key,
    }
}
