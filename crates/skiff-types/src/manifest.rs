//! The submission manifest — a declarative description of what to run.
//!
//! The manifest is input-only: the client reads it, the schema validator
//! (an external collaborator) defaults it, and nothing here mutates it.
//! Field names follow the wire format exactly, which mixes camelCase
//! (`workId`, `taskType`, `maxPerTask`) and snake_case (`work_dir`,
//! `workflow_input`) for historical reasons.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level submission manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: Spec,
}

/// Manifest metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Work this submission belongs to; minted when absent.
    #[serde(rename = "workId", default, skip_serializing_if = "Option::is_none")]
    pub work_id: Option<String>,
}

/// What to run and where its data lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Spec {
    /// Queue the tasks are published to.
    #[serde(rename = "taskType")]
    pub task_type: String,
    /// Program the worker executes.
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument vector; entries may be any JSON value. String entries
    /// equal to `{in}` or `{inN}` are substituted per pack (see
    /// [`crate::template`]).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Workflow-level input declarations, passed through to descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Value>,
    /// Workflow-level output declarations, passed through to descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<Io>,
}

impl Spec {
    /// Whether batch expansion is requested.
    pub fn batch_enabled(&self) -> bool {
        self.io
            .as_ref()
            .and_then(|io| io.batch.as_ref())
            .map(|batch| batch.enabled)
            .unwrap_or(false)
    }

    /// The declared object-store inputs (empty when `io` is absent).
    pub fn io_inputs(&self) -> &[IoInput] {
        self.io
            .as_ref()
            .map(|io| io.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Batch options with defaults applied for absent fields.
    pub fn batch_options(&self) -> BatchOptions {
        self.io
            .as_ref()
            .and_then(|io| io.batch.clone())
            .unwrap_or_default()
    }
}

/// Object-store I/O declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Io {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<IoInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchOptions>,
}

/// One object-store input declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoInput {
    /// Store kind; only `"s3"` is currently understood.
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    /// `s3://bucket/prefix/` (trailing slash) or `s3://bucket/key`.
    pub url: String,
    /// Walk below the prefix; defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    /// Keys must match at least one of these globs (when non-empty).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Keys must match none of these globs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Hard cap on listed objects.
    #[serde(rename = "maxFiles", default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

impl Default for IoInput {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            url: String::new(),
            recursive: None,
            include: Vec::new(),
            exclude: Vec::new(),
            max_files: None,
        }
    }
}

/// Where workers write their results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoOutput {
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

fn default_store_type() -> String {
    "s3".to_string()
}

/// How a batch is expanded into tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub grouping: Grouping,
    /// Levels below the base prefix at which to group (prefix mode).
    #[serde(rename = "prefixDepth", default, skip_serializing_if = "Option::is_none")]
    pub prefix_depth: Option<u32>,
    /// Objects packed into one task (object mode, minimum 1).
    #[serde(rename = "maxPerTask", default, skip_serializing_if = "Option::is_none")]
    pub max_per_task: Option<usize>,
}

/// Batch grouping strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One task per pack of objects.
    #[default]
    Object,
    /// One task per child prefix at `prefixDepth`.
    Prefix,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_reads_wire_field_names() {
        let manifest: Manifest = serde_json::from_value(json!({
            "metadata": { "workId": "w1" },
            "spec": {
                "taskType": "align",
                "executable": "bwa",
                "args": ["mem", "{in}", 4],
                "work_dir": "/scratch",
                "io": {
                    "inputs": [{
                        "type": "s3",
                        "url": "s3://genomes/reads/",
                        "include": ["**/*.fastq"],
                        "maxFiles": 100
                    }],
                    "output": { "type": "s3", "url": "s3://genomes/out/", "overwrite": true },
                    "batch": { "enabled": true, "grouping": "prefix", "prefixDepth": 2, "maxPerTask": 5 }
                }
            }
        }))
        .expect("manifest parses");

        assert_eq!(manifest.metadata.work_id.as_deref(), Some("w1"));
        assert_eq!(manifest.spec.task_type, "align");
        assert_eq!(manifest.spec.work_dir.as_deref(), Some("/scratch"));
        assert!(manifest.spec.batch_enabled());

        let batch = manifest.spec.batch_options();
        assert_eq!(batch.grouping, Grouping::Prefix);
        assert_eq!(batch.prefix_depth, Some(2));
        assert_eq!(batch.max_per_task, Some(5));

        let input = &manifest.spec.io_inputs()[0];
        assert_eq!(input.max_files, Some(100));
        assert_eq!(input.include, vec!["**/*.fastq"]);
    }

    #[test]
    fn absent_io_means_no_batch() {
        let manifest: Manifest = serde_json::from_value(json!({
            "spec": { "taskType": "q", "executable": "true" }
        }))
        .expect("minimal manifest parses");

        assert!(!manifest.spec.batch_enabled());
        assert!(manifest.spec.io_inputs().is_empty());
        assert!(manifest.metadata.work_id.is_none());
    }

    #[test]
    fn non_string_args_survive_round_trip() {
        let manifest: Manifest = serde_json::from_value(json!({
            "spec": { "taskType": "q", "executable": "p", "args": ["-n", 8, true] }
        }))
        .expect("manifest parses");

        assert_eq!(manifest.spec.args[1], json!(8));
        assert_eq!(manifest.spec.args[2], json!(true));
    }
}
