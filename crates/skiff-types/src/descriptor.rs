//! Task descriptors — the JSON payload a worker reads to execute.
//!
//! The descriptor is persisted at `<task-id>_msg` *before* the task id is
//! published, so a worker that dequeues an id is guaranteed to find it.
//! Workers consume descriptors; the client never reads them back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::manifest::{BatchOptions, IoOutput, Manifest};
use crate::plan::{PlanInput, PlanItem};

/// Everything a worker needs to run one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Workflow-level inputs plus the pack's staged files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "taskType")]
    pub task_type: String,
    pub io: DescriptorIo,
}

/// The task's concrete object-store I/O.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorIo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PlanInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IoOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchOptions>,
}

impl TaskDescriptor {
    /// Assemble a descriptor from the manifest, one plan item, and a minted
    /// task id. Pure; the arguments are untouched.
    ///
    /// The plan item's argument vector wins when it is non-empty (it
    /// carries template substitutions); otherwise the manifest's is used.
    pub fn build(manifest: &Manifest, item: &PlanItem, task_id: &str) -> TaskDescriptor {
        let spec = &manifest.spec;

        let args = if item.args.is_empty() {
            spec.args.clone()
        } else {
            item.args.clone()
        };

        let mut inputs = spec.inputs.clone();
        inputs.extend(item.local_inputs.iter().map(|local| {
            json!({ "name": local.name, "workflow_input": local.workflow_input })
        }));

        TaskDescriptor {
            executable: spec.executable.clone(),
            name: spec.name.clone(),
            args,
            work_dir: spec.work_dir.clone(),
            input_dir: spec.input_dir.clone(),
            output_dir: spec.output_dir.clone(),
            inputs,
            outputs: spec.outputs.clone(),
            task_id: task_id.to_string(),
            task_type: spec.task_type.clone(),
            io: DescriptorIo {
                inputs: item.inputs.clone(),
                output: spec.io.as_ref().and_then(|io| io.output.clone()),
                batch: spec.io.as_ref().and_then(|io| io.batch.clone()),
            },
        }
    }
}
