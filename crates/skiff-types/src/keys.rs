//! The store-key schema shared between client and workers.
//!
//! Four key shapes, all derived from ids:
//!
//! - `<task-id>_msg` — list; head element is the JSON task descriptor
//! - `work:<work-id>:tasks` — set of the work's task ids
//! - `<task-id>` — set; holds the decimal exit code after completion
//! - `wf:<work-id>:tasksPendingCompletionHandling` — set; the worker adds
//!   the task id here *after* writing the exit code
//!
//! The exit-code set is keyed by the bare task id, so it needs no builder.

/// Key of the list holding a task's descriptor.
pub fn descriptor_key(task_id: &str) -> String {
    format!("{task_id}_msg")
}

/// Key of the set of task ids belonging to a work.
pub fn work_set_key(work_id: &str) -> String {
    format!("work:{work_id}:tasks")
}

/// Key of the set a worker flags after writing an exit code.
pub fn completion_set_key(work_id: &str) -> String {
    format!("wf:{work_id}:tasksPendingCompletionHandling")
}
