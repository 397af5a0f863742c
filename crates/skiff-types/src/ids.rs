//! Work and task identifier minting.
//!
//! A *work* groups the tasks of one submission; a *task* is a single unit
//! of remote computation. Both identifiers are plain strings so they can
//! travel through queue payloads and store keys unchanged:
//!
//! - work id: `<unix-millis>-<6 hex>`, or caller-supplied
//! - task id: `wf:<work-id>:task:<unix-millis>-<8 hex>`
//!
//! The work id embedded in a task id is recoverable with
//! [`extract_work_id`]. Collisions are negligible at expected batch sizes.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

const TASK_PREFIX: &str = "wf:";
const TASK_INFIX: &str = ":task:";

/// Return `provided` when non-empty, otherwise mint a fresh work id.
///
/// # Examples
/// ```
/// use skiff_types::ids::new_work_id;
///
/// assert_eq!(new_work_id(Some("alpha")), "alpha");
/// assert!(new_work_id(None).contains('-'));
/// ```
pub fn new_work_id(provided: Option<&str>) -> String {
    match provided {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{}-{}", unix_millis(), random_hex(6)),
    }
}

/// Mint a task id belonging to `work_id`.
pub fn new_task_id(work_id: &str) -> String {
    format!(
        "{TASK_PREFIX}{work_id}{TASK_INFIX}{}-{}",
        unix_millis(),
        random_hex(8)
    )
}

/// Recover the work id embedded in a task id.
///
/// Returns `None` when `task_id` does not have the `wf:<work>:task:` shape.
pub fn extract_work_id(task_id: &str) -> Option<&str> {
    let rest = task_id.strip_prefix(TASK_PREFIX)?;
    let end = rest.find(':')?;
    let (work_id, tail) = rest.split_at(end);
    if work_id.is_empty() || !tail.starts_with(TASK_INFIX) {
        return None;
    }
    Some(work_id)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fixed-width hex fragment from RandomState + SystemTime.
fn random_hex(width: usize) -> String {
    let mut hasher = RandomState::new().build_hasher();

    // Mix in current time for uniqueness
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    hasher.write_u128(now.as_nanos());

    // Mix in a second RandomState for additional entropy
    let mut hasher2 = RandomState::new().build_hasher();
    hasher2.write_u64(0x5eed);
    hasher.write_u64(hasher2.finish());

    let hex = format!("{:016x}", hasher.finish());
    hex[..width.min(hex.len())].to_string()
}
