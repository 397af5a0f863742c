//! Argument templating: `{in}` and `{inN}` substitution.
//!
//! The planner stages each pack's objects into the task sandbox by
//! basename, then rewrites the manifest's argument vector against those
//! basenames:
//!
//! - `{in}` — the single basename, iff the pack holds exactly one object
//! - `{inN}` — the N-th basename (0-based), iff `N` is in range
//!
//! Anything else — non-string arguments, out-of-range indexes, partial
//! matches like `{input}` — passes through unchanged. Substitution is
//! whole-argument only; placeholders embedded in longer strings are left
//! literal.

use serde_json::Value;

/// Substitute `{in}` / `{inN}` placeholders in `args` against `basenames`.
///
/// Pure function: returns a new vector, `args` is untouched.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use skiff_types::template::render_args;
///
/// let args = vec![json!("-i"), json!("{in0}"), json!(4)];
/// let rendered = render_args(&args, &["a.fastq".to_string()]);
/// assert_eq!(rendered, vec![json!("-i"), json!("a.fastq"), json!(4)]);
/// ```
pub fn render_args(args: &[Value], basenames: &[String]) -> Vec<Value> {
    args.iter()
        .map(|arg| match arg.as_str().and_then(|s| substitute(s, basenames)) {
            Some(replacement) => Value::String(replacement),
            None => arg.clone(),
        })
        .collect()
}

fn substitute(arg: &str, basenames: &[String]) -> Option<String> {
    if arg == "{in}" {
        if basenames.len() == 1 {
            return Some(basenames[0].clone());
        }
        return None;
    }
    let index: usize = arg.strip_prefix("{in")?.strip_suffix('}')?.parse().ok()?;
    basenames.get(index).cloned()
}
