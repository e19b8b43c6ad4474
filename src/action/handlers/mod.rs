//! Action handler implementations.
//!
//! Handlers receive policy-normalized parameters only: paths are absolute and
//! contained, command lines are word-split vectors, defaults are filled in.
//! They report problems through their `Err(String)` channel (or a failed
//! [`ActionResult`]) -- never by panicking -- so the executor can fold every
//! outcome into the uniform envelope.

pub mod fs;
pub mod inspect;
pub mod process;
pub mod script;

use std::path::PathBuf;

use serde_json::Value;

use super::{ActionResult, Params};

/// Output of a handler invocation, before the executor stamps the duration.
///
/// `Result` carries a full envelope (only `duration_ms` is overwritten);
/// `Value` is a raw payload the executor wraps as `data = {"result": ...}`.
#[derive(Debug)]
pub enum HandlerOutput {
    Result(ActionResult),
    Value(Value),
}

impl From<ActionResult> for HandlerOutput {
    fn from(result: ActionResult) -> Self {
        HandlerOutput::Result(result)
    }
}

/// Sandbox context partially applied to handlers at registry construction.
#[derive(Debug, Clone)]
pub struct SandboxCtx {
    /// Canonical sandbox root.
    pub root: PathBuf,
    /// Hard timeout and default for spawned processes.
    pub command_timeout_sec: u64,
    /// Captured output is truncated to this many characters.
    pub max_output_chars: usize,
    /// Interpreter used for `run_ipython` and the build harness.
    pub python_bin: String,
    /// Entry-point file name the terminal actions hand to the collaborators.
    pub entry_point: String,
}

// ---------------------------------------------------------------------------
// Typed access to normalized parameters
// ---------------------------------------------------------------------------
//
// The policy guarantees presence and types; a miss here means a registry bug,
// reported through the error channel rather than a panic.

pub(crate) fn str_param<'a>(params: &'a Params, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing normalized parameter `{key}`"))
}

pub(crate) fn u64_param(params: &Params, key: &str) -> Result<u64, String> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("missing normalized parameter `{key}`"))
}

pub(crate) fn opt_u64_param(params: &Params, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

pub(crate) fn bool_param(params: &Params, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Build a `data` map from a JSON object literal.
pub(crate) fn obj(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

/// Truncate captured output to a character budget, noting the cut.
pub(crate) fn truncate_output(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n[output truncated]")
}
