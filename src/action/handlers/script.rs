//! Interactive code execution for `run_ipython`.
//!
//! State is modeled as an explicitly owned [`ScriptContext`]: the registry
//! that owns it is created with the Worker loop and torn down with it, so no
//! bindings leak across runs. Persistence across calls uses deterministic
//! replay -- every successful snippet is kept, and each call feeds the full
//! history plus the new snippet to a fresh interpreter on stdin. A snippet
//! that fails is not added to the history, so one bad cell cannot poison the
//! session.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{bool_param, obj, str_param, truncate_output, HandlerOutput, SandboxCtx};
use crate::action::{ActionResult, Params};

/// Owned interpreter session for one Worker loop instance.
#[derive(Debug)]
pub struct ScriptContext {
    interpreter: String,
    root: PathBuf,
    timeout_sec: u64,
    max_output_chars: usize,
    history: Vec<String>,
}

impl ScriptContext {
    pub fn new(ctx: &SandboxCtx) -> Self {
        Self {
            interpreter: ctx.python_bin.clone(),
            root: ctx.root.clone(),
            timeout_sec: ctx.command_timeout_sec,
            max_output_chars: ctx.max_output_chars,
            history: Vec::new(),
        }
    }

    /// Number of snippets retained in the session history.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Execute a snippet with the accumulated session state.
    pub async fn run(&mut self, params: &Params) -> Result<HandlerOutput, String> {
        let code = str_param(params, "code")?;
        if bool_param(params, "reset", false) {
            self.history.clear();
        }

        let mut source = String::new();
        for snippet in &self.history {
            source.push_str(snippet);
            source.push_str("\n\n");
        }
        source.push_str(code);
        source.push('\n');

        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("run_ipython: failed to spawn `{}`: {e}", self.interpreter))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| format!("run_ipython: {e}"))?;
            // Dropping stdin closes the pipe so the interpreter runs.
        }

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_sec),
            child.wait_with_output(),
        )
        .await
        {
            Err(_) => {
                return Ok(ActionResult::fail(format!(
                    "Code execution timed out after {}s",
                    self.timeout_sec
                ))
                .into());
            }
            Ok(Err(e)) => return Err(format!("run_ipython: {e}")),
            Ok(Ok(output)) => output,
        };

        let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), self.max_output_chars);
        let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), self.max_output_chars);
        let data = obj(json!({ "stdout": stdout, "stderr": stderr }));

        if output.status.success() {
            self.history.push(code.to_string());
            Ok(ActionResult::ok(data).into())
        } else {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("execution failed")
                .to_string();
            Ok(ActionResult::fail_with_data(reason, data).into())
        }
    }
}
