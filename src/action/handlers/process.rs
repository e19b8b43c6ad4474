//! Process execution for `run_command` / `terminal_command`.
//!
//! The command, cwd, and timeout arriving here are policy-normalized.
//! The timeout is enforced, not advisory: the child is spawned with
//! `kill_on_drop`, so abandoning it at the deadline kills the process group
//! leader before the failed envelope is returned.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;

use super::{obj, truncate_output, HandlerOutput};
use crate::action::{ActionResult, Params};

/// Spawn a process and wait for it, bounded by the normalized `timeout_sec`.
///
/// Exit code 0 produces a success envelope; a non-zero exit keeps the
/// captured output in `data` but flags the result failed so the loop relays
/// the error to the model.
pub async fn run_command(params: &Params, max_output_chars: usize) -> Result<HandlerOutput, String> {
    let cwd = super::str_param(params, "cwd")?;
    let timeout_sec = super::u64_param(params, "timeout_sec")?;
    let shell = super::bool_param(params, "shell", false);
    let cmd = params
        .get("cmd")
        .ok_or_else(|| "missing normalized parameter `cmd`".to_string())?;

    // Policy normalizes shell commands to a single line and exec commands
    // to a word vector. The shell line goes to `sh -c` verbatim so that
    // pipes, `&&`, and redirection keep their meaning.
    let (mut command, program) = if shell {
        let line = cmd
            .as_str()
            .ok_or_else(|| "shell command must be a string".to_string())?;
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        (c, "sh".to_string())
    } else {
        let args: Vec<&str> = cmd
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .ok_or_else(|| "exec command must be an array of strings".to_string())?;
        let first = args
            .first()
            .copied()
            .ok_or_else(|| "empty command".to_string())?;
        let mut c = Command::new(first);
        c.args(&args[1..]);
        (c, first.to_string())
    };
    command
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(env) = params.get("env").and_then(Value::as_object) {
        for (key, value) in env {
            if let Some(v) = value.as_str() {
                command.env(key, v);
            }
        }
    }

    let child = command
        .spawn()
        .map_err(|e| format!("run_command: failed to spawn `{program}`: {e}"))?;

    let output = match tokio::time::timeout(
        Duration::from_secs(timeout_sec),
        child.wait_with_output(),
    )
    .await
    {
        // Dropping the timed-out future drops the child, which kills it.
        Err(_) => {
            return Ok(ActionResult::fail(format!(
                "Command timed out after {timeout_sec}s"
            ))
            .into());
        }
        Ok(Err(e)) => return Err(format!("run_command: {e}")),
        Ok(Ok(output)) => output,
    };

    let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), max_output_chars);
    let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), max_output_chars);
    let return_code = output.status.code();
    let data = obj(json!({
        "return_code": return_code,
        "stdout": stdout,
        "stderr": stderr,
    }));

    if output.status.success() {
        Ok(ActionResult::ok(data).into())
    } else {
        Ok(ActionResult::fail_with_data("Non-zero exit code", data).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn unwrap_result(output: HandlerOutput) -> ActionResult {
        match output {
            HandlerOutput::Result(r) => r,
            HandlerOutput::Value(v) => panic!("expected full result, got value {v}"),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let tmp = TempDir::new().unwrap();
        let out = run_command(
            &params(json!({
                "cmd": ["echo", "hello"],
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["return_code"], 0);
        assert_eq!(data["stdout"].as_str().unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn shell_line_keeps_metacharacter_semantics() {
        let tmp = TempDir::new().unwrap();
        let out = run_command(
            &params(json!({
                "cmd": "echo hi && echo bye",
                "shell": true,
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["return_code"], 0);
        assert_eq!(data["stdout"].as_str().unwrap().trim(), "hi\nbye");
    }

    #[tokio::test]
    async fn shell_pipeline_and_redirection_work() {
        let tmp = TempDir::new().unwrap();
        let out = run_command(
            &params(json!({
                "cmd": "printf 'b\\na\\n' | sort > sorted.txt",
                "shell": true,
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap();

        assert!(unwrap_result(out).success);
        let written = std::fs::read_to_string(tmp.path().join("sorted.txt")).unwrap();
        assert_eq!(written, "a\nb\n");
    }

    #[tokio::test]
    async fn nonzero_exit_fails_but_keeps_output() {
        let tmp = TempDir::new().unwrap();
        let out = run_command(
            &params(json!({
                "cmd": ["ls", "/no/such/dir/forsure"],
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Non-zero exit code"));
        assert!(result.data.is_some());
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let tmp = TempDir::new().unwrap();
        let started = std::time::Instant::now();
        let out = run_command(
            &params(json!({
                "cmd": ["sleep", "30"],
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 1u64,
            })),
            1000,
        )
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_binary_reports_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let err = run_command(
            &params(json!({
                "cmd": ["definitely-not-a-binary-xyz"],
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap_err();
        assert!(err.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn runs_in_requested_cwd() {
        let tmp = TempDir::new().unwrap();
        let out = run_command(
            &params(json!({
                "cmd": ["pwd"],
                "cwd": tmp.path().to_str().unwrap(),
                "timeout_sec": 5u64,
            })),
            1000,
        )
        .await
        .unwrap();

        let result = unwrap_result(out);
        let stdout = result.data.unwrap()["stdout"].as_str().unwrap().to_string();
        let reported = std::fs::canonicalize(stdout.trim()).unwrap();
        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(reported, expected);
    }
}
