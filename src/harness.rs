//! External collaborators consumed by the terminal actions.
//!
//! The control loops and registries only ever see the three capability
//! traits; the process-backed implementations here are the production
//! wiring. Tests substitute scripted implementations.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Build/test collaborator consumed only by the Worker's `finish_task`.
#[allow(async_fn_in_trait)]
pub trait BuildRunner {
    async fn attempt_build(&mut self, entry_point: &str) -> (bool, String);
}

/// Packaging collaborator consumed only by the Supervisor's `finish_work`.
#[allow(async_fn_in_trait)]
pub trait Packager {
    async fn package(&mut self, entry_point: &str) -> (bool, String);
}

/// Delegation capability behind the Supervisor's `run_subagent`: runs a full
/// nested Worker loop to completion and reports its boolean outcome plus a
/// summary. The Supervisor holds no other reference into the Worker.
#[allow(async_fn_in_trait)]
pub trait SubagentRunner {
    async fn run_instruction(&mut self, instruction: &str) -> (bool, String);
}

// ---------------------------------------------------------------------------
// Process-backed implementations
// ---------------------------------------------------------------------------

/// Launches the generated entry point headless and watches it for a grace
/// period. Still running at the deadline (a GUI main loop) counts as a pass,
/// as does a clean early exit; crashing early fails with the captured
/// stderr.
pub struct HeadlessBuildRunner {
    python_bin: String,
    root: PathBuf,
    grace_secs: u64,
}

impl HeadlessBuildRunner {
    pub fn new(python_bin: impl Into<String>, root: impl Into<PathBuf>, grace_secs: u64) -> Self {
        Self {
            python_bin: python_bin.into(),
            root: root.into(),
            grace_secs,
        }
    }
}

impl BuildRunner for HeadlessBuildRunner {
    async fn attempt_build(&mut self, entry_point: &str) -> (bool, String) {
        let entry = self.root.join(entry_point);
        if !entry.exists() {
            return (false, format!("Entry point `{entry_point}` not found"));
        }

        let spawned = Command::new(&self.python_bin)
            .arg(&entry)
            .current_dir(&self.root)
            .env("QT_QPA_PLATFORM", "offscreen")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(c) => c,
            Err(e) => return (false, format!("Failed to launch `{entry_point}`: {e}")),
        };

        match tokio::time::timeout(
            Duration::from_secs(self.grace_secs),
            child.wait_with_output(),
        )
        .await
        {
            // Survived the grace period -- treat as a running application.
            Err(_) => (
                true,
                format!(
                    "Application started and stayed up for {}s",
                    self.grace_secs
                ),
            ),
            Ok(Err(e)) => (false, format!("Failed to monitor `{entry_point}`: {e}")),
            Ok(Ok(output)) if output.status.success() => {
                (true, "Application exited cleanly".to_string())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = if !stderr.trim().is_empty() {
                    stderr.into_owned()
                } else if !stdout.trim().is_empty() {
                    stdout.into_owned()
                } else {
                    format!("Process exited with {} and no output", output.status)
                };
                // A missing import has an obvious remedy; name it so the
                // model reaches for pip instead of rewriting code.
                match missing_module(&detail) {
                    Some(module) => (
                        false,
                        format!("Missing Python module `{module}`. Install it, then retry.\n{detail}"),
                    ),
                    None => (false, detail),
                }
            }
        }
    }
}

/// Extract the module name from a `ModuleNotFoundError` traceback line,
/// e.g. `ModuleNotFoundError: No module named 'PySide6'`.
fn missing_module(stderr: &str) -> Option<&str> {
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ModuleNotFoundError"))?;
    line.split('\'').nth(1)
}

/// Shells out to a configured packaging command. `{entry}` in the template
/// is replaced with the entry-point file name.
pub struct CommandPackager {
    template: Vec<String>,
    root: PathBuf,
    timeout_secs: u64,
}

impl CommandPackager {
    pub fn new(template: Vec<String>, root: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            template,
            root: root.into(),
            timeout_secs,
        }
    }
}

impl Packager for CommandPackager {
    async fn package(&mut self, entry_point: &str) -> (bool, String) {
        let args: Vec<String> = self
            .template
            .iter()
            .map(|a| a.replace("{entry}", entry_point))
            .collect();
        if args.is_empty() {
            return (false, "Packaging command is empty".to_string());
        }

        let spawned = Command::new(&args[0])
            .args(&args[1..])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(c) => c,
            Err(e) => return (false, format!("Failed to launch packager `{}`: {e}", args[0])),
        };

        match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Err(_) => (
                false,
                format!("Packaging timed out after {}s", self.timeout_secs),
            ),
            Ok(Err(e)) => (false, format!("Packaging failed: {e}")),
            Ok(Ok(output)) if output.status.success() => {
                (true, "Packaging succeeded".to_string())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                (false, format!("Packaging failed:\n{}", stderr.trim()))
            }
        }
    }
}
