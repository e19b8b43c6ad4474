//! Per-run transcript and metadata logging.
//!
//! Every pipeline run gets its own directory under the runs root:
//! `runs/run_{timestamp}_{id}/logs/`. Each agent writes an append-only
//! markdown chat file there (`worker_chat.md`, `supervisor_chat.md`), and
//! run-level facts accumulate in `metadata.json`. Old run directories are
//! swept by age when a new run starts.
//!
//! Uses synchronous `std::fs` since writes are small and append-only. Chat
//! appends are fire-and-forget: a failed write is a `tracing` warning, never
//! a loop error.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

/// Current UTC time as an ISO 8601 string with milliseconds.
fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

struct Inner {
    run_dir: PathBuf,
    logs_dir: PathBuf,
}

/// Handle to one run's log directory. Cloning is cheap; the Worker and
/// Supervisor share the same run.
#[derive(Clone)]
pub struct RunLogger {
    inner: Arc<Inner>,
}

impl RunLogger {
    /// Create a fresh run directory under `base_dir` and sweep runs older
    /// than `retention_days`.
    pub fn new(base_dir: &Path, retention_days: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(base_dir)?;

        let ts = Utc::now().format("%Y%m%d_%H%M%S");
        let id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = base_dir.join(format!("run_{ts}_{}", &id[..8]));
        let logs_dir = run_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;

        if let Err(err) = cleanup_old_runs(base_dir, &run_dir, retention_days) {
            tracing::warn!(error = %err, "run retention sweep failed");
        }

        Ok(Self {
            inner: Arc::new(Inner { run_dir, logs_dir }),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.inner.run_dir
    }

    /// Append one transcript entry to `{agent}_chat.md`, creating the file
    /// with a title header on first write.
    pub fn append_chat(&self, agent: &str, role: &str, text: &str) {
        let entry = format!("### {role} - {}\n```\n{}\n```\n\n", now_iso(), text.trim_end());
        self.append_entry(agent, &entry);
    }

    /// Append an image reference (e.g. a screenshot captured during
    /// verification) to the agent's chat file.
    pub fn append_image(&self, agent: &str, image_path: &Path, caption: &str, role: &str) {
        let entry = format!(
            "### {role} - {}\n![{caption}]({})\n\n",
            now_iso(),
            image_path.display()
        );
        self.append_entry(agent, &entry);
    }

    fn append_entry(&self, agent: &str, entry: &str) {
        if let Err(err) = self.try_append(agent, entry) {
            tracing::warn!(%agent, error = %err, "chat log write failed");
        }
    }

    fn try_append(&self, agent: &str, entry: &str) -> std::io::Result<()> {
        let path = self.chat_path(agent);
        let mut file = if path.exists() {
            OpenOptions::new().append(true).open(&path)?
        } else {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(format!("# Chat log: {agent}\n\n").as_bytes())?;
            file
        };
        file.write_all(entry.as_bytes())
    }

    pub fn chat_path(&self, agent: &str) -> PathBuf {
        self.inner.logs_dir.join(format!("{agent}_chat.md"))
    }

    /// Merge the given keys into `logs/metadata.json`, preserving anything
    /// already recorded there.
    pub fn save_metadata(&self, metadata: &serde_json::Map<String, Value>) {
        if let Err(err) = self.try_save_metadata(metadata) {
            tracing::warn!(error = %err, "metadata write failed");
        }
    }

    fn try_save_metadata(&self, metadata: &serde_json::Map<String, Value>) -> anyhow::Result<()> {
        let path = self.inner.logs_dir.join("metadata.json");
        let mut current = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<serde_json::Map<String, Value>>(&text)
                .unwrap_or_default(),
            Err(_) => serde_json::Map::new(),
        };
        for (key, value) in metadata {
            current.insert(key.clone(), value.clone());
        }
        fs::write(&path, serde_json::to_string_pretty(&current)?)?;
        Ok(())
    }
}

/// Remove run directories whose mtime is older than the retention window.
/// The current run is never swept.
fn cleanup_old_runs(base_dir: &Path, current: &Path, retention_days: u64) -> std::io::Result<()> {
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(retention_days * 24 * 60 * 60));
    let Some(cutoff) = cutoff else {
        return Ok(());
    };

    for entry in fs::read_dir(base_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || path == current {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        if mtime < cutoff {
            if let Err(err) = fs::remove_dir_all(&path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to sweep old run");
            }
        }
    }
    Ok(())
}
