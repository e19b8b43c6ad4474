use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for foreman.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub sandbox: Option<SandboxConfig>,
    pub loops: Option<LoopsConfig>,
    pub logging: Option<LoggingConfig>,
    pub harness: Option<HarnessConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub workspace: Option<String>,
    pub entry_point: Option<String>,
    pub python_bin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SandboxConfig {
    pub command_timeout_sec: Option<u64>,
    pub max_read_bytes: Option<usize>,
    pub max_write_bytes: Option<usize>,
    /// Program basenames allowed for commands. Empty list = unrestricted.
    pub allowed_commands: Option<Vec<String>>,
    pub allow_shell: Option<bool>,
    pub max_output_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoopsConfig {
    pub worker_max_iterations: Option<u32>,
    pub supervisor_max_iterations: Option<u32>,
    pub package_retry_budget: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub runs_dir: Option<String>,
    pub retention_days: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HarnessConfig {
    /// Packaging command; `{entry}` is replaced by the entry point.
    pub packaging_cmd: Option<Vec<String>>,
    /// Seconds the entry point must stay alive in the headless build check.
    pub build_grace_secs: Option<u64>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub workspace: PathBuf,
    pub entry_point: String,
    pub python_bin: String,

    pub command_timeout_sec: u64,
    pub max_read_bytes: usize,
    pub max_write_bytes: usize,
    pub allowed_commands: Vec<String>,
    pub allow_shell: bool,
    pub max_output_chars: usize,

    pub worker_max_iterations: u32,
    pub supervisor_max_iterations: u32,
    pub package_retry_budget: u32,

    pub runs_dir: PathBuf,
    pub retention_days: u64,

    pub packaging_cmd: Vec<String>,
    pub build_grace_secs: u64,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub workspace: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub python_bin: Option<String>,

    pub command_timeout_sec: Option<u64>,
    pub max_read_bytes: Option<usize>,
    pub max_write_bytes: Option<usize>,
    pub allowed_commands: Option<Vec<String>>,
    pub allow_shell: Option<bool>,
    pub max_output_chars: Option<usize>,

    pub worker_max_iterations: Option<u32>,
    pub supervisor_max_iterations: Option<u32>,
    pub package_retry_budget: Option<u32>,

    pub runs_dir: Option<PathBuf>,
    pub retention_days: Option<u64>,

    pub packaging_cmd: Option<Vec<String>>,
    pub build_grace_secs: Option<u64>,
}

impl ConfigFile {
    /// Flatten the sectioned file into a single partial layer.
    pub fn to_partial(self) -> PartialConfig {
        let mut partial = PartialConfig::default();

        if let Some(general) = self.general {
            partial.model = general.model;
            partial.base_url = general.base_url;
            partial.api_key_env = general.api_key_env;
            partial.workspace = general.workspace.map(PathBuf::from);
            partial.entry_point = general.entry_point;
            partial.python_bin = general.python_bin;
        }
        if let Some(sandbox) = self.sandbox {
            partial.command_timeout_sec = sandbox.command_timeout_sec;
            partial.max_read_bytes = sandbox.max_read_bytes;
            partial.max_write_bytes = sandbox.max_write_bytes;
            partial.allowed_commands = sandbox.allowed_commands;
            partial.allow_shell = sandbox.allow_shell;
            partial.max_output_chars = sandbox.max_output_chars;
        }
        if let Some(loops) = self.loops {
            partial.worker_max_iterations = loops.worker_max_iterations;
            partial.supervisor_max_iterations = loops.supervisor_max_iterations;
            partial.package_retry_budget = loops.package_retry_budget;
        }
        if let Some(logging) = self.logging {
            partial.runs_dir = logging.runs_dir.map(PathBuf::from);
            partial.retention_days = logging.retention_days;
        }
        if let Some(harness) = self.harness {
            partial.packaging_cmd = harness.packaging_cmd;
            partial.build_grace_secs = harness.build_grace_secs;
        }

        partial
    }
}
