use super::schema::{AppConfig, PartialConfig};
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For list-valued fields (allowed_commands, packaging_cmd): REPLACE
    /// semantics -- if self has Some, it is used entirely.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            base_url: self.base_url.or(fallback.base_url),
            api_key_env: self.api_key_env.or(fallback.api_key_env),
            workspace: self.workspace.or(fallback.workspace),
            entry_point: self.entry_point.or(fallback.entry_point),
            python_bin: self.python_bin.or(fallback.python_bin),

            command_timeout_sec: self.command_timeout_sec.or(fallback.command_timeout_sec),
            max_read_bytes: self.max_read_bytes.or(fallback.max_read_bytes),
            max_write_bytes: self.max_write_bytes.or(fallback.max_write_bytes),
            allowed_commands: self.allowed_commands.or(fallback.allowed_commands),
            allow_shell: self.allow_shell.or(fallback.allow_shell),
            max_output_chars: self.max_output_chars.or(fallback.max_output_chars),

            worker_max_iterations: self.worker_max_iterations.or(fallback.worker_max_iterations),
            supervisor_max_iterations: self
                .supervisor_max_iterations
                .or(fallback.supervisor_max_iterations),
            package_retry_budget: self.package_retry_budget.or(fallback.package_retry_budget),

            runs_dir: self.runs_dir.or(fallback.runs_dir),
            retention_days: self.retention_days.or(fallback.retention_days),

            packaging_cmd: self.packaging_cmd.or(fallback.packaging_cmd),
            build_grace_secs: self.build_grace_secs.or(fallback.build_grace_secs),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        AppConfig {
            model: self
                .model
                .unwrap_or_else(|| "gemini-3-flash-preview".to_string()),
            base_url: self.base_url.unwrap_or_else(|| {
                "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
            }),
            api_key_env: self.api_key_env.unwrap_or_else(|| "OPENAI_API_KEY".to_string()),
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from("./workspace")),
            entry_point: self.entry_point.unwrap_or_else(|| "app.py".to_string()),
            python_bin: self.python_bin.unwrap_or_else(|| "python3".to_string()),

            command_timeout_sec: self.command_timeout_sec.unwrap_or(10),
            max_read_bytes: self.max_read_bytes.unwrap_or(262_144),
            max_write_bytes: self.max_write_bytes.unwrap_or(1_048_576),
            allowed_commands: self.allowed_commands.unwrap_or_default(),
            allow_shell: self.allow_shell.unwrap_or(false),
            max_output_chars: self.max_output_chars.unwrap_or(200_000),

            worker_max_iterations: self.worker_max_iterations.unwrap_or(30),
            supervisor_max_iterations: self.supervisor_max_iterations.unwrap_or(50),
            package_retry_budget: self.package_retry_budget.unwrap_or(5),

            runs_dir: self.runs_dir.unwrap_or_else(|| PathBuf::from("./runs")),
            retention_days: self.retention_days.unwrap_or(7),

            packaging_cmd: self.packaging_cmd.unwrap_or_else(|| {
                vec![
                    "python3".to_string(),
                    "-m".to_string(),
                    "PyInstaller".to_string(),
                    "--onefile".to_string(),
                    "{entry}".to_string(),
                ]
            }),
            build_grace_secs: self.build_grace_secs.unwrap_or(3),
        }
    }
}
