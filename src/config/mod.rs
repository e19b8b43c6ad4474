pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::Path;

/// Load configuration by merging global, workspace, explicit-file, and CLI
/// sources. Precedence: CLI > --config file > workspace config > global
/// config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/foreman/foreman.toml or platform
    // equivalent).
    let global = load_global_config();

    // Workspace path comes from CLI or global config before the workspace
    // layer can be read.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| std::path::PathBuf::from("./workspace"));

    // Layer 2: Workspace config (workspace/foreman.toml).
    let workspace = load_workspace_config(&workspace_path);

    // Layer 3: Explicitly named config file, if any. Unlike the searched
    // layers, a file the user asked for must exist and parse.
    let explicit = match cli_config_path(cli) {
        Some(path) => load_required_toml(path)
            .with_context(|| format!("--config {}", path.display()))?,
        None => PartialConfig::default(),
    };

    // Layer 4: CLI args.
    let cli_partial = cli_to_partial(cli);

    let config = cli_partial
        .with_fallback(explicit)
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(path) => load_toml_file(&path).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load workspace config from workspace/foreman.toml.
/// Returns empty PartialConfig if file not found.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    let config_path = workspace_path.join("foreman.toml");
    load_toml_file(&config_path).unwrap_or_default()
}

/// Load an explicitly named config file; missing or malformed is an error.
fn load_required_toml(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config_file: ConfigFile =
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(config_file.to_partial())
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and skipped.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/foreman/foreman.toml
/// macOS: ~/Library/Application Support/foreman/foreman.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "foreman")
        .map(|dirs| dirs.config_dir().join("foreman.toml"))
}

fn cli_workspace(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Run { workspace, .. } | Commands::Worker { workspace, .. } => workspace.clone(),
    }
}

fn cli_config_path(cli: &Cli) -> Option<&Path> {
    match &cli.command {
        Commands::Run { config, .. } | Commands::Worker { config, .. } => config.as_deref(),
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            model,
            workspace,
            timeout,
            ..
        }
        | Commands::Worker {
            model,
            workspace,
            timeout,
            ..
        } => PartialConfig {
            model: model.clone(),
            workspace: workspace.clone(),
            command_timeout_sec: *timeout,
            ..Default::default()
        },
    }
}
