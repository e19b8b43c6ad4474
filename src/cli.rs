use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "foreman", version, about = "Hierarchical LLM code-generation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: Supervisor delegating to Worker agents
    Run {
        /// The program to build, in natural language
        #[arg(short, long)]
        task: String,

        /// Model name (e.g. "gemini-3-flash-preview")
        #[arg(short, long)]
        model: Option<String>,

        /// Workspace directory path
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Sandbox command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to config file (layered above workspace config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a single Worker agent without a Supervisor
    Worker {
        /// The program to build, in natural language
        #[arg(short, long)]
        task: String,

        /// Model name (e.g. "gemini-3-flash-preview")
        #[arg(short, long)]
        model: Option<String>,

        /// Workspace directory path
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Sandbox command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to config file (layered above workspace config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
