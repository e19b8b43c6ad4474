//! Shared data model for the action-execution engine.
//!
//! An [`ActionCall`] is one agent-proposed operation; an [`ActionResult`] is
//! the uniform envelope every dispatch produces. The set of recognized
//! actions is closed ([`ActionName`]) -- an unrecognized name never reaches a
//! handler, it fails at the policy boundary instead.

pub mod executor;
pub mod handlers;
pub mod policy;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PolicyError;

/// Parameter map for a single action call. Keys are unique by construction.
pub type Params = serde_json::Map<String, Value>;

/// A named, parameterized operation proposed by an agent. Transient -- one
/// per loop turn, consumed by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Uniform success/failure envelope produced for every dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Params>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ActionResult {
    /// Successful result carrying a data payload.
    pub fn ok(data: Params) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            logs: String::new(),
            duration_ms: 0,
        }
    }

    /// Failed result carrying a human-readable message.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            logs: String::new(),
            duration_ms: 0,
        }
    }

    /// Failed result that still carries partial data (e.g. captured output
    /// of a command that exited non-zero).
    pub fn fail_with_data(error: impl Into<String>, data: Params) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
            logs: String::new(),
            duration_ms: 0,
        }
    }
}

/// The closed set of actions the engine recognizes.
///
/// Worker actions come first, then the supervisor-only ones. Which subset a
/// given agent may actually invoke is decided by its registry, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionName {
    ReadFile,
    CreateFile,
    EditFile,
    GetFileTree,
    RunCommand,
    RunIpython,
    FinishTask,
    RunSubagent,
    FinishWork,
    GetProjectTree,
    GetAllSymbols,
    OpenFile,
    TerminalCommand,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::ReadFile => "read_file",
            ActionName::CreateFile => "create_file",
            ActionName::EditFile => "edit_file",
            ActionName::GetFileTree => "get_file_tree",
            ActionName::RunCommand => "run_command",
            ActionName::RunIpython => "run_ipython",
            ActionName::FinishTask => "finish_task",
            ActionName::RunSubagent => "run_subagent",
            ActionName::FinishWork => "finish_work",
            ActionName::GetProjectTree => "get_project_tree",
            ActionName::GetAllSymbols => "get_all_symbols",
            ActionName::OpenFile => "open_file",
            ActionName::TerminalCommand => "terminal_command",
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionName {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_file" => Ok(ActionName::ReadFile),
            "create_file" => Ok(ActionName::CreateFile),
            "edit_file" => Ok(ActionName::EditFile),
            "get_file_tree" => Ok(ActionName::GetFileTree),
            "run_command" => Ok(ActionName::RunCommand),
            "run_ipython" => Ok(ActionName::RunIpython),
            "finish_task" => Ok(ActionName::FinishTask),
            "run_subagent" => Ok(ActionName::RunSubagent),
            "finish_work" => Ok(ActionName::FinishWork),
            "get_project_tree" => Ok(ActionName::GetProjectTree),
            "get_all_symbols" => Ok(ActionName::GetAllSymbols),
            "open_file" => Ok(ActionName::OpenFile),
            "terminal_command" => Ok(ActionName::TerminalCommand),
            other => Err(PolicyError::UnknownAction {
                name: other.to_string(),
            }),
        }
    }
}
