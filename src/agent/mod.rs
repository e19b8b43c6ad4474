//! The two control loops and their collaborators.
//!
//! A run is a Supervisor loop that delegates implementation work to nested
//! Worker loops. Both are the same state machine: ask the model for a turn,
//! parse it, dispatch the action through an executor, feed the result back.
//! They differ in their action tables, budgets, and terminal conditions.

pub mod logging;
pub mod model;
pub mod supervisor;
pub mod transcript;
pub mod worker;

use crate::action::ActionResult;

/// How a control loop ended.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// True iff the loop reached its accepting terminal action.
    pub success: bool,
    /// Model turns consumed, including parse-failure turns.
    pub iterations: u32,
    /// Human-readable account of the terminal condition.
    pub summary: String,
}

impl AgentOutcome {
    pub fn accepted(iterations: u32, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            iterations,
            summary: summary.into(),
        }
    }

    pub fn rejected(iterations: u32, summary: impl Into<String>) -> Self {
        Self {
            success: false,
            iterations,
            summary: summary.into(),
        }
    }
}

/// Render an action result as the observation text fed back to the model.
pub(crate) fn format_result(result: &ActionResult) -> String {
    if result.success {
        let data = result.data.clone().unwrap_or_default();
        let rendered = serde_json::to_string_pretty(&data)
            .unwrap_or_else(|_| "{}".to_string());
        format!("Success:\n{rendered}")
    } else {
        let error = result.error.as_deref().unwrap_or("unknown error");
        format!("Error: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Params;
    use serde_json::Value;

    #[test]
    fn success_result_renders_data_json() {
        let mut data = Params::new();
        data.insert("path".into(), Value::from("app.py"));
        let text = format_result(&ActionResult::ok(data));
        assert!(text.starts_with("Success:\n"));
        assert!(text.contains("\"path\": \"app.py\""));
    }

    #[test]
    fn failure_result_renders_error_line() {
        let text = format_result(&ActionResult::fail("no such file"));
        assert_eq!(text, "Error: no such file");
    }
}
