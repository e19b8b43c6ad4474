//! The Worker loop: a ReAct-style coder agent over the worker action table.
//!
//! Each turn the model proposes one action as JSON; the executor runs it and
//! the result is appended to the transcript as the next observation.
//! `finish_task` triggers the build check: success is the accepting terminal,
//! failure comes back as corrective feedback and the loop continues on the
//! same budget.

use crate::action::executor::ActionExecutor;
use crate::action::registry::ActionDispatch;
use crate::action::{ActionCall, ActionName};

use super::logging::RunLogger;
use super::model::{ModelClient, ModelTurn};
use super::transcript::ChatMessage;
use super::{format_result, AgentOutcome};

const PARSE_CORRECTION: &str =
    "Respond with exactly one JSON object in a ```json block, with \"thought\", \"action\" and \"params\" fields.";

pub struct Worker<C: ModelClient, D: ActionDispatch> {
    client: C,
    executor: ActionExecutor<D>,
    logger: RunLogger,
    agent_name: String,
    entry_point: String,
    max_iterations: u32,
}

impl<C: ModelClient, D: ActionDispatch> Worker<C, D> {
    pub fn new(
        client: C,
        executor: ActionExecutor<D>,
        logger: RunLogger,
        entry_point: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            client,
            executor,
            logger,
            agent_name: "worker".to_string(),
            entry_point: entry_point.into(),
            max_iterations,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are an autonomous coding agent. You build Python GUI programs (PySide6).

Available actions:
- read_file: {{"path": "file.py"}}
- create_file: {{"path": "file.py", "content": "code"}}
- edit_file: {{"path": "file.py", "old": "old text", "new": "new text"}}
- get_file_tree: {{"start_path": ".", "max_depth": 2}} - show the file structure
- run_command: {{"cmd": ["command", "args"]}} - run a terminal command
- run_ipython: {{"code": "print('hello')"}} - run python code in an interactive session (state persists)
- finish_task: {{}} - finish the task and run the verification build

Response format (only JSON in a ```json block):
```json
{{
  "thought": "what I am doing and why",
  "action": "action_name",
  "params": {{...}}
}}
```

Requirements:
- The main file MUST be named {entry} (the entry point)
- You may create any project structure with as many files as you need
- Use PySide6 for the GUI
- {entry} must contain `if __name__ == "__main__":` and start the application
- One message carries exactly one "action"

Important:
- Do NOT launch the application yourself via run_command
- When you are done, call finish_task and the application is verified automatically
- If verification fails you get the error back and can fix it
- Install libraries (pip install) only after an import error, never preemptively"#,
            entry = self.entry_point
        )
    }

    /// Run the loop to a terminal state.
    pub async fn run(&mut self, task: &str) -> AgentOutcome {
        let system_prompt = self.system_prompt();
        let mut messages = vec![
            ChatMessage::system(system_prompt.as_str()),
            ChatMessage::user(format!("Task: {task}")),
        ];
        self.logger.append_chat(&self.agent_name, "system", &system_prompt);
        self.logger.append_chat(&self.agent_name, "user", task);

        for iteration in 1..=self.max_iterations {
            tracing::info!(iteration, max = self.max_iterations, "worker iteration");

            let parsed = match self.client.chat(&messages).await {
                ModelTurn::Action(parsed) => parsed,
                ModelTurn::ParseFailure { raw } => {
                    tracing::warn!("worker response had no parseable action");
                    self.logger.append_chat(&self.agent_name, "assistant", &raw);
                    messages.push(ChatMessage::assistant(raw));
                    self.logger
                        .append_chat(&self.agent_name, "system", PARSE_CORRECTION);
                    messages.push(ChatMessage::user(PARSE_CORRECTION));
                    continue;
                }
                ModelTurn::Exhausted { reason } => {
                    tracing::error!(%reason, "model client gave up");
                    return AgentOutcome::rejected(
                        iteration,
                        format!("Model client gave up: {reason}"),
                    );
                }
            };

            self.logger
                .append_chat(&self.agent_name, "assistant", &parsed.raw);
            messages.push(ChatMessage::assistant(parsed.raw.clone()));
            tracing::info!(thought = %parsed.thought, action = %parsed.action, "worker turn");

            let is_finish = parsed.action == ActionName::FinishTask.as_str();
            let call = ActionCall::new(parsed.action, parsed.params);
            let result = self.executor.execute(&call).await;

            if is_finish && result.success {
                let summary = result
                    .data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("verification passed")
                    .to_string();
                self.logger
                    .append_chat(&self.agent_name, "system", &format!("Task accepted: {summary}"));
                return AgentOutcome::accepted(iteration, summary);
            }

            let feedback = if is_finish {
                let error = result.error.as_deref().unwrap_or("unknown error");
                format!(
                    "The application does not work. Error:\n{error}\n\nFix the problem, then call finish_task again."
                )
            } else {
                format_result(&result)
            };

            if !result.success {
                tracing::warn!(action = %call.name, error = ?result.error, "action failed");
            }
            self.logger
                .append_chat(&self.agent_name, "system", &feedback);
            messages.push(ChatMessage::user(feedback));
        }

        tracing::error!("worker iteration budget exhausted");
        AgentOutcome::rejected(self.max_iterations, "Iteration budget exhausted")
    }
}
