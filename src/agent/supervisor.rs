//! The Supervisor loop: a project-manager agent over the supervisor action
//! table.
//!
//! `run_subagent` blocks for a full nested Worker run; `finish_work` success
//! (the packaging step) is the accepting terminal. Consecutive `finish_work`
//! failures are tracked against a retry budget so a broken build cannot eat
//! the whole iteration budget; dispatching any other action resets the
//! counter.

use crate::action::executor::ActionExecutor;
use crate::action::registry::ActionDispatch;
use crate::action::{ActionCall, ActionName};

use super::logging::RunLogger;
use super::model::{ModelClient, ModelTurn};
use super::transcript::ChatMessage;
use super::{format_result, AgentOutcome};

const PARSE_CORRECTION: &str =
    "Respond with exactly one JSON object in a ```json block, with \"thought\", \"action\" and \"params\" fields.";

const SYSTEM_PROMPT: &str = r#"You are a Project Manager Agent. Your goal is to oversee the development of a software project.
The project must be a Python program with a GUI (PySide6).
You manage a Coder Agent who writes the code.

Process:
1. Analyze the user's request.
2. Write a concise product requirements document and send it to the Coder Agent.
   Do not divide the project into phases; the whole project is built from the first delegation.
3. Keep a development checklist based on the requirements.
4. Review the Coder's work using your tools and the checklist.
5. If there are issues, instruct the Coder to fix them.
6. Repeat the review until the project is complete and correct.
7. Finish the work.

Available tools:
- run_subagent: {"instruction": "text"} - Send instructions to the Coder Agent. The first call should include the requirements document; later calls carry feedback or new tasks.
- finish_work: {} - Call this ONLY when the project is fully completed and verified. This triggers the final build.
- get_project_tree: {} - Get the file structure of the project.
- get_all_symbols: {"file_path": "path/to/file.py"} - List the classes and functions in a file with line numbers.
- open_file: {"file_path": "path/to/file.py", "start_line": 1, "end_line": 100} - Read a range of a file.
- terminal_command: {"cmd": ["command", "args"]} - Run a terminal command (use sparingly, e.g. for grep).

Response format (only JSON in a ```json block):
```json
{
  "thought": "reasoning",
  "action": "tool_name",
  "params": {...}
}
```"#;

pub struct Supervisor<C: ModelClient, D: ActionDispatch> {
    client: C,
    executor: ActionExecutor<D>,
    logger: RunLogger,
    agent_name: String,
    max_iterations: u32,
    package_retry_budget: u32,
}

impl<C: ModelClient, D: ActionDispatch> Supervisor<C, D> {
    pub fn new(
        client: C,
        executor: ActionExecutor<D>,
        logger: RunLogger,
        max_iterations: u32,
        package_retry_budget: u32,
    ) -> Self {
        Self {
            client,
            executor,
            logger,
            agent_name: "supervisor".to_string(),
            max_iterations,
            package_retry_budget,
        }
    }

    /// Run the loop to a terminal state.
    pub async fn run(&mut self, user_request: &str) -> AgentOutcome {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("User Request: {user_request}")),
        ];
        self.logger
            .append_chat(&self.agent_name, "system", SYSTEM_PROMPT);
        self.logger
            .append_chat(&self.agent_name, "user", user_request);

        let mut consecutive_package_failures = 0u32;

        for iteration in 1..=self.max_iterations {
            tracing::info!(iteration, max = self.max_iterations, "supervisor iteration");

            let parsed = match self.client.chat(&messages).await {
                ModelTurn::Action(parsed) => parsed,
                ModelTurn::ParseFailure { raw } => {
                    tracing::warn!("supervisor response had no parseable action");
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
            tracing::info!(thought = %parsed.thought, action = %parsed.action, "supervisor turn");

            let is_finish = parsed.action == ActionName::FinishWork.as_str();
            let call = ActionCall::new(parsed.action, parsed.params);
            let result = self.executor.execute(&call).await;

            let result_text = format_result(&result);
            self.logger
                .append_chat(&self.agent_name, "system", &result_text);
            messages.push(ChatMessage::user(result_text));

            if is_finish {
                if result.success {
                    return AgentOutcome::accepted(iteration, "Packaging succeeded");
                }
                consecutive_package_failures += 1;
                tracing::warn!(
                    attempt = consecutive_package_failures,
                    budget = self.package_retry_budget,
                    "packaging attempt failed"
                );
                if consecutive_package_failures >= self.package_retry_budget {
                    let notice = format!(
                        "Packaging failed {consecutive_package_failures} times in a row. Aborting the run."
                    );
                    self.logger.append_chat(&self.agent_name, "system", &notice);
                    messages.push(ChatMessage::system(notice.as_str()));
                    return AgentOutcome::rejected(iteration, notice);
                }
            } else {
                consecutive_package_failures = 0;
            }
        }

        tracing::error!("supervisor iteration budget exhausted");
        AgentOutcome::rejected(self.max_iterations, "Iteration budget exhausted")
    }
}
