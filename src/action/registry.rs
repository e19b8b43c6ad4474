//! Construction-time binding of action names to sandbox-bound handlers.
//!
//! Each agent level gets its own registry over the closed [`ActionName`]
//! set: the Worker's file/command/code actions, and the Supervisor's
//! delegation/inspection actions. Binding tables are validated at
//! construction -- a duplicate or unsupported name is a startup error, not a
//! runtime lookup surprise.
//!
//! `finish_task` and `finish_work` are ordinary dispatches here; their
//! terminal meaning lives entirely in how the owning loop reads the result.

use std::collections::BTreeSet;

use serde_json::json;

use super::handlers::{self, script::ScriptContext, HandlerOutput, SandboxCtx};
use super::{ActionName, ActionResult, Params};
use crate::harness::{BuildRunner, Packager, SubagentRunner};

/// Uniform dispatch surface the executor drives. `supports` is the bound
/// name table; `invoke` runs the handler with normalized parameters. The
/// `Err` channel carries handler failures the executor folds into a failed
/// envelope.
#[allow(async_fn_in_trait)]
pub trait ActionDispatch {
    fn supports(&self, name: ActionName) -> bool;
    async fn invoke(&mut self, name: ActionName, params: &Params) -> Result<HandlerOutput, String>;
}

/// The Worker's action table.
pub const WORKER_ACTIONS: &[ActionName] = &[
    ActionName::ReadFile,
    ActionName::CreateFile,
    ActionName::EditFile,
    ActionName::GetFileTree,
    ActionName::RunCommand,
    ActionName::RunIpython,
    ActionName::FinishTask,
];

/// The Supervisor's action table.
pub const SUPERVISOR_ACTIONS: &[ActionName] = &[
    ActionName::RunSubagent,
    ActionName::FinishWork,
    ActionName::GetProjectTree,
    ActionName::GetAllSymbols,
    ActionName::OpenFile,
    ActionName::TerminalCommand,
];

/// Validate a binding table: every listed action bound exactly once.
fn bind_actions(actions: &[ActionName]) -> anyhow::Result<BTreeSet<ActionName>> {
    let mut bound = BTreeSet::new();
    for &action in actions {
        if !bound.insert(action) {
            anyhow::bail!("duplicate action binding: {action}");
        }
    }
    if bound.is_empty() {
        anyhow::bail!("empty action binding table");
    }
    Ok(bound)
}

// ---------------------------------------------------------------------------
// Worker registry
// ---------------------------------------------------------------------------

/// Name table for the Worker loop: file/command/code primitives plus the
/// `finish_task` terminal, which consults the build collaborator.
pub struct WorkerRegistry<B: BuildRunner> {
    ctx: SandboxCtx,
    script: ScriptContext,
    builder: B,
    bound: BTreeSet<ActionName>,
}

impl<B: BuildRunner> WorkerRegistry<B> {
    pub fn new(ctx: SandboxCtx, builder: B) -> anyhow::Result<Self> {
        let bound = bind_actions(WORKER_ACTIONS)?;
        let script = ScriptContext::new(&ctx);
        Ok(Self {
            ctx,
            script,
            builder,
            bound,
        })
    }
}

impl<B: BuildRunner> ActionDispatch for WorkerRegistry<B> {
    fn supports(&self, name: ActionName) -> bool {
        self.bound.contains(&name)
    }

    async fn invoke(&mut self, name: ActionName, params: &Params) -> Result<HandlerOutput, String> {
        match name {
            ActionName::ReadFile => handlers::fs::read_file(params).await,
            ActionName::CreateFile => handlers::fs::create_file(params).await,
            ActionName::EditFile => handlers::fs::edit_file(params).await,
            ActionName::GetFileTree => handlers::fs::file_tree(params).await,
            ActionName::RunCommand => {
                handlers::process::run_command(params, self.ctx.max_output_chars).await
            }
            ActionName::RunIpython => self.script.run(params).await,
            ActionName::FinishTask => {
                let (ok, message) = self.builder.attempt_build(&self.ctx.entry_point).await;
                if ok {
                    Ok(ActionResult::ok(handlers::obj(json!({ "message": message }))).into())
                } else {
                    Ok(ActionResult::fail(format!("Build failed: {message}")).into())
                }
            }
            other => Err(format!("action `{other}` is not bound to this agent")),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor registry
// ---------------------------------------------------------------------------

/// Name table for the Supervisor loop: blocking delegation, packaging, and
/// the inspection-only primitives.
pub struct SupervisorRegistry<S: SubagentRunner, P: Packager> {
    ctx: SandboxCtx,
    runner: S,
    packager: P,
    bound: BTreeSet<ActionName>,
}

impl<S: SubagentRunner, P: Packager> SupervisorRegistry<S, P> {
    pub fn new(ctx: SandboxCtx, runner: S, packager: P) -> anyhow::Result<Self> {
        let bound = bind_actions(SUPERVISOR_ACTIONS)?;
        Ok(Self {
            ctx,
            runner,
            packager,
            bound,
        })
    }
}

impl<S: SubagentRunner, P: Packager> ActionDispatch for SupervisorRegistry<S, P> {
    fn supports(&self, name: ActionName) -> bool {
        self.bound.contains(&name)
    }

    async fn invoke(&mut self, name: ActionName, params: &Params) -> Result<HandlerOutput, String> {
        match name {
            ActionName::RunSubagent => {
                let instruction = handlers::str_param(params, "instruction")?;
                tracing::info!("delegating to worker");
                // Blocking delegation: the supervisor does nothing until the
                // nested worker loop returns.
                let (ok, summary) = self.runner.run_instruction(instruction).await;
                if ok {
                    Ok(ActionResult::ok(handlers::obj(json!({
                        "message": "Worker finished successfully. Now verify the work.",
                        "summary": summary,
                    })))
                    .into())
                } else {
                    Ok(ActionResult::fail(format!("Worker failed: {summary}")).into())
                }
            }
            ActionName::FinishWork => {
                let (ok, message) = self.packager.package(&self.ctx.entry_point).await;
                if ok {
                    Ok(ActionResult::ok(handlers::obj(json!({
                        "message": "Build successful",
                        "details": message,
                    })))
                    .into())
                } else {
                    Ok(ActionResult::fail(format!("Packaging failed: {message}")).into())
                }
            }
            ActionName::GetProjectTree => handlers::fs::file_tree(params).await,
            ActionName::GetAllSymbols => handlers::inspect::get_all_symbols(params).await,
            ActionName::OpenFile => handlers::inspect::open_file(params).await,
            ActionName::TerminalCommand => {
                handlers::process::run_command(params, self.ctx.max_output_chars).await
            }
            other => Err(format!("action `{other}` is not bound to this agent")),
        }
    }
}
