//! The timed dispatch envelope around policy and registry.
//!
//! Every call takes the same path: policy check, name resolution, table
//! lookup, handler invocation. Any failure along the way folds into a failed
//! [`ActionResult`] with the elapsed time stamped on it, so the owning agent
//! loop never sees a panic or a bare error type, only the envelope.

use std::time::Instant;

use super::handlers::HandlerOutput;
use super::policy::ActionPolicy;
use super::registry::ActionDispatch;
use super::{ActionCall, ActionName, ActionResult};
use crate::error::PolicyError;

/// Executes validated action calls against a bound registry. One per agent
/// level; the policy may be shared (cloned) across levels, the registry is
/// owned because handlers carry state.
pub struct ActionExecutor<D: ActionDispatch> {
    policy: ActionPolicy,
    registry: D,
}

impl<D: ActionDispatch> ActionExecutor<D> {
    pub fn new(policy: ActionPolicy, registry: D) -> Self {
        Self { policy, registry }
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &D {
        &self.registry
    }

    /// Run one action call end to end and return its envelope.
    ///
    /// `duration_ms` covers the full span including policy validation, so a
    /// rejected call still reports how long rejection took.
    pub async fn execute(&mut self, call: &ActionCall) -> ActionResult {
        let started = Instant::now();

        let params = match self.policy.check(call) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(action = %call.name, error = %err, "action rejected by policy");
                return stamp(ActionResult::fail(err.to_string()), started);
            }
        };

        // Policy already resolved the name; this cannot fail after a
        // successful check.
        let name = match call.name.parse::<ActionName>() {
            Ok(name) => name,
            Err(err) => return stamp(ActionResult::fail(err.to_string()), started),
        };

        if !self.registry.supports(name) {
            let err = PolicyError::UnknownAction {
                name: call.name.clone(),
            };
            tracing::warn!(action = %name, "action not bound at this agent level");
            return stamp(ActionResult::fail(err.to_string()), started);
        }

        tracing::debug!(action = %name, "dispatching action");
        let result = match self.registry.invoke(name, &params).await {
            Ok(HandlerOutput::Result(result)) => result,
            Ok(HandlerOutput::Value(value)) => {
                let mut data = super::Params::new();
                data.insert("result".into(), value);
                ActionResult::ok(data)
            }
            Err(message) => {
                tracing::warn!(action = %name, error = %message, "handler failed");
                ActionResult::fail(message)
            }
        };
        stamp(result, started)
    }
}

fn stamp(mut result: ActionResult, started: Instant) -> ActionResult {
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}
