//! Bounded execution of one unit of work.
//!
//! A unit is one sub-step, or a whole step when it has no sub-steps. The
//! capability is framed with exactly that unit and then driven through a
//! tool round-trip loop with a hard iteration cap, so a confused backend
//! can never hold the run open indefinitely.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::ledger::ChangeLedger;
use crate::core::plan::{Plan, Step, SubStep};
use crate::io::capability::{Capability, CapabilityReply, CapabilityRequest, Message, respond_and_load};
use crate::io::config::OrchestratorConfig;
use crate::io::report::ReportEngine;
use crate::io::tools::Toolbox;

/// A unit hit the tool round-trip cap without declaring completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationLimitExceededError {
    pub unit: String,
    pub max_iterations: u32,
}

impl fmt::Display for IterationLimitExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit {} did not complete within {} tool iterations",
            self.unit, self.max_iterations
        )
    }
}

impl std::error::Error for IterationLimitExceededError {}

/// The capability replied with neither tool calls nor completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolationError {
    pub unit: String,
    pub detail: String,
}

impl fmt::Display for ProtocolViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {}: capability protocol violation: {}", self.unit, self.detail)
    }
}

impl std::error::Error for ProtocolViolationError {}

/// Result of a completed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit_id: String,
    /// Capability round-trips consumed.
    pub iterations: u32,
    pub summary: String,
}

/// Stable identifier for a unit: the sub-step id, or the bare step number
/// for atomic steps.
pub fn unit_id(step: &Step, sub_step: Option<&SubStep>) -> String {
    match sub_step {
        Some(sub) => sub.sub_step.clone(),
        None => step.step.to_string(),
    }
}

/// Shared machinery for executing units: the backend, the sandbox, the
/// prompt engine, and where intermediate artifacts go.
pub struct UnitContext<'a, C: Capability> {
    pub capability: &'a C,
    pub toolbox: &'a Toolbox,
    pub engine: &'a ReportEngine,
    pub config: &'a OrchestratorConfig,
    pub scratch_dir: &'a Path,
}

/// Drive one unit of work to completion through the capability.
///
/// Tool failures are fed back to the capability as error envelopes and do
/// not abort the unit; diff-safety violations do. The loop ends on a `done`
/// reply, or fails typed on an empty reply or cap exhaustion.
#[instrument(skip_all, fields(unit = %unit_id(step, sub_step)))]
pub fn execute_unit<C: Capability>(
    plan: &Plan,
    step: &Step,
    sub_step: Option<&SubStep>,
    ctx: &UnitContext<'_, C>,
    ledger: &mut ChangeLedger,
) -> Result<UnitOutcome> {
    let unit = unit_id(step, sub_step);
    let changed = ledger
        .file_changes()
        .iter()
        .map(|change| change.path.clone())
        .collect::<Vec<_>>();
    let prompt = ctx
        .engine
        .render_unit_prompt(plan, step, sub_step, &changed)
        .with_context(|| format!("frame unit {unit}"))?;

    let mut conversation = vec![Message::user(prompt)];
    info!(unit, "executing unit");

    for iteration in 1..=ctx.config.max_tool_iterations {
        let request = CapabilityRequest {
            workdir: ctx.toolbox.root().to_path_buf(),
            conversation: conversation.clone(),
            output_path: ctx.scratch_dir.join(format!("unit-{unit}-reply-{iteration}.json")),
            log_path: ctx.scratch_dir.join(format!("unit-{unit}-backend-{iteration}.log")),
            timeout: Duration::from_secs(ctx.config.command_timeout_secs),
            output_limit_bytes: ctx.config.output_limit_bytes,
        };
        let reply = respond_and_load(ctx.capability, &request)
            .with_context(|| format!("unit {unit} iteration {iteration}"))?;

        match reply {
            CapabilityReply::Done { summary } => {
                info!(unit, iterations = iteration, "unit complete");
                return Ok(UnitOutcome {
                    unit_id: unit,
                    iterations: iteration,
                    summary,
                });
            }
            CapabilityReply::Empty => {
                warn!(unit, iteration, "empty capability reply");
                return Err(ProtocolViolationError {
                    unit,
                    detail: "reply carried neither tool calls nor completion".to_string(),
                }
                .into());
            }
            CapabilityReply::ToolCalls(calls) => {
                debug!(unit, iteration, calls = calls.len(), "dispatching tool calls");
                conversation.push(Message::assistant(
                    serde_json::to_string(&calls).context("serialize tool calls")?,
                ));
                let mut outcomes = Vec::with_capacity(calls.len());
                for call in &calls {
                    // Err here is a diff-safety violation and aborts the unit.
                    let outcome = ctx.toolbox.dispatch(call, ledger)?;
                    if !outcome.is_success() {
                        debug!(unit, tool = call.name(), message = %outcome.message, "tool error fed back");
                    }
                    outcomes.push(outcome);
                }
                conversation.push(Message::tool(
                    serde_json::to_string(&outcomes).context("serialize tool outcomes")?,
                ));
            }
        }
    }

    warn!(
        unit,
        max_iterations = ctx.config.max_tool_iterations,
        "iteration cap reached; the plan likely needs finer decomposition"
    );
    Err(IterationLimitExceededError {
        unit,
        max_iterations: ctx.config.max_tool_iterations,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::ChangeKind;
    use crate::test_support::{ScriptedCapability, plan_with_steps, step, sub_step};
    use serde_json::json;

    fn unit_fixture() -> Plan {
        let mut s = step(1, "Implement the adapter");
        s.sub_steps = vec![sub_step("1.1", "Write the module")];
        plan_with_steps("T-9", vec![s])
    }

    fn harness(root: &Path) -> (Toolbox, ReportEngine, OrchestratorConfig) {
        let config = OrchestratorConfig::default();
        let toolbox = Toolbox::new(root, &config).expect("toolbox");
        (toolbox, ReportEngine::new(), config)
    }

    #[test]
    fn unit_completes_after_tool_calls_and_done() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (toolbox, engine, config) = harness(temp.path());
        let plan = unit_fixture();
        let mut ledger = ChangeLedger::new();

        let capability = ScriptedCapability::new(vec![
            json!({"action": "tool_calls", "calls": [
                {"tool": "write_file", "path": "src/adapter.rs", "content": "pub fn go() {}\n", "create_dirs": true}
            ]}),
            json!({"action": "done", "summary": "adapter written"}),
        ]);

        let ctx = UnitContext {
            capability: &capability,
            toolbox: &toolbox,
            engine: &engine,
            config: &config,
            scratch_dir: temp.path(),
        };
        let outcome = execute_unit(
            &plan,
            &plan.steps[0],
            plan.steps[0].sub_steps.first(),
            &ctx,
            &mut ledger,
        )
        .expect("unit");

        assert_eq!(outcome.unit_id, "1.1");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.summary, "adapter written");
        assert!(temp.path().join("src/adapter.rs").exists());
        assert_eq!(ledger.file_changes()[0].kind, ChangeKind::Created);
    }

    #[test]
    fn recoverable_tool_error_is_fed_back_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (toolbox, engine, config) = harness(temp.path());
        let plan = unit_fixture();
        let mut ledger = ChangeLedger::new();

        let capability = ScriptedCapability::new(vec![
            // Reading a missing file yields an error envelope, not an abort.
            json!({"action": "tool_calls", "calls": [
                {"tool": "read_file", "path": "does/not/exist.rs"}
            ]}),
            json!({"action": "done", "summary": "recovered"}),
        ]);

        let ctx = UnitContext {
            capability: &capability,
            toolbox: &toolbox,
            engine: &engine,
            config: &config,
            scratch_dir: temp.path(),
        };
        let outcome = execute_unit(
            &plan,
            &plan.steps[0],
            plan.steps[0].sub_steps.first(),
            &ctx,
            &mut ledger,
        )
        .expect("unit");
        assert_eq!(outcome.summary, "recovered");
    }

    #[test]
    fn empty_reply_is_a_protocol_violation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (toolbox, engine, config) = harness(temp.path());
        let plan = unit_fixture();
        let mut ledger = ChangeLedger::new();

        let capability =
            ScriptedCapability::new(vec![json!({"action": "tool_calls", "calls": []})]);

        let ctx = UnitContext {
            capability: &capability,
            toolbox: &toolbox,
            engine: &engine,
            config: &config,
            scratch_dir: temp.path(),
        };
        let err = execute_unit(
            &plan,
            &plan.steps[0],
            plan.steps[0].sub_steps.first(),
            &ctx,
            &mut ledger,
        )
        .expect_err("violation");
        assert!(err.downcast_ref::<ProtocolViolationError>().is_some());
    }

    #[test]
    fn iteration_cap_yields_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (toolbox, engine, mut config) = harness(temp.path());
        config.max_tool_iterations = 2;
        let plan = unit_fixture();
        let mut ledger = ChangeLedger::new();

        let endless = json!({"action": "tool_calls", "calls": [
            {"tool": "list_files", "dir": "", "recursive": false}
        ]});
        let capability = ScriptedCapability::new(vec![endless.clone(), endless.clone(), endless]);

        let ctx = UnitContext {
            capability: &capability,
            toolbox: &toolbox,
            engine: &engine,
            config: &config,
            scratch_dir: temp.path(),
        };
        let err = execute_unit(
            &plan,
            &plan.steps[0],
            plan.steps[0].sub_steps.first(),
            &ctx,
            &mut ledger,
        )
        .expect_err("cap");
        let limit = err
            .downcast_ref::<IterationLimitExceededError>()
            .expect("typed error");
        assert_eq!(limit.max_iterations, 2);
    }

    #[test]
    fn atomic_step_uses_step_number_as_unit_id() {
        let plan = plan_with_steps("T-9", vec![step(4, "Atomic")]);
        assert_eq!(unit_id(&plan.steps[0], None), "4");
    }
}
