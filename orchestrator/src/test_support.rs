//! Test-only helpers: plan builders, scripted backends, and a disposable
//! git-backed workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::plan::{Plan, Step, SubStep};
use crate::io::capability::{Capability, CapabilityRequest, PlanRequest, Planner};

/// Create a deterministic step with default fields and no sub-steps.
pub fn step(number: u32, title: &str) -> Step {
    Step {
        step: number,
        title: title.to_string(),
        description: format!("{title} description"),
        category: String::new(),
        estimated_hours: 1.0,
        depends_on: Vec::new(),
        sub_steps: Vec::new(),
    }
}

/// Create a step with explicit dependencies.
pub fn step_with_deps(number: u32, depends_on: &[u32]) -> Step {
    let mut step = step(number, &format!("step {number}"));
    step.depends_on = depends_on.to_vec();
    step
}

/// Create a deterministic sub-step.
pub fn sub_step(id: &str, title: &str) -> SubStep {
    SubStep {
        sub_step: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        files_affected: Vec::new(),
        verification: None,
    }
}

/// Create a minimal valid plan around the given steps.
pub fn plan_with_steps(task_id: &str, steps: Vec<Step>) -> Plan {
    Plan {
        task_id: task_id.to_string(),
        description: format!("{task_id} description"),
        steps,
        execution_order: Vec::new(),
        risks: Vec::new(),
        dependencies: Vec::new(),
    }
}

/// Capability that replays predetermined reply documents in order.
pub struct ScriptedCapability {
    replies: RefCell<VecDeque<Value>>,
}

impl ScriptedCapability {
    pub fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
        }
    }
}

impl Capability for ScriptedCapability {
    fn respond(&self, request: &CapabilityRequest) -> Result<()> {
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted capability exhausted"))?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.output_path, serde_json::to_string(&reply)?)?;
        Ok(())
    }
}

/// Planner that replays predetermined plan documents in order.
pub struct ScriptedPlanner {
    plans: RefCell<VecDeque<Value>>,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<Value>) -> Self {
        Self {
            plans: RefCell::new(plans.into()),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn propose_plan(&self, request: &PlanRequest) -> Result<()> {
        let plan = self
            .plans
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted planner exhausted"))?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.output_path, serde_json::to_string(&plan)?)?;
        Ok(())
    }
}

/// A temporary workspace with an initialized git repository and a bare
/// `origin` remote, so push-based phases work without a network.
pub struct TestWorkspace {
    workdir: TempDir,
    _remote: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let workdir = TempDir::new().context("create workspace tempdir")?;
        let remote = TempDir::new().context("create remote tempdir")?;

        run_git(remote.path(), &["init", "--bare"])?;
        run_git(workdir.path(), &["init", "-b", "main"])?;
        run_git(workdir.path(), &["config", "user.email", "test@example.com"])?;
        run_git(workdir.path(), &["config", "user.name", "Test"])?;
        run_git(
            workdir.path(),
            &[
                "remote",
                "add",
                "origin",
                &remote.path().to_string_lossy(),
            ],
        )?;

        fs::write(workdir.path().join("seed.txt"), "seed\n").context("write seed file")?;
        run_git(workdir.path(), &["add", "-A"])?;
        run_git(workdir.path(), &["commit", "-m", "init"])?;

        Ok(Self {
            workdir,
            _remote: remote,
        })
    }

    pub fn root(&self) -> &Path {
        self.workdir.path()
    }

    /// Write a raw plan document to the default plan location.
    pub fn write_plan_document(&self, document: &Value) -> Result<()> {
        let path = self.root().join(".orchestrator/plan.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut payload = serde_json::to_string_pretty(document)?;
        payload.push('\n');
        fs::write(path, payload)?;
        Ok(())
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}
