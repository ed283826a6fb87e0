//! The workflow driver: walks one task run through every phase.
//!
//! Each phase performs its side effects, feeds one event into the pure
//! state machine in [`crate::core::phase`], and persists run state before
//! the next phase begins. Failures keep the partial ledger: the summary
//! written on error names the phase that failed and everything recorded up
//! to that point.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::cursor;
use crate::core::ledger::{
    ChangeLedger, DependencyInstall, InstallOutcome, RunStatus, RunSummary, VcsKind, VcsOperation,
};
use crate::core::phase::{PhaseEvent, WorkflowPhase, transition};
use crate::core::plan::{DependencyRequest, Plan};
use crate::core::schedule;
use crate::core::validate::{ValidationFailedError, validate_plan};
use crate::io::capability::{Capability, PlanRequest, Planner, plan_and_load};
use crate::io::config::{OrchestratorConfig, load_config};
use crate::io::git::{BranchSetup, Git};
use crate::io::plan_store::{load_plan, plan_from_value, write_plan};
use crate::io::process::run_with_timeout;
use crate::io::report::ReportEngine;
use crate::io::run_state::{RunState, load_or_default_run_state, write_run_state};
use crate::io::tools::Toolbox;
use crate::unit::{UnitContext, execute_unit};

/// The run could not even begin: missing workspace, missing plan, or
/// corrupt persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalInitializationError {
    pub reason: String,
}

impl fmt::Display for FatalInitializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot start run: {}", self.reason)
    }
}

impl std::error::Error for FatalInitializationError {}

/// Well-known paths under the workspace root.
#[derive(Debug, Clone)]
pub struct OrchestratorPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub config_path: PathBuf,
    pub plan_path: PathBuf,
    pub run_state_path: PathBuf,
    pub summary_path: PathBuf,
    pub pr_body_path: PathBuf,
}

impl OrchestratorPaths {
    pub fn new(root: &Path) -> Self {
        let base = root.join(".orchestrator");
        Self {
            root: root.to_path_buf(),
            state_dir: base.join("state"),
            scratch_dir: base.join("scratch"),
            config_path: base.join("config.toml"),
            plan_path: base.join("plan.json"),
            run_state_path: base.join("state").join("run_state.json"),
            summary_path: base.join("state").join("summary.json"),
            pr_body_path: base.join("state").join("pr_body.md"),
        }
    }
}

/// Caller-supplied knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Plan document location; defaults to `.orchestrator/plan.json`.
    pub plan_path: Option<PathBuf>,
    /// Working branch; defaults to `task/<task_id>`.
    pub branch: Option<String>,
    pub remote: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            plan_path: None,
            branch: None,
            remote: "origin".to_string(),
        }
    }
}

/// Terminal report of one run invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub phases_completed: Vec<WorkflowPhase>,
    pub summary_path: PathBuf,
}

/// Execute the full workflow for the plan under `root`.
///
/// Returns `Ok` with a non-success status for plan rejection and phase
/// failures; `Err` is reserved for conditions where not even the error
/// summary could be written.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_workflow<C: Capability, P: Planner>(
    root: &Path,
    capability: &C,
    planner: &P,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let paths = OrchestratorPaths::new(root);
    let mut driver = Driver::initialize(paths, capability, planner, options)?;

    match driver.run() {
        Ok(status) => driver.finish(status),
        Err(err) => {
            if let Some(rejected) = err.downcast_ref::<ValidationFailedError>() {
                warn!(iterations = rejected.iterations, "plan rejected");
                let issues = rejected.issues.clone();
                return driver.finish(RunStatus::ValidationFailed { issues });
            }
            let phase = driver.phase;
            warn!(phase = phase.as_str(), error = %format!("{err:#}"), "run failed");
            driver.phase = transition(phase, PhaseEvent::Failed);
            driver.finish(RunStatus::Error {
                phase: phase.as_str().to_string(),
                message: format!("{err:#}"),
            })
        }
    }
}

struct Driver<'a, C: Capability, P: Planner> {
    paths: OrchestratorPaths,
    config: OrchestratorConfig,
    options: &'a RunOptions,
    capability: &'a C,
    planner: &'a P,
    toolbox: Toolbox,
    engine: ReportEngine,
    git: Git,
    plan: Plan,
    plan_path: PathBuf,
    state: RunState,
    ledger: ChangeLedger,
    phase: WorkflowPhase,
    phases_completed: Vec<WorkflowPhase>,
    branch: String,
    tests_summary: Option<String>,
}

impl<'a, C: Capability, P: Planner> Driver<'a, C, P> {
    fn initialize(
        paths: OrchestratorPaths,
        capability: &'a C,
        planner: &'a P,
        options: &'a RunOptions,
    ) -> Result<Self> {
        if !paths.root.is_dir() {
            return Err(FatalInitializationError {
                reason: format!("workspace root {} does not exist", paths.root.display()),
            }
            .into());
        }
        let plan_path = options
            .plan_path
            .clone()
            .unwrap_or_else(|| paths.plan_path.clone());
        if !plan_path.exists() {
            return Err(FatalInitializationError {
                reason: format!("plan document {} does not exist", plan_path.display()),
            }
            .into());
        }

        let config = load_config(&paths.config_path)?;
        let plan = load_plan(&plan_path)?;

        let mut state = load_or_default_run_state(&paths.run_state_path)?;
        if state.phase.is_terminal() {
            debug!("previous run is terminal, starting fresh");
            state = RunState::default();
        }
        if let Err(reason) = cursor::check_cursor(&plan, state.cursor) {
            return Err(FatalInitializationError {
                reason: format!("persisted cursor is stale: {reason}"),
            }
            .into());
        }
        if state.run_id.is_none() {
            state.run_id = Some(new_run_id(&plan.task_id));
        }

        fs::create_dir_all(&paths.scratch_dir)
            .with_context(|| format!("create {}", paths.scratch_dir.display()))?;
        let toolbox = Toolbox::new(&paths.root, &config)?;
        let git = Git::new(&paths.root);
        let branch = options
            .branch
            .clone()
            .unwrap_or_else(|| format!("task/{}", plan.task_id));

        info!(
            run_id = state.run_id.as_deref().unwrap_or_default(),
            task_id = %plan.task_id,
            units = plan.unit_count(),
            resuming = state.phase != WorkflowPhase::Initialize,
            "run initialized"
        );

        Ok(Self {
            paths,
            config,
            options,
            capability,
            planner,
            toolbox,
            engine: ReportEngine::new(),
            git,
            plan,
            plan_path,
            state,
            ledger: ChangeLedger::new(),
            phase: WorkflowPhase::Initialize,
            phases_completed: Vec::new(),
            branch,
            tests_summary: None,
        })
    }

    /// Walk the phases; `Ok` carries the terminal status (success or plan
    /// rejection), `Err` any phase failure.
    fn run(&mut self) -> Result<RunStatus> {
        // Resume lands on the persisted phase; completed phases are skipped.
        let resume_from = self.state.phase;

        self.advance_phase(PhaseEvent::Initialized)?;

        if !phase_done(resume_from, WorkflowPhase::SetupBranch) {
            self.setup_branch()?;
        }
        self.advance_phase(PhaseEvent::BranchReady)?;

        if !phase_done(resume_from, WorkflowPhase::InstallDependencies) {
            self.install_dependencies()?;
        }
        self.advance_phase(PhaseEvent::DependenciesHandled)?;

        self.generate_code()?;
        self.advance_phase(PhaseEvent::PlanAccepted)?;

        self.execute_steps()?;
        self.advance_phase(PhaseEvent::StepsComplete)?;

        self.run_tests()?;
        self.advance_phase(PhaseEvent::TestsPassed)?;

        self.commit_changes()?;
        self.advance_phase(PhaseEvent::Committed)?;

        self.create_pr()?;
        self.advance_phase(PhaseEvent::PrCreated)?;

        Ok(RunStatus::Success)
    }

    fn advance_phase(&mut self, event: PhaseEvent) -> Result<()> {
        self.phases_completed.push(self.phase);
        self.phase = transition(self.phase, event);
        if self.phase == WorkflowPhase::Error {
            return Err(anyhow::anyhow!(
                "illegal phase transition out of {}",
                self.phases_completed
                    .last()
                    .map(|p| p.as_str())
                    .unwrap_or("?")
            ));
        }
        self.persist_state(None)?;
        debug!(phase = self.phase.as_str(), "entered phase");
        Ok(())
    }

    fn persist_state(&mut self, last_error: Option<String>) -> Result<()> {
        self.state.phase = self.phase;
        self.state.last_error = last_error;
        write_run_state(&self.paths.run_state_path, &self.state)
    }

    #[instrument(skip_all, fields(branch = %self.branch))]
    fn setup_branch(&mut self) -> Result<()> {
        let setup = self.git.ensure_branch(&self.branch)?;
        let outcome = match setup {
            BranchSetup::Created => "created",
            BranchSetup::Reused => "reused",
        };
        info!(outcome, "branch ready");
        self.ledger.record_vcs(VcsOperation {
            kind: VcsKind::BranchCreate,
            input: self.branch.clone(),
            outcome: outcome.to_string(),
            commit_id: None,
        });
        Ok(())
    }

    /// Attempt every declared dependency install. Failures are recorded in
    /// the ledger and do not stop the run.
    #[instrument(skip_all, fields(count = self.plan.dependencies.len()))]
    fn install_dependencies(&mut self) -> Result<()> {
        let requests = self.plan.dependencies.clone();
        for request in &requests {
            let command = install_command(request);
            let outcome = self.run_install(&command);
            if outcome == InstallOutcome::Failed {
                warn!(package = %request.package, command, "dependency install failed");
            } else {
                debug!(package = %request.package, ?outcome, "dependency handled");
            }
            self.ledger.record_install(DependencyInstall {
                package: request.package.clone(),
                version: request.version.clone(),
                command,
                outcome,
            });
        }
        Ok(())
    }

    fn run_install(&self, command: &str) -> InstallOutcome {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.paths.root);
        let output = match run_with_timeout(
            cmd,
            None,
            Duration::from_secs(self.config.command_timeout_secs),
            self.config.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(_) => return InstallOutcome::Failed,
        };
        if output.timed_out || !output.status.success() {
            return InstallOutcome::Failed;
        }
        let text = output.render().to_lowercase();
        if text.contains("already installed") || text.contains("already present") {
            return InstallOutcome::AlreadyInstalled;
        }
        InstallOutcome::Success
    }

    /// The plan refinement loop. Fails with [`ValidationFailedError`] when
    /// the retry budget is exhausted without an acceptable plan.
    #[instrument(skip_all)]
    fn generate_code(&mut self) -> Result<()> {
        for iteration in 1..=self.config.max_plan_iterations {
            let result = validate_plan(&self.plan, &self.config.validation);
            let mut issues = result.issues.clone();

            // A dependency cycle blocks execution just like a hard issue.
            let order = match schedule::order(&self.plan.steps) {
                Ok(order) => Some(order),
                Err(cycle) => {
                    issues.push(cycle.to_string());
                    None
                }
            };

            if result.proceed && let Some(order) = order {
                info!(
                    iteration,
                    aggregate = result.aggregate,
                    levels = order.levels.len(),
                    "plan accepted"
                );
                if !order.parallel_groups.is_empty() {
                    debug!(groups = ?order.parallel_groups, "parallelizable step groups");
                }
                return Ok(());
            }

            self.state.plan_iterations = iteration;
            if iteration == self.config.max_plan_iterations {
                warn!(iteration, issues = issues.len(), "plan retry budget exhausted");
                return Err(ValidationFailedError { iterations: iteration, issues }.into());
            }

            info!(iteration, issues = issues.len(), "plan rejected, requesting refinement");
            self.phase = transition(self.phase, PhaseEvent::PlanRejected);
            self.persist_state(None)?;

            let request = PlanRequest {
                workdir: self.paths.root.clone(),
                task_id: self.plan.task_id.clone(),
                description: self.plan.description.clone(),
                issues,
                output_path: self
                    .paths
                    .scratch_dir
                    .join(format!("plan-attempt-{}.json", iteration + 1)),
                log_path: self
                    .paths
                    .scratch_dir
                    .join(format!("planner-{}.log", iteration + 1)),
                timeout: Duration::from_secs(self.config.command_timeout_secs),
                output_limit_bytes: self.config.output_limit_bytes,
            };
            let document = plan_and_load(self.planner, &request)
                .with_context(|| format!("refine plan (iteration {})", iteration + 1))?;
            self.plan = plan_from_value(&document)
                .with_context(|| format!("refined plan (iteration {})", iteration + 1))?;
            write_plan(&self.plan_path, &self.plan)?;
        }
        // Unreachable: max_plan_iterations >= 1 is enforced by config validation.
        Err(ValidationFailedError {
            iterations: 0,
            issues: vec!["no validation iterations executed".to_string()],
        }
        .into())
    }

    #[instrument(skip_all)]
    fn execute_steps(&mut self) -> Result<()> {
        let plan = self.plan.clone();
        let ctx = UnitContext {
            capability: self.capability,
            toolbox: &self.toolbox,
            engine: &self.engine,
            config: &self.config,
            scratch_dir: &self.paths.scratch_dir,
        };
        while let Some(unit) = cursor::current_unit(&plan, self.state.cursor) {
            let outcome = execute_unit(&plan, unit.step, unit.sub_step, &ctx, &mut self.ledger)?;
            info!(
                unit = %outcome.unit_id,
                iterations = outcome.iterations,
                "unit executed"
            );
            let (next, done) = cursor::advance(&plan, self.state.cursor);
            self.state.cursor = next;
            if !done {
                self.phase = transition(self.phase, PhaseEvent::UnitExecuted);
            }
            // Field-level persist; `ctx` holds borrows for the whole loop.
            self.state.phase = self.phase;
            self.state.last_error = None;
            write_run_state(&self.paths.run_state_path, &self.state)?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn run_tests(&mut self) -> Result<()> {
        let argv = &self.config.tests.command;
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&self.paths.root);
        info!(command = %argv.join(" "), "running tests");
        let output = run_with_timeout(
            cmd,
            None,
            Duration::from_secs(self.config.tests.timeout_secs),
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("spawn test command '{}'", argv.join(" ")))?;

        if output.timed_out {
            return Err(anyhow::anyhow!(
                "test command timed out after {}s",
                self.config.tests.timeout_secs
            ));
        }
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "test command failed with status {:?}:\n{}",
                output.status.code(),
                output.render()
            ));
        }
        self.tests_summary = Some(format!("`{}` passed", argv.join(" ")));
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit_changes(&mut self) -> Result<()> {
        if !self.ledger.has_file_changes() {
            info!("no file changes recorded, skipping commit");
            return Ok(());
        }
        self.git.add_all()?;
        let message = self.engine.render_commit_message(&self.plan, &self.ledger)?;
        let subject = message.lines().next().unwrap_or_default().to_string();
        match self.git.commit_staged(&message)? {
            Some(sha) => {
                info!(%sha, "changes committed");
                self.ledger.record_vcs(VcsOperation {
                    kind: VcsKind::Commit,
                    input: subject,
                    outcome: "committed".to_string(),
                    commit_id: Some(sha),
                });
            }
            None => {
                // Ledger entries without on-disk deltas (e.g. rewrites that
                // restored original contents) leave nothing staged.
                info!("nothing staged, skipping commit");
            }
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn create_pr(&mut self) -> Result<()> {
        self.git.push(&self.options.remote, &self.branch)?;
        self.ledger.record_vcs(VcsOperation {
            kind: VcsKind::Push,
            input: format!("{} {}", self.options.remote, self.branch),
            outcome: "pushed".to_string(),
            commit_id: None,
        });

        let body =
            self.engine
                .render_pr_body(&self.plan, &self.ledger, self.tests_summary.as_deref())?;
        fs::write(&self.paths.pr_body_path, &body)
            .with_context(|| format!("write {}", self.paths.pr_body_path.display()))?;
        info!(path = %self.paths.pr_body_path.display(), "pull request body composed");
        self.ledger.record_vcs(VcsOperation {
            kind: VcsKind::Pr,
            input: self.branch.clone(),
            outcome: "composed".to_string(),
            commit_id: None,
        });
        Ok(())
    }

    /// Write the terminal summary and run state. Scratch files are removed
    /// only on success; failed runs keep them for inspection.
    fn finish(mut self, status: RunStatus) -> Result<RunOutcome> {
        if status == RunStatus::Success {
            self.phases_completed.push(self.phase);
            self.phase = transition(self.phase, PhaseEvent::Finalized);
        }
        let last_error = match &status {
            RunStatus::Error { message, .. } => Some(message.clone()),
            RunStatus::ValidationFailed { issues } => Some(issues.join("; ")),
            RunStatus::Success => None,
        };
        self.persist_state(last_error)?;

        let summary = self
            .ledger
            .summary(status.clone(), self.phases_completed.clone());
        write_summary(&self.paths.summary_path, &summary)?;

        if status == RunStatus::Success && self.paths.scratch_dir.exists() {
            fs::remove_dir_all(&self.paths.scratch_dir)
                .with_context(|| format!("clean {}", self.paths.scratch_dir.display()))?;
        }

        info!(
            status = match &status {
                RunStatus::Success => "success",
                RunStatus::ValidationFailed { .. } => "validation_failed",
                RunStatus::Error { .. } => "error",
            },
            summary = %self.paths.summary_path.display(),
            "run finished"
        );
        Ok(RunOutcome {
            status,
            phases_completed: self.phases_completed,
            summary_path: self.paths.summary_path,
        })
    }
}

/// True when `resume_from` is already past `phase` in the happy path, so
/// the phase's side effects must not be repeated.
fn phase_done(resume_from: WorkflowPhase, phase: WorkflowPhase) -> bool {
    phase_rank(resume_from) > phase_rank(phase)
}

fn phase_rank(phase: WorkflowPhase) -> u8 {
    match phase {
        WorkflowPhase::Initialize => 0,
        WorkflowPhase::SetupBranch => 1,
        WorkflowPhase::InstallDependencies => 2,
        WorkflowPhase::GenerateCode => 3,
        WorkflowPhase::ExecuteStep => 4,
        WorkflowPhase::RunTests => 5,
        WorkflowPhase::CommitChanges => 6,
        WorkflowPhase::CreatePr => 7,
        WorkflowPhase::Finalize => 8,
        WorkflowPhase::Error => 9,
    }
}

fn install_command(request: &DependencyRequest) -> String {
    if let Some(command) = &request.command {
        return command.clone();
    }
    match &request.version {
        Some(version) => format!("cargo add {}@{}", request.package, version),
        None => format!("cargo add {}", request.package),
    }
}

fn new_run_id(task_id: &str) -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{task_id}-{seconds}")
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp summary {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace summary {}", path.display()))?;
    Ok(())
}
