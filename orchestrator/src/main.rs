//! Task execution orchestrator CLI.
//!
//! Drives one implementation plan (`.orchestrator/plan.json`) through the
//! full workflow, or runs individual checks (validate, order) against it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use orchestrator::core::ledger::RunStatus;
use orchestrator::core::schedule;
use orchestrator::core::validate::validate_plan;
use orchestrator::exit_codes;
use orchestrator::io::capability::CodexBackend;
use orchestrator::io::config::{OrchestratorConfig, load_config, write_config};
use orchestrator::io::plan_store::load_plan;
use orchestrator::logging;
use orchestrator::run::{OrchestratorPaths, RunOptions, run_workflow};

const V1_SCHEMA: &str = include_str!("../schemas/plan/v1.schema.json");

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Deterministic task execution orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the `.orchestrator/` layout, default config, and plan schema.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a plan against the schema, invariants, and quality thresholds.
    Validate {
        /// Plan document; defaults to `.orchestrator/plan.json`.
        plan: Option<PathBuf>,
    },
    /// Print the dependency-derived execution order for a plan.
    Order {
        /// Plan document; defaults to `.orchestrator/plan.json`.
        plan: Option<PathBuf>,
    },
    /// Execute the full workflow for the plan in the current workspace.
    Run {
        /// Plan document; defaults to `.orchestrator/plan.json`.
        plan: Option<PathBuf>,
        /// Workspace root; defaults to the current directory.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Working branch; defaults to `task/<task_id>`.
        #[arg(long)]
        branch: Option<String>,
        /// Remote to push to.
        #[arg(long, default_value = "origin")]
        remote: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Validate { plan } => cmd_validate(plan.as_deref()),
        Command::Order { plan } => cmd_order(plan.as_deref()),
        Command::Run {
            plan,
            root,
            branch,
            remote,
        } => cmd_run(root, plan, branch, remote),
    }
}

fn default_plan_path() -> PathBuf {
    PathBuf::from(".orchestrator/plan.json")
}

fn cmd_init(force: bool) -> Result<i32> {
    let paths = OrchestratorPaths::new(Path::new("."));
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create {}", paths.state_dir.display()))?;
    fs::create_dir_all("schemas/plan").context("create schema directory")?;

    let schema_path = Path::new("schemas/plan/v1.schema.json");
    if force || !schema_path.exists() {
        fs::write(schema_path, V1_SCHEMA).context("write v1 plan schema")?;
    }
    if force || !paths.config_path.exists() {
        write_config(&paths.config_path, &OrchestratorConfig::default())?;
    }
    println!("initialized {}", paths.root.join(".orchestrator").display());
    Ok(exit_codes::OK)
}

fn cmd_validate(plan_path: Option<&Path>) -> Result<i32> {
    let plan_path = plan_path.map(Path::to_path_buf).unwrap_or_else(default_plan_path);
    let config = load_config(&OrchestratorPaths::new(Path::new(".")).config_path)?;
    let plan = load_plan(&plan_path)?;
    let result = validate_plan(&plan, &config.validation);

    let mut payload = serde_json::to_string_pretty(&result).context("serialize result")?;
    payload.push('\n');
    print!("{payload}");

    if result.proceed {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::VALIDATION_FAILED)
    }
}

fn cmd_order(plan_path: Option<&Path>) -> Result<i32> {
    let plan_path = plan_path.map(Path::to_path_buf).unwrap_or_else(default_plan_path);
    let plan = load_plan(&plan_path)?;
    match schedule::order(&plan.steps) {
        Ok(order) => {
            for (idx, level) in order.levels.iter().enumerate() {
                let steps: Vec<String> = level.iter().map(u32::to_string).collect();
                println!("level {}: {}", idx + 1, steps.join(", "));
            }
            if !order.parallel_groups.is_empty() {
                println!("parallelizable groups: {:?}", order.parallel_groups);
            }
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::CYCLE)
        }
    }
}

fn cmd_run(
    root: Option<PathBuf>,
    plan: Option<PathBuf>,
    branch: Option<String>,
    remote: String,
) -> Result<i32> {
    let root = root.unwrap_or_else(|| PathBuf::from("."));
    let options = RunOptions {
        plan_path: plan,
        branch,
        remote,
    };
    let backend = CodexBackend;
    let outcome = run_workflow(&root, &backend, &backend, &options)?;
    println!("summary: {}", outcome.summary_path.display());
    match outcome.status {
        RunStatus::Success => Ok(exit_codes::OK),
        RunStatus::ValidationFailed { issues } => {
            for issue in issues {
                eprintln!("- {issue}");
            }
            Ok(exit_codes::VALIDATION_FAILED)
        }
        RunStatus::Error { phase, message } => {
            eprintln!("run failed in {phase}: {message}");
            Ok(exit_codes::INVALID)
        }
    }
}
