//! Capability abstraction for model-backed planning and code generation.
//!
//! The [`Capability`] and [`Planner`] traits decouple the workflow driver
//! from the actual backend (currently `codex exec`). Tests use scripted
//! implementations that return predetermined replies without spawning
//! processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_with_timeout};
use crate::io::tools::ToolRequest;

/// One turn in the conversation sent to the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// A reply from the generation capability.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityReply {
    /// Tool invocations to execute before the next round-trip.
    ToolCalls(Vec<ToolRequest>),
    /// The unit is complete.
    Done { summary: String },
    /// Neither tool calls nor completion. Protocol violation upstream.
    Empty,
}

/// Wire shape of the capability's output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WireReply {
    ToolCalls {
        #[serde(default)]
        calls: Vec<ToolRequest>,
    },
    Done {
        #[serde(default)]
        summary: String,
    },
}

impl From<WireReply> for CapabilityReply {
    fn from(wire: WireReply) -> Self {
        match wire {
            WireReply::ToolCalls { calls } if calls.is_empty() => CapabilityReply::Empty,
            WireReply::ToolCalls { calls } => CapabilityReply::ToolCalls(calls),
            WireReply::Done { summary } => CapabilityReply::Done { summary },
        }
    }
}

/// Parameters for one capability round-trip.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    /// Working directory for the backend process.
    pub workdir: PathBuf,
    /// Full conversation so far, oldest first.
    pub conversation: Vec<Message>,
    /// Path where the backend must write its reply JSON.
    pub output_path: PathBuf,
    /// Path to write backend stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum time to wait for the backend to complete.
    pub timeout: Duration,
    /// Truncate backend output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over generation backends.
pub trait Capability {
    /// Run one round-trip. Must write the reply to `request.output_path`.
    fn respond(&self, request: &CapabilityRequest) -> Result<()>;
}

/// Parameters for a planning invocation.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub workdir: PathBuf,
    /// Task identifier the plan is for.
    pub task_id: String,
    /// Task description to plan against.
    pub description: String,
    /// Validation issues from the previous attempt, empty on the first.
    pub issues: Vec<String>,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over planning backends.
pub trait Planner {
    /// Produce a plan document. Must write plan JSON to `request.output_path`.
    fn propose_plan(&self, request: &PlanRequest) -> Result<()>;
}

/// Capability and planner backed by `codex exec`.
pub struct CodexBackend;

impl Capability for CodexBackend {
    #[instrument(skip_all, fields(turns = request.conversation.len(), timeout_secs = request.timeout.as_secs()))]
    fn respond(&self, request: &CapabilityRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting codex round-trip");
        let stdin = serde_json::to_vec(&request.conversation).context("serialize conversation")?;
        run_codex(
            &request.workdir,
            &stdin,
            &request.output_path,
            &request.log_path,
            request.timeout,
            request.output_limit_bytes,
        )
    }
}

impl Planner for CodexBackend {
    #[instrument(skip_all, fields(task_id = %request.task_id, issues = request.issues.len()))]
    fn propose_plan(&self, request: &PlanRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting codex planning");
        let conversation = vec![
            Message::system(
                "Produce an implementation plan as a single JSON document with \
                 task_id, description, and numbered steps.",
            ),
            Message::user(plan_prompt(&request.task_id, &request.description, &request.issues)),
        ];
        let stdin = serde_json::to_vec(&conversation).context("serialize planning conversation")?;
        run_codex(
            &request.workdir,
            &stdin,
            &request.output_path,
            &request.log_path,
            request.timeout,
            request.output_limit_bytes,
        )
    }
}

fn plan_prompt(task_id: &str, description: &str, issues: &[String]) -> String {
    let mut prompt = format!("Task {task_id}:\n{description}\n");
    if !issues.is_empty() {
        prompt.push_str("\nYour previous plan was rejected. Address every issue:\n");
        for issue in issues {
            prompt.push_str(&format!("- {issue}\n"));
        }
    }
    prompt
}

fn run_codex(
    workdir: &Path,
    stdin: &[u8],
    output_path: &Path,
    log_path: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }

    let mut cmd = Command::new("codex");
    cmd.arg("exec")
        .arg("--sandbox")
        .arg("workspace-write")
        .arg("--skip-git-repo-check")
        .arg("--output-last-message")
        .arg(output_path)
        .arg("-")
        .current_dir(workdir);

    let output = run_with_timeout(cmd, Some(stdin), timeout, output_limit_bytes)
        .context("run codex exec")?;
    write_backend_log(log_path, &output)?;

    if output.timed_out {
        warn!(timeout_secs = timeout.as_secs(), "codex exec timed out");
        return Err(anyhow!("codex exec timed out after {:?}", timeout));
    }
    if !output.status.success() {
        warn!(exit_code = ?output.status.code(), "codex exec failed");
        return Err(anyhow!(
            "codex exec failed with status {:?}",
            output.status.code()
        ));
    }

    debug!("codex exec completed");
    Ok(())
}

fn write_backend_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_lossy());
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_lossy());
    if output.truncated_bytes > 0 {
        buf.push_str(&format!("\n[truncated {} bytes]\n", output.truncated_bytes));
    }
    if output.timed_out {
        buf.push_str("\n[backend timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write backend log {}", path.display()))
}

/// Run one capability round-trip and load the parsed reply.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn respond_and_load<C: Capability>(
    capability: &C,
    request: &CapabilityRequest,
) -> Result<CapabilityReply> {
    capability.respond(request)?;
    let wire: WireReply = read_output_json(&request.output_path)?;
    let reply = CapabilityReply::from(wire);
    debug!(
        reply = match &reply {
            CapabilityReply::ToolCalls(calls) => format!("{} tool call(s)", calls.len()),
            CapabilityReply::Done { .. } => "done".to_string(),
            CapabilityReply::Empty => "empty".to_string(),
        },
        "parsed capability reply"
    );
    Ok(reply)
}

/// Run one planning invocation and load the raw plan document.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn plan_and_load<P: Planner>(planner: &P, request: &PlanRequest) -> Result<Value> {
    planner.propose_plan(request)?;
    read_output_json(&request.output_path)
}

fn read_output_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(anyhow!("missing backend output {}", path.display()));
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read backend output {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
