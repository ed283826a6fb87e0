//! Orchestrator configuration stored under `.orchestrator/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::diff_guard::DiffGuardConfig;
use crate::core::validate::ValidationThresholds;

/// Orchestrator configuration (TOML).
///
/// Intended to be edited by humans and must remain stable and automatable.
/// Missing fields default to the source heuristics; none of the numeric
/// defaults carry deeper intent, which is exactly why they live here
/// instead of in code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Retry budget for the plan validation/refinement loop.
    pub max_plan_iterations: u32,

    /// Hard cap on capability round-trips for one unit of work.
    pub max_tool_iterations: u32,

    /// Per-tool shell command wall-clock budget in seconds.
    pub command_timeout_secs: u64,

    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Deny-listed command patterns, checked before any shell execution.
    pub command_deny_patterns: Vec<String>,

    pub validation: ValidationThresholds,

    pub diff_guard: DiffGuardConfig,

    pub tests: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    /// Command to execute for the run_tests phase (argv form).
    pub command: Vec<String>,
    /// Test phase wall-clock budget in seconds.
    pub timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "test".to_string()],
            timeout_secs: 30 * 60,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_plan_iterations: 3,
            max_tool_iterations: 25,
            command_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            command_deny_patterns: default_deny_patterns(),
            validation: ValidationThresholds::default(),
            diff_guard: DiffGuardConfig::default(),
            tests: TestConfig::default(),
        }
    }
}

/// Destructive shell patterns rejected before execution: recursive root
/// deletion, privilege escalation, world-writable permission grants, and
/// piping remote scripts into a shell interpreter.
fn default_deny_patterns() -> Vec<String> {
    [
        r"rm\s+(-[a-zA-Z]*\s+)*-[a-zA-Z]*[rf][a-zA-Z]*\s+/(\s|$)",
        r"rm\s+-rf\s+/",
        r"\bsudo\b",
        r"\bdoas\b",
        r"chmod\s+(-[a-zA-Z]+\s+)*777",
        r"(curl|wget)[^|]*\|\s*(ba|z|da)?sh",
        r"mkfs\.",
        r">\s*/dev/sd[a-z]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_plan_iterations == 0 {
            return Err(anyhow!("max_plan_iterations must be > 0"));
        }
        if self.max_tool_iterations == 0 {
            return Err(anyhow!("max_tool_iterations must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.validation.score_threshold) {
            return Err(anyhow!("validation.score_threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.diff_guard.max_fraction) {
            return Err(anyhow!("diff_guard.max_fraction must be in [0, 1]"));
        }
        if self.diff_guard.max_lines == 0 {
            return Err(anyhow!("diff_guard.max_lines must be > 0"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        for pattern in &self.command_deny_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| anyhow!("invalid deny pattern '{pattern}': {e}"))?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
