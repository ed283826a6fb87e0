//! Persisted run bookkeeping (`.orchestrator/state/run_state.json`).
//!
//! The cursor and phase are written after every unit of work, so a crash or
//! external pause resumes from here without redoing completed units.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::cursor::Cursor;
use crate::core::phase::WorkflowPhase;

/// Persisted bookkeeping for the current run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    /// Identifier for the current execution run.
    pub run_id: Option<String>,
    /// Current workflow phase.
    pub phase: WorkflowPhase,
    /// Position of the next unit of work.
    pub cursor: Cursor,
    /// Plan validation attempts consumed so far.
    pub plan_iterations: u32,
    /// Terminal error reason, when the run ended in `error`.
    pub last_error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            phase: WorkflowPhase::Initialize,
            cursor: Cursor::default(),
            plan_iterations: 0,
            last_error: None,
        }
    }
}

/// Load run state from disk.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    debug!(path = %path.display(), "loading run state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    debug!(run_id = ?state.run_id, phase = state.phase.as_str(), "run state loaded");
    Ok(state)
}

/// Load run state, or the default when no file exists yet.
pub fn load_or_default_run_state(path: &Path) -> Result<RunState> {
    if path.exists() {
        return load_run_state(path);
    }
    Ok(RunState::default())
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(path = %path.display(), phase = state.phase.as_str(), cursor = ?state.cursor, "writing run state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}
