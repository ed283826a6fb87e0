//! Idempotent ledger of file changes, dependency installs, and
//! version-control operations for one run.
//!
//! Append-only, but idempotent on path for file changes: a path already
//! recorded is never duplicated or re-classified. The ledger is the single
//! source for the run summary, commit messages, and PR descriptions, so its
//! outputs must stay deterministic (lexicographic path order).

use serde::{Deserialize, Serialize};

use crate::core::phase::WorkflowPhase;

/// How a path entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    Success,
    Failed,
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInstall {
    pub package: String,
    pub version: Option<String>,
    pub command: String,
    pub outcome: InstallOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsKind {
    BranchCreate,
    Commit,
    Push,
    Pr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsOperation {
    pub kind: VcsKind,
    /// Operation input (branch name, commit message subject, remote, ...).
    pub input: String,
    pub outcome: String,
    /// Resulting identifier for commits (short sha).
    #[serde(default)]
    pub commit_id: Option<String>,
}

/// The run ledger. Owned exclusively by the orchestrator for one task run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLedger {
    file_changes: Vec<FileChange>,
    installs: Vec<DependencyInstall>,
    vcs_ops: Vec<VcsOperation>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file change. No-op when the path is already tracked; the
    /// first classification wins.
    pub fn record_file_change(&mut self, path: &str, kind: ChangeKind) {
        if self.file_changes.iter().any(|c| c.path == path) {
            return;
        }
        self.file_changes.push(FileChange {
            path: path.to_string(),
            kind,
        });
    }

    pub fn record_install(&mut self, install: DependencyInstall) {
        self.installs.push(install);
    }

    pub fn record_vcs(&mut self, op: VcsOperation) {
        self.vcs_ops.push(op);
    }

    pub fn file_changes(&self) -> &[FileChange] {
        &self.file_changes
    }

    pub fn installs(&self) -> &[DependencyInstall] {
        &self.installs
    }

    pub fn vcs_ops(&self) -> &[VcsOperation] {
        &self.vcs_ops
    }

    /// Paths recorded with the given kind, sorted for deterministic output.
    pub fn paths_with_kind(&self, kind: ChangeKind) -> Vec<String> {
        let mut paths: Vec<String> = self
            .file_changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// True if anything worth committing was recorded.
    pub fn has_file_changes(&self) -> bool {
        !self.file_changes.is_empty()
    }

    pub fn summary(&self, status: RunStatus, phases_completed: Vec<WorkflowPhase>) -> RunSummary {
        RunSummary {
            status,
            phases_completed,
            files_created: self.paths_with_kind(ChangeKind::Created),
            files_modified: self.paths_with_kind(ChangeKind::Modified),
            installs: self.installs.clone(),
            vcs_ops: self.vcs_ops.clone(),
        }
    }
}

/// Terminal status of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunStatus {
    Success,
    ValidationFailed { issues: Vec<String> },
    Error { phase: String, message: String },
}

/// Persisted end-of-run report (`.orchestrator/state/summary.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub phases_completed: Vec<WorkflowPhase>,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub installs: Vec<DependencyInstall>,
    pub vcs_ops: Vec<VcsOperation>,
}
