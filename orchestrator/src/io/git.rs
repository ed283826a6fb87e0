//! Git adapter for the orchestrator.
//!
//! The orchestrator issues a small set of well-defined operations and never
//! implements version-control primitives itself, so we keep an explicit
//! wrapper around `git` subprocess calls. Recoverable conditions (branch
//! already exists) are distinguished from fatal ones (rejected push) via
//! [`VcsOperationError::recoverable`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// A version-control operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOperationError {
    pub operation: String,
    pub message: String,
    /// True for conditions the driver may continue through.
    pub recoverable: bool,
}

impl fmt::Display for VcsOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for VcsOperationError {}

/// Result of ensuring the working branch exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSetup {
    Created,
    /// The branch already existed; the run continues on it.
    Reused,
}

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Return the current HEAD short SHA.
    pub fn head_short_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--short=12", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create and checkout the working branch, or checkout the existing one.
    ///
    /// "Branch already exists" is a non-fatal continuation, not an error.
    #[instrument(skip_all, fields(branch))]
    pub fn ensure_branch(&self, branch: &str) -> Result<BranchSetup> {
        if self.branch_exists(branch)? {
            debug!(branch, "branch exists, checking out");
            self.checkout(branch)?;
            return Ok(BranchSetup::Reused);
        }
        debug!(branch, "creating and checking out new branch");
        self.run_checked("checkout -b", &["checkout", "-b", branch])?;
        Ok(BranchSetup::Created)
    }

    /// Checkout an existing branch.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run_checked("checkout", &["checkout", branch])?;
        Ok(())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked("add", &["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes and return the resulting short sha.
    ///
    /// Returns `Ok(None)` when nothing is staged.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<Option<String>> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(None);
        }
        debug!("committing staged changes");
        self.run_checked("commit", &["commit", "-m", message])?;
        let sha = self.head_short_sha()?;
        Ok(Some(sha))
    }

    /// Push the branch, classifying rejected pushes as fatal.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<(), VcsOperationError> {
        let output = self
            .run(&["push", "--set-upstream", remote, branch])
            .map_err(|err| VcsOperationError {
                operation: "push".to_string(),
                message: format!("{err:#}"),
                recoverable: false,
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let rejected = stderr.contains("[rejected]") || stderr.contains("non-fast-forward");
        warn!(rejected, "git push failed");
        Err(VcsOperationError {
            operation: "push".to_string(),
            message: stderr.trim().to_string(),
            // A rejected push means the remote moved; retrying blindly
            // could clobber work, so both cases are fatal here.
            recoverable: false,
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args[0], args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, operation: &str, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsOperationError {
                operation: operation.to_string(),
                message: stderr.trim().to_string(),
                recoverable: false,
            }
            .into());
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo(root: &Path) -> Git {
        let git = Git::new(root);
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            git.run(&args).expect("git setup");
        }
        fs::write(root.join("seed.txt"), "seed\n").expect("seed");
        git.add_all().expect("add");
        git.commit_staged("init").expect("commit");
        git
    }

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(e.code, "??");
        assert_eq!(e.path, "foo.txt");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn ensure_branch_creates_then_reuses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(temp.path());

        assert_eq!(git.ensure_branch("task/T-1").expect("create"), BranchSetup::Created);
        git.checkout("main").expect("back to main");
        assert_eq!(git.ensure_branch("task/T-1").expect("reuse"), BranchSetup::Reused);
        assert_eq!(git.current_branch().expect("branch"), "task/T-1");
    }

    #[test]
    fn commit_staged_returns_short_sha() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(temp.path());

        fs::write(temp.path().join("a.txt"), "hello\n").expect("write");
        git.add_all().expect("add");
        let sha = git.commit_staged("add a.txt").expect("commit");
        assert!(sha.is_some());
        assert!(!sha.unwrap_or_default().is_empty());

        // Nothing staged now.
        assert_eq!(git.commit_staged("empty").expect("noop"), None);
    }

    #[test]
    fn push_without_remote_is_a_fatal_vcs_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(temp.path());
        let err = git.push("origin", "main").expect_err("no remote");
        assert!(!err.recoverable);
        assert_eq!(err.operation, "push");
    }
}
