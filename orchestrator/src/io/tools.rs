//! Sandboxed tool dispatch for the generation capability.
//!
//! Tool kinds are a closed enum: an unknown tool name fails at
//! deserialization, and dispatch is exhaustive, so there is no runtime
//! default branch to fall through. Every path in every invocation is
//! forcibly pinned under the orchestrator-supplied working root, regardless
//! of what the capability asks for: absolute paths are re-rooted and
//! parent traversal is rejected.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::diff_guard::{DiffGuardConfig, validate_edit};
use crate::core::ledger::{ChangeKind, ChangeLedger};
use crate::io::config::OrchestratorConfig;
use crate::io::process::run_with_timeout;

fn default_true() -> bool {
    true
}

/// A tool invocation requested by the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    ReadFile {
        path: String,
        #[serde(default)]
        start_line: Option<usize>,
        #[serde(default)]
        end_line: Option<usize>,
    },
    WriteFile {
        path: String,
        content: String,
        #[serde(default = "default_true")]
        create_dirs: bool,
    },
    EditFile {
        path: String,
        old_str: String,
        new_str: String,
        #[serde(default)]
        replace_all: bool,
    },
    ListFiles {
        #[serde(default)]
        dir: String,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        recursive: bool,
    },
    GrepSearch {
        pattern: String,
        #[serde(default)]
        dir: String,
        #[serde(default)]
        file_pattern: Option<String>,
        #[serde(default = "default_true")]
        case_sensitive: bool,
        #[serde(default)]
        context_lines: usize,
    },
    CreateDirectory {
        dir: String,
        #[serde(default)]
        mode: Option<u32>,
    },
    ExecuteCommand {
        command: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default = "default_true")]
        capture_output: bool,
    },
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::ReadFile { .. } => "read_file",
            ToolRequest::WriteFile { .. } => "write_file",
            ToolRequest::EditFile { .. } => "edit_file",
            ToolRequest::ListFiles { .. } => "list_files",
            ToolRequest::GrepSearch { .. } => "grep_search",
            ToolRequest::CreateDirectory { .. } => "create_directory",
            ToolRequest::ExecuteCommand { .. } => "execute_command",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Status envelope returned for every tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub message: String,
    #[serde(default)]
    pub payload: Option<String>,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            payload: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            payload: Some(payload.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// The fixed tool set bound to one sandboxed working root.
pub struct Toolbox {
    root: PathBuf,
    diff_guard: DiffGuardConfig,
    command_timeout: Duration,
    output_limit_bytes: usize,
    deny: Vec<Regex>,
}

impl Toolbox {
    pub fn new(root: impl Into<PathBuf>, config: &OrchestratorConfig) -> Result<Self> {
        let mut deny = Vec::with_capacity(config.command_deny_patterns.len());
        for pattern in &config.command_deny_patterns {
            deny.push(
                Regex::new(pattern).with_context(|| format!("compile deny pattern '{pattern}'"))?,
            );
        }
        Ok(Self {
            root: root.into(),
            diff_guard: config.diff_guard,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            deny,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute one tool request against the sandbox.
    ///
    /// Recoverable tool failures come back as an error envelope so the
    /// capability can retry within the same unit. The only hard error is a
    /// diff-safety violation, which must abort the unit.
    #[instrument(skip_all, fields(tool = request.name()))]
    pub fn dispatch(&self, request: &ToolRequest, ledger: &mut ChangeLedger) -> Result<ToolOutcome> {
        let outcome = match request {
            ToolRequest::ReadFile {
                path,
                start_line,
                end_line,
            } => self.read_file(path, *start_line, *end_line),
            ToolRequest::WriteFile {
                path,
                content,
                create_dirs,
            } => self.write_file(path, content, *create_dirs, ledger),
            ToolRequest::EditFile {
                path,
                old_str,
                new_str,
                replace_all,
            } => return self.edit_file(path, old_str, new_str, *replace_all, ledger),
            ToolRequest::ListFiles {
                dir,
                pattern,
                recursive,
            } => self.list_files(dir, pattern.as_deref(), *recursive),
            ToolRequest::GrepSearch {
                pattern,
                dir,
                file_pattern,
                case_sensitive,
                context_lines,
            } => self.grep_search(
                pattern,
                dir,
                file_pattern.as_deref(),
                *case_sensitive,
                *context_lines,
            ),
            ToolRequest::CreateDirectory { dir, mode } => self.create_directory(dir, *mode),
            ToolRequest::ExecuteCommand {
                command,
                timeout_secs,
                capture_output,
            } => self.execute_command(command, *timeout_secs, *capture_output),
        };
        Ok(outcome)
    }

    /// Pin a capability-supplied path under the sandbox root.
    ///
    /// Absolute paths are re-rooted; `..` components are rejected outright
    /// rather than resolved, so there is no way to name anything outside
    /// the root.
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let mut rel = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => rel.push(part),
                Component::ParentDir => {
                    return Err(format!("path '{raw}' escapes the working root"));
                }
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            }
        }
        Ok(self.root.join(rel))
    }

    fn read_file(
        &self,
        path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> ToolOutcome {
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(msg) => return ToolOutcome::error(msg),
        };
        let contents = match fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(err) => return ToolOutcome::error(format!("read {path}: {err}")),
        };

        let start = start_line.unwrap_or(1).max(1);
        let mut numbered = String::new();
        let mut shown = 0usize;
        for (idx, line) in contents.lines().enumerate() {
            let lineno = idx + 1;
            if lineno < start {
                continue;
            }
            if let Some(end) = end_line
                && lineno > end
            {
                break;
            }
            numbered.push_str(&format!("{lineno:>6}\t{line}\n"));
            shown += 1;
        }
        ToolOutcome::ok_with(format!("read {path} ({shown} line(s))"), numbered)
    }

    fn write_file(
        &self,
        path: &str,
        content: &str,
        create_dirs: bool,
        ledger: &mut ChangeLedger,
    ) -> ToolOutcome {
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(msg) => return ToolOutcome::error(msg),
        };
        let existed = resolved.exists();
        if create_dirs
            && let Some(parent) = resolved.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            return ToolOutcome::error(format!("create parent of {path}: {err}"));
        }
        if let Err(err) = fs::write(&resolved, content) {
            return ToolOutcome::error(format!("write {path}: {err}"));
        }
        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        };
        ledger.record_file_change(path, kind);
        debug!(path, ?kind, bytes = content.len(), "file written");
        ToolOutcome::ok(format!("wrote {path} ({} bytes)", content.len()))
    }

    fn edit_file(
        &self,
        path: &str,
        old_str: &str,
        new_str: &str,
        replace_all: bool,
        ledger: &mut ChangeLedger,
    ) -> Result<ToolOutcome> {
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(msg) => return Ok(ToolOutcome::error(msg)),
        };
        let contents = match fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(err) => return Ok(ToolOutcome::error(format!("read {path}: {err}"))),
        };

        // The rewrite guard runs before any write and is never bypassed.
        if let Err(violation) = validate_edit(old_str, &contents, &self.diff_guard) {
            warn!(path, %violation, "edit rejected");
            return Err(violation.into());
        }

        let occurrences = contents.matches(old_str).count();
        if occurrences == 0 {
            return Ok(ToolOutcome::error(format!(
                "old_str not found in {path}; read the file and try again"
            )));
        }
        let (updated, replaced) = if replace_all {
            (contents.replace(old_str, new_str), occurrences)
        } else {
            (contents.replacen(old_str, new_str, 1), 1)
        };
        if let Err(err) = fs::write(&resolved, updated) {
            return Ok(ToolOutcome::error(format!("write {path}: {err}")));
        }
        ledger.record_file_change(path, ChangeKind::Modified);
        debug!(path, replaced, "file edited");
        Ok(ToolOutcome::ok(format!(
            "edited {path} ({replaced} replacement(s))"
        )))
    }

    fn list_files(&self, dir: &str, pattern: Option<&str>, recursive: bool) -> ToolOutcome {
        let resolved = match self.resolve(dir) {
            Ok(p) => p,
            Err(msg) => return ToolOutcome::error(msg),
        };
        let matcher = match pattern.map(glob_to_regex).transpose() {
            Ok(m) => m,
            Err(msg) => return ToolOutcome::error(msg),
        };

        let mut paths = Vec::new();
        if let Err(err) = collect_files(&resolved, recursive, &mut paths) {
            return ToolOutcome::error(format!("list {dir}: {err}"));
        }
        let mut names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.strip_prefix(&self.root).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|name| {
                matcher.as_ref().is_none_or(|re| {
                    let base = name.rsplit('/').next().unwrap_or(name);
                    re.is_match(base)
                })
            })
            .collect();
        names.sort();

        ToolOutcome::ok_with(format!("{} file(s)", names.len()), names.join("\n"))
    }

    fn grep_search(
        &self,
        pattern: &str,
        dir: &str,
        file_pattern: Option<&str>,
        case_sensitive: bool,
        context_lines: usize,
    ) -> ToolOutcome {
        const MAX_MATCHES: usize = 200;

        let resolved = match self.resolve(dir) {
            Ok(p) => p,
            Err(msg) => return ToolOutcome::error(msg),
        };
        let re = match RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(re) => re,
            Err(err) => return ToolOutcome::error(format!("invalid pattern: {err}")),
        };
        let file_matcher = match file_pattern.map(glob_to_regex).transpose() {
            Ok(m) => m,
            Err(msg) => return ToolOutcome::error(msg),
        };

        let mut paths = Vec::new();
        if let Err(err) = collect_files(&resolved, true, &mut paths) {
            return ToolOutcome::error(format!("search {dir}: {err}"));
        }
        paths.sort();

        let mut out = String::new();
        let mut matches = 0usize;
        'files: for path in &paths {
            let name = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            if let Some(fm) = &file_matcher {
                let base = name.rsplit('/').next().unwrap_or(&name);
                if !fm.is_match(base) {
                    continue;
                }
            }
            let Ok(contents) = fs::read_to_string(path) else {
                continue; // binary or unreadable
            };
            let lines: Vec<&str> = contents.lines().collect();
            for (idx, line) in lines.iter().enumerate() {
                if !re.is_match(line) {
                    continue;
                }
                let from = idx.saturating_sub(context_lines);
                let to = (idx + context_lines).min(lines.len().saturating_sub(1));
                for (ctx_idx, ctx_line) in lines.iter().enumerate().take(to + 1).skip(from) {
                    let marker = if ctx_idx == idx { ':' } else { '-' };
                    out.push_str(&format!("{name}{marker}{}{marker} {ctx_line}\n", ctx_idx + 1));
                }
                matches += 1;
                if matches >= MAX_MATCHES {
                    out.push_str("[match limit reached]\n");
                    break 'files;
                }
            }
        }

        ToolOutcome::ok_with(format!("{matches} match(es)"), out)
    }

    fn create_directory(&self, dir: &str, mode: Option<u32>) -> ToolOutcome {
        let resolved = match self.resolve(dir) {
            Ok(p) => p,
            Err(msg) => return ToolOutcome::error(msg),
        };
        if let Err(err) = fs::create_dir_all(&resolved) {
            return ToolOutcome::error(format!("create {dir}: {err}"));
        }
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            if let Err(err) = fs::set_permissions(&resolved, fs::Permissions::from_mode(mode)) {
                return ToolOutcome::error(format!("set mode on {dir}: {err}"));
            }
        }
        #[cfg(not(unix))]
        let _ = mode;
        ToolOutcome::ok(format!("created {dir}"))
    }

    fn execute_command(
        &self,
        command: &str,
        timeout_secs: Option<u64>,
        capture_output: bool,
    ) -> ToolOutcome {
        if let Some(pattern) = self.deny.iter().find(|re| re.is_match(command)) {
            warn!(command, pattern = pattern.as_str(), "command rejected by safety policy");
            return ToolOutcome::error(format!(
                "command rejected by safety policy (matched '{}')",
                pattern.as_str()
            ));
        }

        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.command_timeout)
            .min(self.command_timeout);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.root);
        let output = match run_with_timeout(cmd, None, timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => return ToolOutcome::error(format!("spawn '{command}': {err:#}")),
        };

        if output.timed_out {
            return ToolOutcome::error(format!(
                "command timed out after {}s",
                timeout.as_secs()
            ));
        }
        let rendered = if capture_output {
            Some(output.render())
        } else {
            None
        };
        if output.status.success() {
            let mut ok = ToolOutcome::ok("command succeeded");
            ok.payload = rendered;
            ok
        } else {
            ToolOutcome {
                status: ToolStatus::Error,
                message: format!("command exited with {:?}", output.status.code()),
                payload: rendered,
            }
        }
    }
}

/// Translate a shell-style glob (`*`, `?`) into an anchored regex over file
/// base names.
fn glob_to_regex(glob: &str) -> Result<Regex, String> {
    let mut pattern = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|err| format!("invalid glob '{glob}': {err}"))
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, true, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff_guard::DiffSafetyViolation;

    fn toolbox(root: &Path) -> Toolbox {
        Toolbox::new(root, &OrchestratorConfig::default()).expect("toolbox")
    }

    #[test]
    fn write_then_read_round_trips_with_line_numbers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();

        let out = tb
            .dispatch(
                &ToolRequest::WriteFile {
                    path: "src/lib.rs".into(),
                    content: "fn a() {}\nfn b() {}\n".into(),
                    create_dirs: true,
                },
                &mut ledger,
            )
            .expect("dispatch");
        assert!(out.is_success());

        let out = tb
            .dispatch(
                &ToolRequest::ReadFile {
                    path: "src/lib.rs".into(),
                    start_line: None,
                    end_line: None,
                },
                &mut ledger,
            )
            .expect("dispatch");
        let payload = out.payload.expect("payload");
        assert!(payload.contains("     1\tfn a() {}"));
        assert!(payload.contains("     2\tfn b() {}"));
    }

    #[test]
    fn write_records_created_then_modified_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();

        for content in ["one", "two"] {
            tb.dispatch(
                &ToolRequest::WriteFile {
                    path: "notes.txt".into(),
                    content: content.into(),
                    create_dirs: true,
                },
                &mut ledger,
            )
            .expect("dispatch");
        }
        assert_eq!(ledger.file_changes().len(), 1);
        assert_eq!(ledger.file_changes()[0].kind, ChangeKind::Created);
    }

    #[test]
    fn absolute_and_parent_paths_cannot_escape_the_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();

        // Absolute path is re-rooted inside the sandbox.
        tb.dispatch(
            &ToolRequest::WriteFile {
                path: "/etc/passwd".into(),
                content: "x".into(),
                create_dirs: true,
            },
            &mut ledger,
        )
        .expect("dispatch");
        assert!(temp.path().join("etc/passwd").exists());

        // Parent traversal is rejected.
        let out = tb
            .dispatch(
                &ToolRequest::ReadFile {
                    path: "../outside.txt".into(),
                    start_line: None,
                    end_line: None,
                },
                &mut ledger,
            )
            .expect("dispatch");
        assert!(!out.is_success());
        assert!(out.message.contains("escapes the working root"));
    }

    #[test]
    fn edit_replaces_first_occurrence_only_by_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();
        fs::write(temp.path().join("f.txt"), "x xx x xx tail padding").expect("seed");

        let out = tb
            .dispatch(
                &ToolRequest::EditFile {
                    path: "f.txt".into(),
                    old_str: "xx".into(),
                    new_str: "yy".into(),
                    replace_all: false,
                },
                &mut ledger,
            )
            .expect("dispatch");
        assert!(out.is_success());
        let contents = fs::read_to_string(temp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "x yy x xx tail padding");
        assert_eq!(ledger.file_changes()[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn oversized_edit_is_a_hard_error_not_an_envelope() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();
        fs::write(temp.path().join("f.txt"), "abcdefghij").expect("seed");

        let err = tb
            .dispatch(
                &ToolRequest::EditFile {
                    path: "f.txt".into(),
                    old_str: "abcdefgh".into(), // 80% of the file
                    new_str: "zz".into(),
                    replace_all: false,
                },
                &mut ledger,
            )
            .expect_err("diff guard");
        assert!(err.downcast_ref::<DiffSafetyViolation>().is_some());
        assert!(ledger.file_changes().is_empty());
    }

    #[test]
    fn missing_old_str_is_a_recoverable_envelope() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();
        fs::write(temp.path().join("f.txt"), "some longer body of text here").expect("seed");

        let out = tb
            .dispatch(
                &ToolRequest::EditFile {
                    path: "f.txt".into(),
                    old_str: "absent".into(),
                    new_str: "x".into(),
                    replace_all: false,
                },
                &mut ledger,
            )
            .expect("recoverable");
        assert!(!out.is_success());
        assert!(out.message.contains("not found"));
    }

    #[test]
    fn list_files_filters_by_glob_recursively() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();
        fs::create_dir_all(temp.path().join("src/deep")).expect("dirs");
        fs::write(temp.path().join("src/a.rs"), "").expect("seed");
        fs::write(temp.path().join("src/deep/b.rs"), "").expect("seed");
        fs::write(temp.path().join("src/c.txt"), "").expect("seed");

        let out = tb
            .dispatch(
                &ToolRequest::ListFiles {
                    dir: "src".into(),
                    pattern: Some("*.rs".into()),
                    recursive: true,
                },
                &mut ledger,
            )
            .expect("dispatch");
        let payload = out.payload.expect("payload");
        assert!(payload.contains("src/a.rs"));
        assert!(payload.contains("src/deep/b.rs"));
        assert!(!payload.contains("c.txt"));
    }

    #[test]
    fn grep_search_reports_context_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();
        fs::write(temp.path().join("f.txt"), "alpha\nneedle\nomega\n").expect("seed");

        let out = tb
            .dispatch(
                &ToolRequest::GrepSearch {
                    pattern: "NEEDLE".into(),
                    dir: String::new(),
                    file_pattern: None,
                    case_sensitive: false,
                    context_lines: 1,
                },
                &mut ledger,
            )
            .expect("dispatch");
        let payload = out.payload.expect("payload");
        assert!(payload.contains("f.txt:2: needle"));
        assert!(payload.contains("f.txt-1- alpha"));
        assert!(payload.contains("f.txt-3- omega"));
    }

    #[test]
    fn deny_listed_command_is_refused_before_spawning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();

        let out = tb
            .dispatch(
                &ToolRequest::ExecuteCommand {
                    command: "sudo rm -rf /".into(),
                    timeout_secs: None,
                    capture_output: true,
                },
                &mut ledger,
            )
            .expect("dispatch");
        assert!(!out.is_success());
        assert!(out.message.contains("safety policy"));
    }

    #[test]
    fn execute_command_runs_in_the_sandbox_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tb = toolbox(temp.path());
        let mut ledger = ChangeLedger::new();

        let out = tb
            .dispatch(
                &ToolRequest::ExecuteCommand {
                    command: "pwd".into(),
                    timeout_secs: Some(5),
                    capture_output: true,
                },
                &mut ledger,
            )
            .expect("dispatch");
        assert!(out.is_success());
        let payload = out.payload.expect("payload");
        let canonical = temp.path().canonicalize().expect("canonicalize");
        assert!(payload.trim().ends_with(
            canonical
                .file_name()
                .and_then(|n| n.to_str())
                .expect("dir name")
        ));
    }

    #[test]
    fn unknown_tool_name_fails_at_deserialization() {
        let raw = serde_json::json!({"tool": "rocket_launch", "path": "x"});
        let parsed: Result<ToolRequest, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }
}
