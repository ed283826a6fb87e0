//! Rendered artifacts: unit prompts, commit messages, and PR bodies.
//!
//! Everything the orchestrator sends outward (to the capability, to git, to
//! the code host) is composed here from the plan and the change ledger, so
//! the wording lives in templates rather than scattered format strings.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::ledger::{ChangeKind, ChangeLedger};
use crate::core::plan::{Plan, Step, SubStep};

const UNIT_TEMPLATE: &str = include_str!("templates/unit.md");
const COMMIT_TEMPLATE: &str = include_str!("templates/commit_message.md");
const PR_BODY_TEMPLATE: &str = include_str!("templates/pr_body.md");

#[derive(Debug, Clone, Serialize)]
struct StepContext {
    number: u32,
    title: String,
    description: String,
}

impl StepContext {
    fn from_step(step: &Step) -> Self {
        Self {
            number: step.step,
            title: step.title.clone(),
            description: step.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SubStepContext {
    id: String,
    title: String,
    description: String,
    files_affected: Vec<String>,
    verification: Option<String>,
}

impl SubStepContext {
    fn from_sub_step(sub_step: &SubStep) -> Self {
        Self {
            id: sub_step.sub_step.clone(),
            title: sub_step.title.clone(),
            description: sub_step.description.clone(),
            files_affected: sub_step.files_affected.clone(),
            verification: sub_step.verification.clone(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct ReportEngine {
    env: Environment<'static>,
}

impl Default for ReportEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("unit", UNIT_TEMPLATE)
            .expect("unit template should be valid");
        env.add_template("commit_message", COMMIT_TEMPLATE)
            .expect("commit message template should be valid");
        env.add_template("pr_body", PR_BODY_TEMPLATE)
            .expect("pr body template should be valid");
        Self { env }
    }

    /// Render the framing prompt for one unit of work.
    ///
    /// The prompt names exactly one step (and sub-step, when present); the
    /// contract section forbids work belonging to any other unit.
    pub fn render_unit_prompt(
        &self,
        plan: &Plan,
        step: &Step,
        sub_step: Option<&SubStep>,
        changed_files: &[String],
    ) -> Result<String> {
        let template = self.env.get_template("unit")?;
        let rendered = template
            .render(context! {
                task_id => plan.task_id,
                description => plan.description.trim(),
                step => StepContext::from_step(step),
                sub_step => sub_step.map(SubStepContext::from_sub_step),
                changed_files => (!changed_files.is_empty()).then_some(changed_files),
            })
            .context("render unit prompt")?;
        Ok(rendered)
    }

    /// Compose the commit message from the plan and recorded file changes.
    pub fn render_commit_message(&self, plan: &Plan, ledger: &ChangeLedger) -> Result<String> {
        let created = ledger.paths_with_kind(ChangeKind::Created);
        let modified = ledger.paths_with_kind(ChangeKind::Modified);
        let template = self.env.get_template("commit_message")?;
        let rendered = template
            .render(context! {
                task_id => plan.task_id,
                title => subject_line(&plan.description),
                description => plan.description.trim(),
                created => (!created.is_empty()).then_some(created),
                modified => (!modified.is_empty()).then_some(modified),
            })
            .context("render commit message")?;
        Ok(rendered)
    }

    /// Compose the pull request body from the plan, the ledger, and the test
    /// phase result.
    pub fn render_pr_body(
        &self,
        plan: &Plan,
        ledger: &ChangeLedger,
        tests_summary: Option<&str>,
    ) -> Result<String> {
        let created = ledger.paths_with_kind(ChangeKind::Created);
        let modified = ledger.paths_with_kind(ChangeKind::Modified);
        let steps: Vec<StepContext> = plan.steps.iter().map(StepContext::from_step).collect();
        let template = self.env.get_template("pr_body")?;
        let rendered = template
            .render(context! {
                task_id => plan.task_id,
                title => subject_line(&plan.description),
                description => plan.description.trim(),
                steps => steps,
                created => (!created.is_empty()).then_some(created),
                modified => (!modified.is_empty()).then_some(modified),
                tests_summary => tests_summary.map(str::trim).filter(|s| !s.is_empty()),
            })
            .context("render pr body")?;
        Ok(rendered)
    }
}

/// First line of the description, truncated to a conventional subject width.
fn subject_line(description: &str) -> String {
    const MAX: usize = 72;
    let line = description.lines().next().unwrap_or_default().trim();
    if line.len() <= MAX {
        return line.to_string();
    }
    let mut cut = MAX;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &line[..cut].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_with_steps, step, sub_step};

    fn sample_plan() -> Plan {
        let mut s = step(2, "Wire the adapter");
        s.description = "Connect the adapter to the registry".to_string();
        s.sub_steps = vec![sub_step("2.1", "Add the registry entry")];
        let mut plan = plan_with_steps("T-42", vec![step(1, "Scaffold"), s]);
        plan.description = "Add adapter support\n\nLonger context here.".to_string();
        plan
    }

    #[test]
    fn unit_prompt_names_only_the_current_sub_step() {
        let plan = sample_plan();
        let engine = ReportEngine::new();
        let rendered = engine
            .render_unit_prompt(&plan, &plan.steps[1], plan.steps[1].sub_steps.first(), &[])
            .expect("render");

        assert!(rendered.contains("Step 2: Wire the adapter"));
        assert!(rendered.contains("sub-step 2.1"));
        assert!(!rendered.contains("Scaffold"), "other steps stay out");
        assert!(rendered.contains("<contract>"));
    }

    #[test]
    fn unit_prompt_lists_previously_changed_files() {
        let plan = sample_plan();
        let engine = ReportEngine::new();
        let changed = vec!["src/registry.rs".to_string()];
        let rendered = engine
            .render_unit_prompt(&plan, &plan.steps[0], None, &changed)
            .expect("render");
        assert!(rendered.contains("src/registry.rs"));
    }

    #[test]
    fn commit_message_subject_is_first_description_line() {
        let plan = sample_plan();
        let mut ledger = ChangeLedger::new();
        ledger.record_file_change("src/a.rs", ChangeKind::Created);
        ledger.record_file_change("src/b.rs", ChangeKind::Modified);

        let engine = ReportEngine::new();
        let message = engine.render_commit_message(&plan, &ledger).expect("render");
        let first = message.lines().next().expect("subject");
        assert_eq!(first, "T-42: Add adapter support");
        assert!(message.contains("- src/a.rs"));
        assert!(message.contains("- src/b.rs"));
    }

    #[test]
    fn pr_body_checks_off_every_step() {
        let plan = sample_plan();
        let ledger = ChangeLedger::new();
        let engine = ReportEngine::new();
        let body = engine
            .render_pr_body(&plan, &ledger, Some("142 passed"))
            .expect("render");
        assert!(body.contains("- [x] Step 1: Scaffold"));
        assert!(body.contains("- [x] Step 2: Wire the adapter"));
        assert!(body.contains("142 passed"));
    }

    #[test]
    fn subject_line_truncates_on_char_boundary() {
        let long = "x".repeat(100);
        let subject = subject_line(&long);
        assert!(subject.len() <= 75);
        assert!(subject.ends_with("..."));
    }
}
