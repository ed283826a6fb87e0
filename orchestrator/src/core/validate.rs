//! Plan-quality scoring and the proceed/retry decision.
//!
//! Four independent sub-scores in `[0, 1]`, aggregated by arithmetic mean.
//! A plan proceeds only when the aggregate clears the configured threshold
//! AND no hard issue (missing required field, unresolved dependency
//! reference) was found. Thresholds are configuration, not constants: the
//! source values carry no documented derivation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::plan::Plan;

/// Tunable knobs for plan scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Minimum aggregate score required to proceed.
    pub score_threshold: f64,
    /// Step count above which the plan must enumerate at least one risk.
    pub risk_step_threshold: usize,
    /// Mean estimated hours per step above which effort is implausible.
    pub max_hours_per_step: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            risk_step_threshold: 5,
            max_hours_per_step: 40.0,
        }
    }
}

/// Outcome of scoring one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub completeness: f64,
    pub consistency: f64,
    pub effort: f64,
    pub risk_coverage: f64,
    pub aggregate: f64,
    /// All findings, hard and soft.
    pub issues: Vec<String>,
    /// Findings that block progress regardless of the aggregate score.
    pub hard_issues: Vec<String>,
    pub proceed: bool,
}

/// Plan quality stayed below threshold after exhausting the retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailedError {
    pub iterations: u32,
    pub issues: Vec<String>,
}

impl fmt::Display for ValidationFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan validation failed after {} iteration(s): {}",
            self.iterations,
            self.issues.join("; ")
        )
    }
}

impl std::error::Error for ValidationFailedError {}

/// Score `plan` against the quality dimensions.
pub fn validate_plan(plan: &Plan, thresholds: &ValidationThresholds) -> ValidationResult {
    let mut issues = Vec::new();
    let mut hard_issues = Vec::new();

    let completeness = score_completeness(plan, &mut issues, &mut hard_issues);
    let consistency = score_consistency(plan, &mut issues, &mut hard_issues);
    let effort = score_effort(plan, thresholds, &mut issues);
    let risk_coverage = score_risk_coverage(plan, thresholds, &mut issues);

    let aggregate = (completeness + consistency + effort + risk_coverage) / 4.0;
    let proceed = aggregate >= thresholds.score_threshold && hard_issues.is_empty();

    ValidationResult {
        completeness,
        consistency,
        effort,
        risk_coverage,
        aggregate,
        issues,
        hard_issues,
        proceed,
    }
}

fn score_completeness(plan: &Plan, issues: &mut Vec<String>, hard: &mut Vec<String>) -> f64 {
    let mut score = 1.0f64;

    if plan.task_id.trim().is_empty() {
        hard.push("missing required field: task_id".into());
        score -= 0.5;
    }
    if plan.description.trim().is_empty() {
        issues.push("plan has no description".into());
        score -= 0.1;
    }
    if plan.steps.is_empty() {
        hard.push("plan has no steps".into());
        return 0.0;
    }

    let mut untitled = 0usize;
    let mut undetailed = 0usize;
    for step in &plan.steps {
        if step.title.trim().is_empty() {
            untitled += 1;
        }
        if step.description.trim().is_empty() {
            undetailed += 1;
        }
    }
    if untitled > 0 {
        hard.push(format!("{untitled} step(s) missing required field: title"));
        score -= 0.3;
    }
    if undetailed > 0 {
        issues.push(format!("{undetailed} step(s) have no description"));
        score -= 0.1;
    }

    if !plan.steps.iter().any(|s| !s.sub_steps.is_empty()) {
        issues.push("no step declares any sub-step".into());
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}

fn score_consistency(plan: &Plan, issues: &mut Vec<String>, hard: &mut Vec<String>) -> f64 {
    let known: BTreeSet<u32> = plan.steps.iter().map(|s| s.step).collect();
    let mut score = 1.0f64;

    for step in &plan.steps {
        for dep in &step.depends_on {
            if !known.contains(dep) {
                hard.push(format!(
                    "step {} depends on unknown step {dep}",
                    step.step
                ));
                score -= 0.3;
            } else if *dep >= step.step {
                hard.push(format!(
                    "step {} depends on {dep}, which is not an earlier step",
                    step.step
                ));
                score -= 0.2;
            }
        }
    }

    if !plan.execution_order.is_empty() {
        if plan.execution_order.len() != plan.steps.len() {
            issues.push(format!(
                "execution_order lists {} step(s) but the plan has {}",
                plan.execution_order.len(),
                plan.steps.len()
            ));
            score -= 0.2;
        }
        for hint in &plan.execution_order {
            if !known.contains(hint) {
                issues.push(format!("execution_order names unknown step {hint}"));
                score -= 0.1;
            }
        }
    }

    score.clamp(0.0, 1.0)
}

fn score_effort(plan: &Plan, thresholds: &ValidationThresholds, issues: &mut Vec<String>) -> f64 {
    if plan.steps.len() < 2 {
        // Too small to judge proportionality.
        return 1.0;
    }
    let total: f64 = plan.steps.iter().map(|s| s.estimated_hours).sum();
    if total == 0.0 {
        issues.push("aggregate estimated effort is zero".into());
        return 0.4;
    }
    let per_step = total / plan.steps.len() as f64;
    if per_step > thresholds.max_hours_per_step {
        issues.push(format!(
            "estimated effort {per_step:.0}h/step is disproportionate to {} step(s)",
            plan.steps.len()
        ));
        return 0.4;
    }
    1.0
}

fn score_risk_coverage(
    plan: &Plan,
    thresholds: &ValidationThresholds,
    issues: &mut Vec<String>,
) -> f64 {
    if plan.steps.len() <= thresholds.risk_step_threshold {
        return 1.0;
    }
    if plan.risks.is_empty() {
        issues.push(format!(
            "{}-step plan enumerates no risks",
            plan.steps.len()
        ));
        return 0.0;
    }
    1.0
}
