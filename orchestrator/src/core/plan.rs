//! Canonical plan model and the boundary normalization adapter.
//!
//! Planning capabilities have historically emitted several shapes for the
//! same data (steps nested under a `plan` key, `substeps` vs `sub_steps`,
//! stringly-typed step numbers). All of that is resolved here, once, at the
//! boundary: business logic only ever sees the canonical [`Plan`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task priority as declared at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A unit of work handed to the orchestrator. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// A dependency the plan asks to have installed before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRequest {
    pub package: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Install command; defaults are derived by the driver when absent.
    #[serde(default)]
    pub command: Option<String>,
}

/// One ordered sub-step within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStep {
    /// Identifier scoped to the parent step, e.g. `"2.1"`.
    pub sub_step: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files_affected: Vec<String>,
    #[serde(default)]
    pub verification: Option<String>,
}

/// One ordered step of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based sequence number, unique and monotonically increasing.
    pub step: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-form category tag ("backend", "frontend", "integration", ...).
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub depends_on: Vec<u32>,
    #[serde(default)]
    pub sub_steps: Vec<SubStep>,
}

/// The hierarchical decomposition of a task. Produced by an external
/// planning capability and treated as read-only input after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    /// Declared execution-order hints (step numbers). Advisory; the
    /// scheduler derives the real order from `depends_on`.
    #[serde(default)]
    pub execution_order: Vec<u32>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRequest>,
}

impl Plan {
    /// Total number of units of work: one per sub-step, with a step without
    /// sub-steps counting as a single atomic unit.
    pub fn unit_count(&self) -> usize {
        self.steps.iter().map(step_unit_count).sum()
    }
}

/// Units of work contained in one step (at least 1).
pub fn step_unit_count(step: &Step) -> usize {
    step.sub_steps.len().max(1)
}

/// Normalize a raw plan document into its canonical v1 shape.
///
/// Accepted legacy variants:
/// - the whole plan nested under a top-level `plan` key
/// - `substeps` instead of `sub_steps`
/// - `step`, `depends_on` entries and `sub_step` ids as JSON strings/numbers
///
/// Returns a canonical [`Value`] suitable for schema validation; shape
/// branching never leaks past this function.
pub fn normalize_plan_document(raw: &Value) -> Result<Value, String> {
    let body = match raw.get("plan") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };
    let obj = body
        .as_object()
        .ok_or_else(|| "plan document must be a JSON object".to_string())?;

    let mut out = serde_json::Map::new();
    let task_id = obj
        .get("task_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'task_id'".to_string())?;
    out.insert("task_id".into(), Value::String(task_id.to_string()));
    out.insert(
        "description".into(),
        Value::String(
            obj.get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    );

    let steps = obj
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing 'steps' array".to_string())?;
    let mut norm_steps = Vec::with_capacity(steps.len());
    for (idx, step) in steps.iter().enumerate() {
        norm_steps.push(normalize_step(step, idx)?);
    }
    out.insert("steps".into(), Value::Array(norm_steps));

    if let Some(order) = obj.get("execution_order").and_then(Value::as_array) {
        let mut norm = Vec::with_capacity(order.len());
        for entry in order {
            norm.push(Value::from(
                coerce_step_number(entry).ok_or_else(|| {
                    format!("execution_order entry {entry} is not a step number")
                })?,
            ));
        }
        out.insert("execution_order".into(), Value::Array(norm));
    }
    if let Some(risks) = obj.get("risks").cloned() {
        out.insert("risks".into(), risks);
    }
    if let Some(deps) = obj.get("dependencies").cloned() {
        out.insert("dependencies".into(), deps);
    }

    Ok(Value::Object(out))
}

fn normalize_step(raw: &Value, idx: usize) -> Result<Value, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| format!("steps[{idx}] must be an object"))?;

    let mut out = serde_json::Map::new();
    let number = obj
        .get("step")
        .and_then(coerce_step_number)
        .ok_or_else(|| format!("steps[{idx}] missing numeric 'step'"))?;
    out.insert("step".into(), Value::from(number));

    for key in ["title", "description", "category"] {
        if let Some(text) = obj.get(key).and_then(Value::as_str) {
            out.insert(key.into(), Value::String(text.to_string()));
        }
    }
    if let Some(hours) = obj.get("estimated_hours").and_then(Value::as_f64) {
        out.insert("estimated_hours".into(), Value::from(hours));
    }

    if let Some(deps) = obj.get("depends_on").and_then(Value::as_array) {
        let mut norm = Vec::with_capacity(deps.len());
        for dep in deps {
            norm.push(Value::from(coerce_step_number(dep).ok_or_else(|| {
                format!("steps[{idx}].depends_on entry {dep} is not a step number")
            })?));
        }
        out.insert("depends_on".into(), Value::Array(norm));
    }

    // Legacy emitters used `substeps`; canonical is `sub_steps`.
    let subs = obj
        .get("sub_steps")
        .or_else(|| obj.get("substeps"))
        .and_then(Value::as_array);
    if let Some(subs) = subs {
        let mut norm = Vec::with_capacity(subs.len());
        for (sub_idx, sub) in subs.iter().enumerate() {
            norm.push(normalize_sub_step(sub, idx, sub_idx)?);
        }
        out.insert("sub_steps".into(), Value::Array(norm));
    }

    Ok(Value::Object(out))
}

fn normalize_sub_step(raw: &Value, step_idx: usize, sub_idx: usize) -> Result<Value, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| format!("steps[{step_idx}].sub_steps[{sub_idx}] must be an object"))?;

    let mut out = serde_json::Map::new();
    let id = match obj.get("sub_step") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(format!(
                "steps[{step_idx}].sub_steps[{sub_idx}] missing 'sub_step' id"
            ));
        }
    };
    out.insert("sub_step".into(), Value::String(id));

    for key in ["title", "description", "verification"] {
        if let Some(text) = obj.get(key).and_then(Value::as_str) {
            out.insert(key.into(), Value::String(text.to_string()));
        }
    }
    if let Some(files) = obj.get("files_affected").cloned() {
        out.insert("files_affected".into(), files);
    }

    Ok(Value::Object(out))
}

fn coerce_step_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check semantic invariants not expressible in JSON Schema:
/// - step numbers are 1-based, unique, strictly increasing
/// - sub-step ids are unique within their step and prefixed `"<step>."`
pub fn validate_invariants(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut prev = 0u32;
    let mut seen = HashSet::new();

    for step in &plan.steps {
        if step.step == 0 {
            errors.push(format!("step '{}': numbers are 1-based", step.title));
        }
        if !seen.insert(step.step) {
            errors.push(format!("duplicate step number {}", step.step));
        }
        if step.step <= prev {
            errors.push(format!(
                "step numbers must be strictly increasing ({} after {})",
                step.step, prev
            ));
        }
        prev = step.step;

        let mut sub_seen = HashSet::new();
        let prefix = format!("{}.", step.step);
        for sub in &step.sub_steps {
            if !sub_seen.insert(sub.sub_step.as_str()) {
                errors.push(format!(
                    "step {}: duplicate sub-step id '{}'",
                    step.step, sub.sub_step
                ));
            }
            if !sub.sub_step.starts_with(&prefix) {
                errors.push(format!(
                    "step {}: sub-step id '{}' must be scoped '{}N'",
                    step.step, sub.sub_step, prefix
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_canonical_document_unchanged_in_meaning() {
        let raw = json!({
            "task_id": "T-1",
            "description": "demo",
            "steps": [
                {"step": 1, "title": "one", "sub_steps": [
                    {"sub_step": "1.1", "title": "a"}
                ]}
            ]
        });
        let norm = normalize_plan_document(&raw).expect("normalize");
        let plan: Plan = serde_json::from_value(norm).expect("parse");
        assert_eq!(plan.task_id, "T-1");
        assert_eq!(plan.steps[0].sub_steps[0].sub_step, "1.1");
    }

    #[test]
    fn normalizes_legacy_nested_plan_with_substeps_key() {
        let raw = json!({
            "plan": {
                "task_id": "T-2",
                "steps": [
                    {"step": "1", "title": "one", "substeps": [
                        {"sub_step": 1.1, "title": "a"}
                    ], "depends_on": []}
                ]
            }
        });
        let norm = normalize_plan_document(&raw).expect("normalize");
        let plan: Plan = serde_json::from_value(norm).expect("parse");
        assert_eq!(plan.steps[0].step, 1);
        assert_eq!(plan.steps[0].sub_steps[0].sub_step, "1.1");
    }

    #[test]
    fn normalize_rejects_missing_steps() {
        let raw = json!({"task_id": "T-3"});
        let err = normalize_plan_document(&raw).expect_err("should fail");
        assert!(err.contains("steps"));
    }

    #[test]
    fn normalize_coerces_string_execution_order() {
        let raw = json!({
            "task_id": "T-4",
            "steps": [{"step": 1, "title": "one"}],
            "execution_order": ["1"]
        });
        let norm = normalize_plan_document(&raw).expect("normalize");
        let plan: Plan = serde_json::from_value(norm).expect("parse");
        assert_eq!(plan.execution_order, vec![1]);
    }

    #[test]
    fn invariants_flag_duplicates_and_ordering() {
        let plan = Plan {
            task_id: "T-5".into(),
            description: String::new(),
            steps: vec![
                Step {
                    step: 2,
                    title: "b".into(),
                    description: String::new(),
                    category: String::new(),
                    estimated_hours: 0.0,
                    depends_on: vec![],
                    sub_steps: vec![],
                },
                Step {
                    step: 2,
                    title: "dup".into(),
                    description: String::new(),
                    category: String::new(),
                    estimated_hours: 0.0,
                    depends_on: vec![],
                    sub_steps: vec![SubStep {
                        sub_step: "3.1".into(),
                        title: "misscoped".into(),
                        description: String::new(),
                        files_affected: vec![],
                        verification: None,
                    }],
                },
            ],
            execution_order: vec![],
            risks: vec![],
            dependencies: vec![],
        };

        let errors = validate_invariants(&plan);
        assert!(errors.iter().any(|e| e.contains("duplicate step number")));
        assert!(errors.iter().any(|e| e.contains("strictly increasing")));
        assert!(errors.iter().any(|e| e.contains("scoped")));
    }

    #[test]
    fn unit_count_treats_bare_step_as_one_unit() {
        let plan = Plan {
            task_id: "T-6".into(),
            description: String::new(),
            steps: vec![
                Step {
                    step: 1,
                    title: "bare".into(),
                    description: String::new(),
                    category: String::new(),
                    estimated_hours: 0.0,
                    depends_on: vec![],
                    sub_steps: vec![],
                },
                Step {
                    step: 2,
                    title: "split".into(),
                    description: String::new(),
                    category: String::new(),
                    estimated_hours: 0.0,
                    depends_on: vec![],
                    sub_steps: vec![
                        SubStep {
                            sub_step: "2.1".into(),
                            title: "a".into(),
                            description: String::new(),
                            files_affected: vec![],
                            verification: None,
                        },
                        SubStep {
                            sub_step: "2.2".into(),
                            title: "b".into(),
                            description: String::new(),
                            files_affected: vec![],
                            verification: None,
                        },
                    ],
                },
            ],
            execution_order: vec![],
            risks: vec![],
            dependencies: vec![],
        };
        assert_eq!(plan.unit_count(), 3);
    }
}
