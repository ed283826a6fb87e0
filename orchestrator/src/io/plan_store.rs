//! Plan document load/store with schema and invariant validation.
//!
//! Raw plan JSON is normalized (legacy shapes resolved), checked against
//! the v1 JSON Schema (Draft 2020-12), and then checked for the semantic
//! invariants the schema cannot express. Only the canonical [`Plan`] ever
//! leaves this module.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::plan::{Plan, normalize_plan_document, validate_invariants};

const V1_SCHEMA: &str = include_str!("../../schemas/plan/v1.schema.json");

/// Read, normalize, and fully validate a plan document.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let plan = parse_plan(&raw).with_context(|| format!("validate {}", path.display()))?;
    debug!(task_id = %plan.task_id, steps = plan.steps.len(), "plan loaded");
    Ok(plan)
}

/// Parse and validate plan JSON: normalization, schema conformance, and
/// semantic invariants.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let document: Value = serde_json::from_str(raw).context("parse plan json")?;
    plan_from_value(&document)
}

/// Validate an in-memory plan document (used by the refinement loop, which
/// receives plans directly from the planning capability).
pub fn plan_from_value(document: &Value) -> Result<Plan> {
    let canonical = normalize_plan_document(document)
        .map_err(|err| anyhow::anyhow!("normalize plan: {err}"))?;
    validate_schema(&canonical)?;
    let plan: Plan = serde_json::from_value(canonical).context("parse plan as v1 struct")?;
    let errors = validate_invariants(&plan);
    if !errors.is_empty() {
        bail!("plan invariant violations:\n- {}", errors.join("\n- "));
    }
    Ok(plan)
}

/// Serialize the canonical plan to pretty JSON with trailing newline.
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(plan).context("serialize plan")?;
    payload.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("write temp plan {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace plan {}", path.display()))?;
    Ok(())
}

/// Validate the canonical document against the v1 schema.
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(V1_SCHEMA).context("parse bundled plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile plan schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("plan schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
