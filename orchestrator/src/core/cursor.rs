//! Resumable execution cursor over the plan's units of work.
//!
//! The cursor is `(step_index, sub_step_index)`, both zero-based, mutated
//! only by the orchestrator and monotonically non-decreasing within a run.
//! Each advance consumes exactly one unit: one sub-step, or a whole step
//! when it declares no sub-steps. Persisting the cursor between advances is
//! what makes a crashed or paused run resumable without redoing work.

use serde::{Deserialize, Serialize};

use crate::core::plan::{Plan, Step, SubStep, step_unit_count};

/// Position of the next unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Cursor {
    pub step_index: usize,
    pub sub_step_index: usize,
}

/// The unit of work under the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit<'a> {
    pub step: &'a Step,
    /// `None` for a step without sub-steps (one atomic unit).
    pub sub_step: Option<&'a SubStep>,
}

/// True once every unit has been consumed.
pub fn is_done(plan: &Plan, cursor: Cursor) -> bool {
    cursor.step_index >= plan.steps.len()
}

/// The unit the cursor points at, or `None` when the run is done.
pub fn current_unit(plan: &Plan, cursor: Cursor) -> Option<Unit<'_>> {
    let step = plan.steps.get(cursor.step_index)?;
    if step.sub_steps.is_empty() {
        return Some(Unit {
            step,
            sub_step: None,
        });
    }
    let sub_step = step.sub_steps.get(cursor.sub_step_index)?;
    Some(Unit {
        step,
        sub_step: Some(sub_step),
    })
}

/// Move past the current unit. Returns the new cursor and whether the run
/// is now done.
///
/// Invariant preserved: while not done, `sub_step_index <
/// unit_count(steps[step_index])`; reaching the bound rolls over to
/// `(step_index + 1, 0)`.
pub fn advance(plan: &Plan, cursor: Cursor) -> (Cursor, bool) {
    if is_done(plan, cursor) {
        return (cursor, true);
    }
    let units = step_unit_count(&plan.steps[cursor.step_index]);
    let next = if cursor.sub_step_index + 1 < units {
        Cursor {
            step_index: cursor.step_index,
            sub_step_index: cursor.sub_step_index + 1,
        }
    } else {
        Cursor {
            step_index: cursor.step_index + 1,
            sub_step_index: 0,
        }
    };
    let done = is_done(plan, next);
    (next, done)
}

/// Reject cursors that point outside the plan (e.g. stale persisted state
/// after the plan changed underneath a resume).
pub fn check_cursor(plan: &Plan, cursor: Cursor) -> Result<(), String> {
    if is_done(plan, cursor) {
        if cursor.step_index == plan.steps.len() && cursor.sub_step_index == 0 {
            return Ok(());
        }
        return Err(format!(
            "cursor ({}, {}) is past the end of a {}-step plan",
            cursor.step_index,
            cursor.sub_step_index,
            plan.steps.len()
        ));
    }
    let units = step_unit_count(&plan.steps[cursor.step_index]);
    if cursor.sub_step_index >= units {
        return Err(format!(
            "cursor sub_step_index {} out of range for step {} ({} unit(s))",
            cursor.sub_step_index, plan.steps[cursor.step_index].step, units
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::step_unit_count;
    use crate::test_support::{plan_with_steps, step, sub_step};

    fn three_sub_step_plan() -> Plan {
        let mut s = step(1, "only");
        s.sub_steps = vec![
            sub_step("1.1", "a"),
            sub_step("1.2", "b"),
            sub_step("1.3", "c"),
        ];
        plan_with_steps("T-1", vec![s])
    }

    #[test]
    fn three_units_then_rollover_to_next_step() {
        let plan = three_sub_step_plan();
        let mut cursor = Cursor::default();

        for _ in 0..2 {
            let (next, done) = advance(&plan, cursor);
            assert!(!done);
            cursor = next;
        }
        let (cursor, done) = advance(&plan, cursor);
        assert!(done);
        assert_eq!(
            cursor,
            Cursor {
                step_index: 1,
                sub_step_index: 0
            }
        );
    }

    #[test]
    fn invariant_holds_at_every_reachable_state() {
        let mut bare = step(2, "bare");
        bare.sub_steps = vec![];
        let mut split = step(1, "split");
        split.sub_steps = vec![sub_step("1.1", "a"), sub_step("1.2", "b")];
        let plan = plan_with_steps("T-2", vec![split, bare]);

        let mut cursor = Cursor::default();
        let mut consumed = 0usize;
        while !is_done(&plan, cursor) {
            assert!(
                cursor.sub_step_index < step_unit_count(&plan.steps[cursor.step_index]),
                "invariant violated at {cursor:?}"
            );
            assert!(current_unit(&plan, cursor).is_some());
            let (next, _) = advance(&plan, cursor);
            cursor = next;
            consumed += 1;
        }
        assert_eq!(consumed, plan.unit_count());
        assert!(current_unit(&plan, cursor).is_none());
    }

    #[test]
    fn bare_step_is_one_atomic_unit() {
        let plan = plan_with_steps("T-3", vec![step(1, "bare")]);
        let unit = current_unit(&plan, Cursor::default()).expect("unit");
        assert!(unit.sub_step.is_none());
        let (cursor, done) = advance(&plan, Cursor::default());
        assert!(done);
        assert_eq!(cursor.step_index, 1);
    }

    #[test]
    fn advance_past_done_is_a_no_op() {
        let plan = plan_with_steps("T-4", vec![step(1, "bare")]);
        let (end, done) = advance(&plan, Cursor::default());
        assert!(done);
        let (again, still_done) = advance(&plan, end);
        assert!(still_done);
        assert_eq!(end, again);
    }

    #[test]
    fn stale_cursor_is_rejected() {
        let plan = three_sub_step_plan();
        let err = check_cursor(
            &plan,
            Cursor {
                step_index: 0,
                sub_step_index: 3,
            },
        )
        .expect_err("out of range");
        assert!(err.contains("out of range"));

        let err = check_cursor(
            &plan,
            Cursor {
                step_index: 5,
                sub_step_index: 0,
            },
        )
        .expect_err("past end");
        assert!(err.contains("past the end"));
    }
}
