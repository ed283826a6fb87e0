//! Dependency scheduler: topological ordering over `depends_on`.
//!
//! Kahn's algorithm drained in waves. Each wave is a "level" of steps whose
//! dependencies are all satisfied; levels with more than one member are
//! reported as parallel-eligible groups. The orchestrator still executes
//! level members sequentially; the grouping is advisory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::plan::Step;

/// Dependency graph is not a DAG. Fatal for the run, surfaced before any
/// unit executes; no partial order is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetectedError {
    /// Step numbers that could not be assigned a level.
    pub steps: Vec<u32>,
}

impl fmt::Display for CycleDetectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.steps.iter().map(u32::to_string).collect();
        write!(f, "dependency cycle involving steps [{}]", ids.join(", "))
    }
}

impl std::error::Error for CycleDetectedError {}

/// Total order plus advisory parallelism information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    /// Flattened level-by-level total order (step numbers).
    pub ordered: Vec<u32>,
    /// Waves of steps whose dependencies were all satisfied together.
    pub levels: Vec<Vec<u32>>,
    /// Levels with more than one member (informational only).
    pub parallel_groups: Vec<Vec<u32>>,
}

/// Compute a dependency-respecting order over `steps`.
///
/// Level members are sorted by step number so the result is deterministic.
/// References to unknown steps are ignored here; the plan validator reports
/// them as hard issues before scheduling runs.
pub fn order(steps: &[Step]) -> Result<ExecutionOrder, CycleDetectedError> {
    let known: BTreeSet<u32> = steps.iter().map(|s| s.step).collect();

    // dependency -> dependents, plus in-degree per step.
    let mut dependents: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut in_degree: BTreeMap<u32, usize> = steps.iter().map(|s| (s.step, 0)).collect();
    for step in steps {
        for dep in &step.depends_on {
            if !known.contains(dep) || *dep == step.step {
                continue;
            }
            dependents.entry(*dep).or_default().push(step.step);
            *in_degree.entry(step.step).or_default() += 1;
        }
    }

    let mut levels: Vec<Vec<u32>> = Vec::new();
    let mut assigned = 0usize;
    let mut ready: Vec<u32> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    while !ready.is_empty() {
        ready.sort_unstable();
        let level = ready.clone();
        assigned += level.len();

        let mut next = Vec::new();
        for id in &level {
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        levels.push(level);
        ready = next;
    }

    if assigned != steps.len() {
        let placed: BTreeSet<u32> = levels.iter().flatten().copied().collect();
        let steps: Vec<u32> = known.difference(&placed).copied().collect();
        return Err(CycleDetectedError { steps });
    }

    let ordered = levels.iter().flatten().copied().collect();
    let parallel_groups = levels.iter().filter(|l| l.len() > 1).cloned().collect();
    Ok(ExecutionOrder {
        ordered,
        levels,
        parallel_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step_with_deps;

    #[test]
    fn fanout_yields_one_parallel_group() {
        let steps = vec![
            step_with_deps(1, &[]),
            step_with_deps(2, &[1]),
            step_with_deps(3, &[1]),
        ];
        let out = order(&steps).expect("order");
        assert_eq!(out.levels, vec![vec![1], vec![2, 3]]);
        assert_eq!(out.parallel_groups, vec![vec![2, 3]]);
        assert_eq!(out.ordered, vec![1, 2, 3]);
    }

    #[test]
    fn order_respects_all_dependencies() {
        let steps = vec![
            step_with_deps(1, &[]),
            step_with_deps(2, &[1]),
            step_with_deps(3, &[1, 2]),
            step_with_deps(4, &[2]),
            step_with_deps(5, &[3, 4]),
        ];
        let out = order(&steps).expect("order");
        let position = |id: u32| out.ordered.iter().position(|s| *s == id).expect("placed");
        for step in &steps {
            for dep in &step.depends_on {
                assert!(
                    position(*dep) < position(step.step),
                    "dependency {dep} must precede step {}",
                    step.step
                );
            }
        }
    }

    #[test]
    fn cycle_is_reported_with_no_partial_order() {
        let steps = vec![
            step_with_deps(1, &[]),
            step_with_deps(2, &[3]),
            step_with_deps(3, &[2]),
        ];
        let err = order(&steps).expect_err("cycle");
        assert_eq!(err.steps, vec![2, 3]);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_reference_is_ignored_not_a_cycle() {
        // A step depending on itself is a validator hard issue; the
        // scheduler must not deadlock on it.
        let steps = vec![step_with_deps(1, &[1]), step_with_deps(2, &[1])];
        let out = order(&steps).expect("order");
        assert_eq!(out.ordered, vec![1, 2]);
    }

    #[test]
    fn independent_steps_form_a_single_level() {
        let steps = vec![
            step_with_deps(1, &[]),
            step_with_deps(2, &[]),
            step_with_deps(3, &[]),
        ];
        let out = order(&steps).expect("order");
        assert_eq!(out.levels, vec![vec![1, 2, 3]]);
        assert_eq!(out.parallel_groups, vec![vec![1, 2, 3]]);
    }
}
