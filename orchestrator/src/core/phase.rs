//! Workflow phase state machine.
//!
//! A pure `(phase, event) -> phase` function, unit-testable without any
//! execution engine attached. The driver in [`crate::run`] owns the side
//! effects of each phase; this module only encodes which transitions are
//! legal. Any failure event reaches [`WorkflowPhase::Error`] from any
//! phase, and an unexpected event for the current phase also lands in
//! `Error` rather than being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level phases of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Initialize,
    SetupBranch,
    InstallDependencies,
    GenerateCode,
    ExecuteStep,
    RunTests,
    CommitChanges,
    CreatePr,
    Finalize,
    /// Terminal failure state; the run keeps its partial ledger.
    Error,
}

impl WorkflowPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowPhase::Initialize => "initialize",
            WorkflowPhase::SetupBranch => "setup_branch",
            WorkflowPhase::InstallDependencies => "install_dependencies",
            WorkflowPhase::GenerateCode => "generate_code",
            WorkflowPhase::ExecuteStep => "execute_step",
            WorkflowPhase::RunTests => "run_tests",
            WorkflowPhase::CommitChanges => "commit_changes",
            WorkflowPhase::CreatePr => "create_pr",
            WorkflowPhase::Finalize => "finalize",
            WorkflowPhase::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowPhase::Finalize | WorkflowPhase::Error)
    }
}

/// Events the driver feeds into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Inputs verified, plan loaded and normalized.
    Initialized,
    /// Working branch created or reused.
    BranchReady,
    /// Declared dependency installs attempted (outcomes in the ledger).
    DependenciesHandled,
    /// Plan failed validation but the retry budget is not exhausted;
    /// analysis repeats within the same phase.
    PlanRejected,
    /// Plan validated and scheduled.
    PlanAccepted,
    /// One unit of work finished; the cursor is not yet done.
    UnitExecuted,
    /// Cursor reported done.
    StepsComplete,
    /// Test command finished successfully.
    TestsPassed,
    /// Changes committed (or nothing to commit).
    Committed,
    /// Push + PR composition recorded.
    PrCreated,
    /// Run summary written; terminal success.
    Finalized,
    /// Unrecoverable failure in the current phase.
    Failed,
}

/// Apply one event to the machine.
pub fn transition(phase: WorkflowPhase, event: PhaseEvent) -> WorkflowPhase {
    if event == PhaseEvent::Failed {
        return WorkflowPhase::Error;
    }
    match (phase, event) {
        (WorkflowPhase::Initialize, PhaseEvent::Initialized) => WorkflowPhase::SetupBranch,
        (WorkflowPhase::SetupBranch, PhaseEvent::BranchReady) => {
            WorkflowPhase::InstallDependencies
        }
        (WorkflowPhase::InstallDependencies, PhaseEvent::DependenciesHandled) => {
            WorkflowPhase::GenerateCode
        }
        (WorkflowPhase::GenerateCode, PhaseEvent::PlanRejected) => WorkflowPhase::GenerateCode,
        (WorkflowPhase::GenerateCode, PhaseEvent::PlanAccepted) => WorkflowPhase::ExecuteStep,
        (WorkflowPhase::ExecuteStep, PhaseEvent::UnitExecuted) => WorkflowPhase::ExecuteStep,
        (WorkflowPhase::ExecuteStep, PhaseEvent::StepsComplete) => WorkflowPhase::RunTests,
        (WorkflowPhase::RunTests, PhaseEvent::TestsPassed) => WorkflowPhase::CommitChanges,
        (WorkflowPhase::CommitChanges, PhaseEvent::Committed) => WorkflowPhase::CreatePr,
        (WorkflowPhase::CreatePr, PhaseEvent::PrCreated) => WorkflowPhase::Finalize,
        (WorkflowPhase::Finalize, PhaseEvent::Finalized) => WorkflowPhase::Finalize,
        // Anything else is a driver bug; fail closed.
        _ => WorkflowPhase::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_phase_in_order() {
        let chain = [
            (PhaseEvent::Initialized, WorkflowPhase::SetupBranch),
            (PhaseEvent::BranchReady, WorkflowPhase::InstallDependencies),
            (PhaseEvent::DependenciesHandled, WorkflowPhase::GenerateCode),
            (PhaseEvent::PlanAccepted, WorkflowPhase::ExecuteStep),
            (PhaseEvent::StepsComplete, WorkflowPhase::RunTests),
            (PhaseEvent::TestsPassed, WorkflowPhase::CommitChanges),
            (PhaseEvent::Committed, WorkflowPhase::CreatePr),
            (PhaseEvent::PrCreated, WorkflowPhase::Finalize),
        ];
        let mut phase = WorkflowPhase::Initialize;
        for (event, expected) in chain {
            phase = transition(phase, event);
            assert_eq!(phase, expected);
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn failed_reaches_error_from_every_phase() {
        let phases = [
            WorkflowPhase::Initialize,
            WorkflowPhase::SetupBranch,
            WorkflowPhase::InstallDependencies,
            WorkflowPhase::GenerateCode,
            WorkflowPhase::ExecuteStep,
            WorkflowPhase::RunTests,
            WorkflowPhase::CommitChanges,
            WorkflowPhase::CreatePr,
            WorkflowPhase::Finalize,
        ];
        for phase in phases {
            assert_eq!(transition(phase, PhaseEvent::Failed), WorkflowPhase::Error);
        }
    }

    #[test]
    fn plan_rejection_loops_within_generate_code() {
        let phase = transition(WorkflowPhase::GenerateCode, PhaseEvent::PlanRejected);
        assert_eq!(phase, WorkflowPhase::GenerateCode);
    }

    #[test]
    fn unit_execution_loops_within_execute_step() {
        let phase = transition(WorkflowPhase::ExecuteStep, PhaseEvent::UnitExecuted);
        assert_eq!(phase, WorkflowPhase::ExecuteStep);
    }

    #[test]
    fn out_of_order_event_fails_closed() {
        let phase = transition(WorkflowPhase::Initialize, PhaseEvent::TestsPassed);
        assert_eq!(phase, WorkflowPhase::Error);
    }
}
