//! Deterministic task execution orchestrator.
//!
//! Takes a validated implementation plan and drives it through a phased
//! workflow: branch setup, dependency installs, plan validation with a
//! bounded refinement loop, unit-by-unit code generation through a
//! sandboxed tool dispatcher, tests, commit, and pull request composition.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan model, scheduling,
//!   validation scoring, cursor, phase machine, ledger). No I/O, fully
//!   testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem state, subprocess
//!   execution, git, the model-backed capability boundary). Isolated to
//!   enable scripted backends in tests.
//!
//! Orchestration modules ([`run`], [`unit`]) coordinate core logic with I/O
//! to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod unit;
