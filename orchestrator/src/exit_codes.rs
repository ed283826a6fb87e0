//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/plan or other errors.
pub const INVALID: i32 = 1;
/// Plan quality stayed below threshold (after the retry budget, for `run`).
pub const VALIDATION_FAILED: i32 = 2;
/// The plan's dependency graph contains a cycle.
pub const CYCLE: i32 = 3;
