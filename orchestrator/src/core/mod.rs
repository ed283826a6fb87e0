//! Deterministic, pure logic for the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod cursor;
pub mod diff_guard;
pub mod ledger;
pub mod phase;
pub mod plan;
pub mod schedule;
pub mod validate;
