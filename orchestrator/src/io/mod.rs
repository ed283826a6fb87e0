//! Side-effectful adapters: filesystem state, subprocesses, git, and the
//! model-backed capability boundary. Everything under `core` stays pure;
//! everything that touches the outside world lives here.

pub mod capability;
pub mod config;
pub mod git;
pub mod plan_store;
pub mod process;
pub mod report;
pub mod run_state;
pub mod tools;
