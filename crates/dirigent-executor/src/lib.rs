//! Agent task execution: workspace-scoped commands and file capture.
//!
//! One [`AgentExecutor`] exists per agent and owns that agent's workspace.
//! The scheduler guarantees at most one task per agent runs at a time, so an
//! executor never overlaps its own executions. Commands run as subprocesses
//! rooted in the workspace; captured stdout/stderr is published on the event
//! bus, and files created or modified during the task window are registered
//! with the lineage store before the task is reported complete.
//!
//! # Main types
//!
//! - [`AgentExecutor`] — Executes one task inside one agent's workspace.
//! - [`ExecutorRegistry`] — The runtime roster: one executor per agent name.
//! - [`ExecutionOutcome`] — Terminal status, per-command records, artifacts.

mod executor;
mod registry;

pub use executor::{AgentExecutor, ExecutionOutcome};
pub use registry::ExecutorRegistry;
