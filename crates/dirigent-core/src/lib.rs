//! Core types and error definitions for the Dirigent engine.
//!
//! This crate provides the foundational types shared across all Dirigent
//! crates: the data model (workflows, tasks, briefs, artifacts, approvals,
//! audit entries), the unified error enum, the in-process event bus, the
//! clock abstraction, the repository seam, and engine configuration.
//!
//! # Main types
//!
//! - [`DirigentError`] — Unified error enum with stable kind identifiers.
//! - [`DirigentResult`] — Convenience alias for `Result<T, DirigentError>`.
//! - [`Workflow`] / [`Task`] — The execution model: a directive's task DAG.
//! - [`Brief`] — In-flight intent analysis with clarifying questions.
//! - [`Artifact`] — A content-addressed file captured from a workspace.
//! - [`ApprovalRequest`] — The executive sign-off gate record.
//! - [`EventBus`] / [`EngineEvent`] — In-process lifecycle pub/sub.
//! - [`Repository`] — The durable-storage adapter contract.
//! - [`EngineConfig`] — Retries, timeouts, and scoring rulesets.

/// Agent roles, profiles, and the registry.
pub mod agent;
/// Approval requests, decisions, and summaries.
pub mod approval;
/// Artifacts, lineage, and modification history.
pub mod artifact;
/// Append-only audit entries.
pub mod audit;
/// Briefs, clarifying questions, and finalized briefs.
pub mod brief;
/// Injected wall-clock abstraction.
pub mod clock;
/// Engine configuration and scoring rules.
pub mod config;
/// Unified error enum and result alias.
pub mod error;
/// Lifecycle events and the broadcast bus.
pub mod event;
/// Durable storage contract.
pub mod repository;
/// Tasks, statuses, and execution records.
pub mod task;
/// Workflows, statuses, and progress counters.
pub mod workflow;

pub use agent::{AgentProfile, AgentRegistry, AgentRole};
pub use approval::{
    ApprovalRequest, ApprovalStatus, ApprovalSummary, ComplianceCheck, Decision, RiskLevel,
};
pub use artifact::{Artifact, ArtifactQuery, Lineage, ModificationAction, ModificationEntry};
pub use audit::{AuditEntry, AuditSeverity};
pub use brief::{
    Brief, BriefStatus, ClarifyingQuestion, Complexity, FinalizedBrief, ProjectKind, QuestionForm,
    QuestionPriority, QuestionResponse,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RetryPolicy, ScoringRules};
pub use error::{DirigentError, DirigentResult};
pub use event::{EngineEvent, EventBus, EventLog, OutputStream};
pub use repository::{Repository, RepositoryError, RepositoryResult, WorkflowFilter};
pub use task::{ExitRecord, StepRecord, Task, TaskKind, TaskStatus};
pub use workflow::{Progress, Workflow, WorkflowStatus};
