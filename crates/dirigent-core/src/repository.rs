use crate::approval::ApprovalRequest;
use crate::artifact::{Artifact, ArtifactQuery};
use crate::audit::AuditEntry;
use crate::workflow::{Workflow, WorkflowStatus};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Classification of a repository failure.
///
/// The engine retries [`RepositoryError::Transient`] with bounded backoff;
/// [`RepositoryError::Terminal`] is surfaced immediately.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// May succeed on retry (lock contention, transient I/O).
    #[error("transient repository error: {0}")]
    Transient(String),
    /// Retrying cannot fix this (schema mismatch, disk full).
    #[error("terminal repository error: {0}")]
    Terminal(String),
}

/// A convenience `Result` alias for repository calls.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Filter for workflow listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowFilter {
    /// Restrict to one status.
    pub status: Option<WorkflowStatus>,
}

/// Durable read/write seam for workflows, artifacts, approvals, and audit
/// entries. The core never sees a concrete database; adapters implement this
/// trait. Writes are idempotent by primary key, so the engine may re-issue a
/// write after a transient failure.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Upserts a workflow snapshot.
    async fn save_workflow(&self, workflow: &Workflow) -> RepositoryResult<()>;

    /// Loads a workflow by id.
    async fn load_workflow(&self, id: Uuid) -> RepositoryResult<Option<Workflow>>;

    /// Lists workflows matching the filter, newest first.
    async fn list_workflows(&self, filter: WorkflowFilter) -> RepositoryResult<Vec<Workflow>>;

    /// Upserts an artifact record.
    async fn save_artifact(&self, artifact: &Artifact) -> RepositoryResult<()>;

    /// Loads an artifact by id.
    async fn load_artifact(&self, id: Uuid) -> RepositoryResult<Option<Artifact>>;

    /// Queries artifact records by metadata criteria.
    async fn query_artifacts(&self, criteria: &ArtifactQuery) -> RepositoryResult<Vec<Artifact>>;

    /// Upserts an approval request.
    async fn save_approval(&self, request: &ApprovalRequest) -> RepositoryResult<()>;

    /// Loads the approval request for a workflow, if one exists.
    async fn load_approval(&self, workflow_id: Uuid) -> RepositoryResult<Option<ApprovalRequest>>;

    /// Appends an audit entry.
    async fn append_audit(&self, entry: &AuditEntry) -> RepositoryResult<()>;
}
