use async_trait::async_trait;
use dirigent_core::{
    ApprovalRequest, Artifact, ArtifactQuery, AuditEntry, Repository, RepositoryError,
    RepositoryResult, Workflow, WorkflowFilter,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory repository backed by lock-protected maps.
///
/// Suitable for tests and short-lived engine runs; everything is lost on
/// drop. Writes are idempotent by primary key, matching the repository
/// contract.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    workflows: Arc<RwLock<HashMap<Uuid, Workflow>>>,
    artifacts: Arc<RwLock<HashMap<Uuid, Artifact>>>,
    approvals: Arc<RwLock<HashMap<Uuid, ApprovalRequest>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// The audit log captured so far, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> RepositoryResult<()> {
        self.workflows
            .write()
            .await
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn load_workflow(&self, id: Uuid) -> RepositoryResult<Option<Workflow>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn list_workflows(&self, filter: WorkflowFilter) -> RepositoryResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| filter.status.map_or(true, |s| w.status == s))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(workflows)
    }

    async fn save_artifact(&self, artifact: &Artifact) -> RepositoryResult<()> {
        self.artifacts
            .write()
            .await
            .insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn load_artifact(&self, id: Uuid) -> RepositoryResult<Option<Artifact>> {
        Ok(self.artifacts.read().await.get(&id).cloned())
    }

    async fn query_artifacts(&self, criteria: &ArtifactQuery) -> RepositoryResult<Vec<Artifact>> {
        let mut artifacts: Vec<Artifact> = self
            .artifacts
            .read()
            .await
            .values()
            .filter(|a| {
                criteria.workflow_id.map_or(true, |w| a.workflow_id == Some(w))
                    && criteria
                        .agent
                        .as_ref()
                        .map_or(true, |agent| a.agent.eq_ignore_ascii_case(agent))
                    && criteria
                        .file_name
                        .as_ref()
                        .map_or(true, |name| a.name.contains(name.as_str()))
                    && criteria
                        .file_type
                        .as_ref()
                        .map_or(true, |t| &a.file_type == t)
                    && criteria.created_after.map_or(true, |t| a.created_at >= t)
            })
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    async fn save_approval(&self, request: &ApprovalRequest) -> RepositoryResult<()> {
        self.approvals
            .write()
            .await
            .insert(request.workflow_id, request.clone());
        Ok(())
    }

    async fn load_approval(&self, workflow_id: Uuid) -> RepositoryResult<Option<ApprovalRequest>> {
        Ok(self.approvals.read().await.get(&workflow_id).cloned())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }
}

/// Test double that fails the first `failures` workflow saves with a
/// transient error, then delegates. Exercises the engine's bounded-retry and
/// degraded-persistence paths.
pub struct FlakyRepository<R> {
    inner: R,
    remaining_failures: AtomicU32,
}

impl<R: Repository> FlakyRepository<R> {
    /// Wraps `inner`, injecting `failures` transient failures.
    pub fn new(inner: R, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
        }
    }

    fn take_failure(&self) -> bool {
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<R: Repository> Repository for FlakyRepository<R> {
    async fn save_workflow(&self, workflow: &Workflow) -> RepositoryResult<()> {
        if self.take_failure() {
            return Err(RepositoryError::Transient("injected failure".into()));
        }
        self.inner.save_workflow(workflow).await
    }

    async fn load_workflow(&self, id: Uuid) -> RepositoryResult<Option<Workflow>> {
        self.inner.load_workflow(id).await
    }

    async fn list_workflows(&self, filter: WorkflowFilter) -> RepositoryResult<Vec<Workflow>> {
        self.inner.list_workflows(filter).await
    }

    async fn save_artifact(&self, artifact: &Artifact) -> RepositoryResult<()> {
        self.inner.save_artifact(artifact).await
    }

    async fn load_artifact(&self, id: Uuid) -> RepositoryResult<Option<Artifact>> {
        self.inner.load_artifact(id).await
    }

    async fn query_artifacts(&self, criteria: &ArtifactQuery) -> RepositoryResult<Vec<Artifact>> {
        self.inner.query_artifacts(criteria).await
    }

    async fn save_approval(&self, request: &ApprovalRequest) -> RepositoryResult<()> {
        self.inner.save_approval(request).await
    }

    async fn load_approval(&self, workflow_id: Uuid) -> RepositoryResult<Option<ApprovalRequest>> {
        self.inner.load_approval(workflow_id).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        self.inner.append_audit(entry).await
    }
}
