use async_trait::async_trait;
use dirigent_core::{
    ApprovalRequest, Artifact, ArtifactQuery, AuditEntry, Repository, RepositoryError,
    RepositoryResult, Workflow, WorkflowFilter,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// File-based repository: one JSON document per entity plus an append-only
/// `audit.jsonl`. Good enough for a single node.
pub struct FileRepository {
    workflows_dir: PathBuf,
    artifacts_dir: PathBuf,
    approvals_dir: PathBuf,
    audit_file: PathBuf,
}

impl FileRepository {
    /// Creates the directory layout under `root`.
    pub async fn new(root: &Path) -> RepositoryResult<Self> {
        let repo = Self {
            workflows_dir: root.join("workflows"),
            artifacts_dir: root.join("artifacts"),
            approvals_dir: root.join("approvals"),
            audit_file: root.join("audit.jsonl"),
        };
        for dir in [&repo.workflows_dir, &repo.artifacts_dir, &repo.approvals_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(map_io)?;
        }
        Ok(repo)
    }

    async fn write_doc<T: serde::Serialize>(
        dir: &Path,
        id: Uuid,
        value: &T,
    ) -> RepositoryResult<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| RepositoryError::Terminal(format!("serialize: {e}")))?;
        let path = dir.join(format!("{id}.json"));
        tokio::fs::write(&path, json).await.map_err(map_io)?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }

    async fn read_doc<T: serde::de::DeserializeOwned>(
        dir: &Path,
        id: Uuid,
    ) -> RepositoryResult<Option<T>> {
        let path = dir.join(format!("{id}.json"));
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io(e)),
        };
        let value = serde_json::from_str(&data)
            .map_err(|e| RepositoryError::Terminal(format!("parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    async fn read_all<T: serde::de::DeserializeOwned>(dir: &Path) -> RepositoryResult<Vec<T>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(map_io)?;
        while let Some(entry) = entries.next_entry().await.map_err(map_io)? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                if let Some(value) = Self::read_doc(dir, id).await? {
                    out.push(value);
                }
            }
        }
        Ok(out)
    }
}

/// Permission problems never fix themselves; everything else is worth a
/// retry.
fn map_io(e: std::io::Error) -> RepositoryError {
    match e.kind() {
        ErrorKind::PermissionDenied | ErrorKind::Unsupported => {
            RepositoryError::Terminal(e.to_string())
        }
        _ => RepositoryError::Transient(e.to_string()),
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> RepositoryResult<()> {
        Self::write_doc(&self.workflows_dir, workflow.id, workflow).await
    }

    async fn load_workflow(&self, id: Uuid) -> RepositoryResult<Option<Workflow>> {
        Self::read_doc(&self.workflows_dir, id).await
    }

    async fn list_workflows(&self, filter: WorkflowFilter) -> RepositoryResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = Self::read_all(&self.workflows_dir)
            .await?
            .into_iter()
            .filter(|w: &Workflow| filter.status.map_or(true, |s| w.status == s))
            .collect();
        workflows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(workflows)
    }

    async fn save_artifact(&self, artifact: &Artifact) -> RepositoryResult<()> {
        Self::write_doc(&self.artifacts_dir, artifact.id, artifact).await
    }

    async fn load_artifact(&self, id: Uuid) -> RepositoryResult<Option<Artifact>> {
        Self::read_doc(&self.artifacts_dir, id).await
    }

    async fn query_artifacts(&self, criteria: &ArtifactQuery) -> RepositoryResult<Vec<Artifact>> {
        let mut artifacts: Vec<Artifact> = Self::read_all(&self.artifacts_dir)
            .await?
            .into_iter()
            .filter(|a: &Artifact| {
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
            .collect();
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    async fn save_approval(&self, request: &ApprovalRequest) -> RepositoryResult<()> {
        Self::write_doc(&self.approvals_dir, request.workflow_id, request).await
    }

    async fn load_approval(&self, workflow_id: Uuid) -> RepositoryResult<Option<ApprovalRequest>> {
        Self::read_doc(&self.approvals_dir, workflow_id).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| RepositoryError::Terminal(format!("serialize: {e}")))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_file)
            .await
            .map_err(map_io)?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(map_io)?;
        Ok(())
    }
}
