use crate::store::LineageStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Aggregate view of the artifact store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageReport {
    /// Total registered artifacts.
    pub total: usize,
    /// Artifact counts keyed by agent name.
    pub by_agent: HashMap<String, usize>,
    /// Artifact counts keyed by producing workflow.
    pub by_workflow: HashMap<Uuid, usize>,
    /// Artifact counts keyed by file type.
    pub by_type: HashMap<String, usize>,
    /// Artifacts with no producing task recorded.
    pub orphans: Vec<Uuid>,
}

impl LineageStore {
    /// Builds an aggregate report over the current store contents.
    pub async fn report(&self) -> LineageReport {
        let artifacts = self.snapshot_all().await;
        let mut report = LineageReport {
            total: artifacts.len(),
            ..Default::default()
        };
        for artifact in &artifacts {
            *report.by_agent.entry(artifact.agent.clone()).or_default() += 1;
            if let Some(workflow_id) = artifact.workflow_id {
                *report.by_workflow.entry(workflow_id).or_default() += 1;
            }
            *report.by_type.entry(artifact.file_type.clone()).or_default() += 1;
            if artifact.task_id.is_none() {
                report.orphans.push(artifact.id);
            }
        }
        report
    }
}
