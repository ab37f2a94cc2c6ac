use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk level assessed for an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Routine output.
    Low,
    /// Touches money, accounts, or user data.
    Medium,
    /// Deploys or security-sensitive work.
    High,
    /// Security-flagged work that skipped a security review.
    Critical,
}

/// Status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for an executive decision.
    Pending,
    /// Approved; the workflow may complete.
    Approved,
    /// Rejected; the workflow is terminal.
    Rejected,
    /// Reviewer asked for changes; the request is consumed.
    NeedsRevision,
    /// Forced through by an emergency override.
    EmergencyApproved,
}

/// The decision an executive can record against a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accept the result.
    Approved,
    /// Reject the result; terminal.
    Rejected,
    /// Send the workflow back for a revision pass.
    NeedsRevision,
}

/// Outcome of one named compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    /// Stable check name.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Short explanation of the outcome.
    pub details: String,
}

/// Deterministic summary computed over workflow state at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSummary {
    /// Quality score on a 0–100 scale, from the scoring ruleset.
    pub quality_score: u32,
    /// Assessed risk level.
    pub risk_level: RiskLevel,
    /// Named compliance-check outcomes.
    pub checks: Vec<ComplianceCheck>,
    /// Number of artifacts captured by the workflow.
    pub artifact_count: usize,
    /// Number of tasks in the workflow.
    pub task_count: usize,
}

/// A request for executive sign-off on a workflow's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id.
    pub id: Uuid,
    /// The workflow awaiting sign-off.
    pub workflow_id: Uuid,
    /// When the request was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Who (or what) submitted it; the orchestrator submits on review completion.
    pub submitter: String,
    /// Derived summary snapshot.
    pub summary: ApprovalSummary,
    /// Current status.
    pub status: ApprovalStatus,
    /// Who decided, once a decision is recorded.
    pub decided_by: Option<String>,
    /// Decision comments or the emergency reason.
    pub comments: Option<String>,
    /// When the decision was recorded.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// Creates a pending request for a workflow.
    pub fn new(workflow_id: Uuid, submitter: impl Into<String>, summary: ApprovalSummary) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            submitted_at: Utc::now(),
            submitter: submitter.into(),
            summary,
            status: ApprovalStatus::Pending,
            decided_by: None,
            comments: None,
            decided_at: None,
        }
    }

    /// True while no decision has been recorded.
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}
