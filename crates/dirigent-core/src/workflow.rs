use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status of a workflow.
///
/// Terminal statuses are `completed`, `failed` and `rejected`; once reached
/// the workflow is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created and persisted, no task started yet.
    Planned,
    /// The source brief still has unresolved clarifying questions.
    AwaitingClarification,
    /// At least one task has started.
    InProgress,
    /// More than half of the tasks are past pending.
    Executing,
    /// Frozen behind the executive approval gate.
    WaitingForCeoApproval,
    /// Reviewer asked for changes; a revision task is being enqueued.
    NeedsRevision,
    /// Approved and finished.
    Completed,
    /// Executive rejected the result.
    Rejected,
    /// Unrecoverable error, task failure, or cancellation.
    Failed,
}

impl WorkflowStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Rejected
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Planned => "planned",
            WorkflowStatus::AwaitingClarification => "awaiting_clarification",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Executing => "executing",
            WorkflowStatus::WaitingForCeoApproval => "waiting_for_ceo_approval",
            WorkflowStatus::NeedsRevision => "needs_revision",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Progress counters recomputed on every task-status transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Tasks that reached `completed`.
    pub completed: usize,
    /// Tasks that reached `failed` or `cancelled`.
    pub failed: usize,
    /// Total number of tasks in the workflow.
    pub total: usize,
    /// `round(completed / total * 100)`; zero for an empty task list.
    pub percentage: u32,
}

impl Progress {
    /// Computes counters from a task list.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Cancelled))
            .count();
        let total = tasks.len();
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            completed,
            failed,
            total,
            percentage,
        }
    }

    /// True when every task has settled as completed or failed.
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// One execution of a directive: the task DAG plus lifecycle bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow id.
    pub id: Uuid,
    /// The operator's original directive text.
    pub directive: String,
    /// Current lifecycle status.
    pub status: WorkflowStatus,
    /// Brief this workflow was created from, if any.
    pub brief_id: Option<Uuid>,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Set exactly when a terminal status is reached.
    pub ended_at: Option<DateTime<Utc>>,
    /// Total wall-clock duration in milliseconds, set at termination.
    pub total_duration_ms: Option<u64>,
    /// Progress counters.
    pub progress: Progress,
    /// The task DAG, in planner order.
    pub tasks: Vec<Task>,
    /// Ids of every artifact captured by this workflow's tasks.
    pub artifact_ids: Vec<Uuid>,
    /// Free-form metadata: approval decisions, failure reasons, cancel reasons.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Workflow {
    /// Creates a new workflow in `planned` state with an empty task list.
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            directive: directive.into(),
            status: WorkflowStatus::Planned,
            brief_id: None,
            started_at: Utc::now(),
            ended_at: None,
            total_duration_ms: None,
            progress: Progress::default(),
            tasks: Vec::new(),
            artifact_ids: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Associates the source brief.
    pub fn with_brief(mut self, brief_id: Uuid) -> Self {
        self.brief_id = Some(brief_id);
        self
    }

    /// Replaces the task list and recomputes progress.
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self.progress = Progress::from_tasks(&self.tasks);
        self
    }

    /// Looks up a task by id.
    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Looks up a task by id, mutably.
    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Recomputes the progress counters from the current task statuses.
    pub fn recompute_progress(&mut self) {
        self.progress = Progress::from_tasks(&self.tasks);
    }

    /// True when the workflow can no longer change status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the workflow into a terminal status and stamps the end time.
    pub fn finish(&mut self, status: WorkflowStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.ended_at = Some(now);
        self.total_duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }

    /// Appends one entry to `metadata.failureReasons`.
    pub fn push_failure_reason(&mut self, reason: impl Into<String>) {
        let entry = serde_json::Value::String(reason.into());
        match self.metadata.get_mut("failureReasons") {
            Some(serde_json::Value::Array(reasons)) => reasons.push(entry),
            _ => {
                self.metadata
                    .insert("failureReasons".into(), serde_json::Value::Array(vec![entry]));
            }
        }
    }

    /// The accumulated failure reasons, empty when none were recorded.
    pub fn failure_reasons(&self) -> Vec<String> {
        match self.metadata.get("failureReasons") {
            Some(serde_json::Value::Array(reasons)) => reasons
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(wf: Uuid, status: TaskStatus) -> Task {
        let mut t = Task::new(wf, "t", "agent");
        t.status = status;
        t
    }

    #[test]
    fn test_progress_percentage_rounds() {
        let wf = Uuid::new_v4();
        let tasks = vec![
            task(wf, TaskStatus::Completed),
            task(wf, TaskStatus::Pending),
            task(wf, TaskStatus::Pending),
        ];
        let progress = Progress::from_tasks(&tasks);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percentage, 33);
    }

    #[test]
    fn test_progress_empty_task_list() {
        let progress = Progress::from_tasks(&[]);
        assert_eq!(progress.percentage, 0);
        assert!(progress.is_settled());
    }

    #[test]
    fn test_progress_settled_counts_failures() {
        let wf = Uuid::new_v4();
        let tasks = vec![
            task(wf, TaskStatus::Completed),
            task(wf, TaskStatus::Failed),
        ];
        let progress = Progress::from_tasks(&tasks);
        assert!(progress.is_settled());
        assert_eq!(progress.percentage, 50);
    }

    #[test]
    fn test_progress_counts_cancelled_as_failed() {
        let wf = Uuid::new_v4();
        let tasks = vec![
            task(wf, TaskStatus::Completed),
            task(wf, TaskStatus::Failed),
            task(wf, TaskStatus::Cancelled),
        ];
        let progress = Progress::from_tasks(&tasks);
        assert_eq!(progress.failed, 2);
        assert!(progress.is_settled());
    }

    #[test]
    fn test_finish_stamps_end_time() {
        let mut workflow = Workflow::new("build a landing page");
        let now = Utc::now();
        workflow.finish(WorkflowStatus::Completed, now);
        assert!(workflow.is_terminal());
        assert_eq!(workflow.ended_at, Some(now));
        assert!(workflow.total_duration_ms.is_some());
    }

    #[test]
    fn test_failure_reasons_accumulate() {
        let mut workflow = Workflow::new("x");
        assert!(workflow.failure_reasons().is_empty());
        workflow.push_failure_reason("task 'design' failed: exit 1");
        workflow.push_failure_reason("workspace violation");
        assert_eq!(workflow.failure_reasons().len(), 2);
        assert!(workflow.failure_reasons()[0].contains("design"));
    }

    #[test]
    fn test_with_tasks_recomputes_progress() {
        let workflow = Workflow::new("x");
        let wf = workflow.id;
        let workflow = workflow.with_tasks(vec![
            task(wf, TaskStatus::Completed),
            task(wf, TaskStatus::Completed),
        ]);
        assert_eq!(workflow.progress.percentage, 100);
    }

    #[test]
    fn test_status_display_matches_serde() {
        let json = serde_json::to_string(&WorkflowStatus::WaitingForCeoApproval).unwrap();
        assert_eq!(json, "\"waiting_for_ceo_approval\"");
        assert_eq!(
            WorkflowStatus::WaitingForCeoApproval.to_string(),
            "waiting_for_ceo_approval"
        );
    }
}
