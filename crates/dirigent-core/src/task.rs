use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Status of a task inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies and an idle agent.
    Pending,
    /// Dispatched to its agent's executor.
    Running,
    /// All commands exited zero.
    Completed,
    /// A command failed or the task timed out.
    Failed,
    /// Removed before or during execution (workflow cancel or upstream failure).
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Classification of a task beyond ordinary agent work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A regular unit of agent work.
    #[default]
    Work,
    /// The synthetic review task inserted before executive approval.
    ManagerReview,
    /// A follow-up task derived from reviewer comments after `needs_revision`.
    Revision,
}

/// Outcome of a single command within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// The command line that was executed.
    pub command: String,
    /// Process exit code (`-1` when the process was killed).
    pub exit_code: i32,
    /// Captured stdout, truncated to a bounded excerpt.
    pub stdout: String,
    /// Captured stderr, truncated to a bounded excerpt.
    pub stderr: String,
    /// Wall-clock duration of the command in milliseconds.
    pub duration_ms: u64,
}

/// Execution record attached to a finished task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExitRecord {
    /// Per-command results, in execution order.
    pub steps: Vec<StepRecord>,
    /// Artifacts registered from this task's workspace scan.
    pub artifact_ids: Vec<Uuid>,
}

/// A unit of work inside a workflow, executed by exactly one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id.
    pub id: Uuid,
    /// The workflow this task belongs to.
    pub workflow_id: Uuid,
    /// Short human-readable title.
    pub title: String,
    /// Longer description handed to the agent.
    pub description: String,
    /// Name of the agent this task is assigned to.
    pub agent: String,
    /// Shell commands executed in order inside the agent's workspace.
    pub commands: Vec<String>,
    /// Ids of same-workflow tasks that must complete first.
    pub dependencies: Vec<Uuid>,
    /// Current status.
    pub status: TaskStatus,
    /// Work / manager review / revision.
    #[serde(default)]
    pub kind: TaskKind,
    /// Advisory ordering hint surfaced to observers; never used for selection.
    #[serde(default)]
    pub priority: u8,
    /// Planner's duration estimate in seconds.
    pub estimated_secs: u64,
    /// Set when the task is dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
    /// Per-command outcomes and captured artifacts.
    pub exit: Option<ExitRecord>,
    /// Failure or cancellation reason.
    pub error: Option<String>,
    /// Creation timestamp; ties in the ready queue break on this.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task assigned to `agent`.
    pub fn new(workflow_id: Uuid, title: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            title: title.into(),
            description: String::new(),
            agent: agent.into(),
            commands: Vec::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            kind: TaskKind::Work,
            priority: 0,
            estimated_secs: 0,
            started_at: None,
            ended_at: None,
            exit: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the command list.
    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    /// Sets the dependency ids.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Sets the task kind.
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the estimated duration in seconds.
    pub fn with_estimate(mut self, secs: u64) -> Self {
        self.estimated_secs = secs;
        self
    }

    /// True when the task is pending and every dependency is in `completed`.
    pub fn is_ready(&self, completed: &HashSet<Uuid>) -> bool {
        self.status == TaskStatus::Pending
            && self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// True when the task can no longer change status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_pending_work() {
        let wf = Uuid::new_v4();
        let task = Task::new(wf, "Design landing page", "designer");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.kind, TaskKind::Work);
        assert_eq!(task.workflow_id, wf);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_is_ready_without_dependencies() {
        let task = Task::new(Uuid::new_v4(), "Plan", "manager");
        assert!(task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_is_ready_waits_for_dependencies() {
        let dep = Uuid::new_v4();
        let task =
            Task::new(Uuid::new_v4(), "Build frontend", "frontend").with_dependencies(vec![dep]);
        assert!(!task.is_ready(&HashSet::new()));
        let completed: HashSet<Uuid> = [dep].into_iter().collect();
        assert!(task.is_ready(&completed));
    }

    #[test]
    fn test_running_task_is_not_ready() {
        let mut task = Task::new(Uuid::new_v4(), "Build", "backend");
        task.status = TaskStatus::Running;
        assert!(!task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serialization_is_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let kind = serde_json::to_string(&TaskKind::ManagerReview).unwrap();
        assert_eq!(kind, "\"manager_review\"");
    }
}
