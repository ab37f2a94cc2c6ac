use crate::approval::ApprovalStatus;
use crate::workflow::{Progress, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which output stream a task step wrote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// A lifecycle event published on the engine's bus.
///
/// Events are totally ordered with respect to a single workflow's lifecycle;
/// no ordering is guaranteed across workflows. Every subscriber receives the
/// same sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A workflow was created and persisted.
    WorkflowCreated {
        /// The new workflow.
        workflow_id: Uuid,
        /// Its directive text.
        directive: String,
    },
    /// Progress counters changed after a task transition.
    WorkflowProgress {
        /// The workflow.
        workflow_id: Uuid,
        /// Recomputed counters.
        progress: Progress,
        /// Status after the transition.
        status: WorkflowStatus,
    },
    /// A workflow was cancelled by an operator.
    WorkflowCancelled {
        /// The workflow.
        workflow_id: Uuid,
        /// Operator-supplied reason.
        reason: String,
    },
    /// A workflow reached `completed`.
    WorkflowCompleted {
        /// The workflow.
        workflow_id: Uuid,
    },
    /// A workflow reached `failed`.
    WorkflowFailed {
        /// The workflow.
        workflow_id: Uuid,
        /// Accumulated failure reasons.
        reasons: Vec<String>,
    },
    /// A task entered the ready queue.
    TaskQueued {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
        /// Assigned agent.
        agent: String,
    },
    /// A task was dispatched to its agent.
    TaskStarted {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
        /// Assigned agent.
        agent: String,
    },
    /// A running task produced output on stdout or stderr.
    TaskStepOutput {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
        /// Producing agent.
        agent: String,
        /// Which stream.
        stream: OutputStream,
        /// The captured chunk.
        data: String,
    },
    /// A task completed successfully.
    TaskCompleted {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
    },
    /// A task failed.
    TaskFailed {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
        /// Failure reason.
        reason: String,
    },
    /// A task was cancelled.
    TaskCancelled {
        /// Parent workflow.
        workflow_id: Uuid,
        /// The task.
        task_id: Uuid,
        /// Cancellation reason (e.g. "upstream failed").
        reason: String,
    },
    /// An artifact was registered in the lineage store.
    ArtifactRecorded {
        /// The artifact.
        artifact_id: Uuid,
        /// Producing workflow, when known.
        workflow_id: Option<Uuid>,
        /// Logical name.
        name: String,
    },
    /// An artifact's bytes were updated in place.
    ArtifactUpdated {
        /// The artifact.
        artifact_id: Uuid,
        /// Logical name.
        name: String,
    },
    /// An approval request was submitted for a workflow.
    ApprovalRequested {
        /// The workflow.
        workflow_id: Uuid,
        /// The request.
        request_id: Uuid,
    },
    /// An executive recorded a decision.
    ApprovalDecision {
        /// The workflow.
        workflow_id: Uuid,
        /// The recorded status.
        decision: ApprovalStatus,
        /// Who decided.
        approver: String,
    },
    /// An administrator forced completion past the approval gate.
    EmergencyUnblock {
        /// The workflow.
        workflow_id: Uuid,
        /// Who forced it.
        approver: String,
        /// Mandatory reason.
        reason: String,
    },
    /// Repository retries were exhausted; memory is now authoritative.
    PersistenceDegraded {
        /// What failed.
        detail: String,
    },
}

impl EngineEvent {
    /// The workflow this event belongs to, when it has one.
    pub fn workflow_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::WorkflowCreated { workflow_id, .. }
            | EngineEvent::WorkflowProgress { workflow_id, .. }
            | EngineEvent::WorkflowCancelled { workflow_id, .. }
            | EngineEvent::WorkflowCompleted { workflow_id }
            | EngineEvent::WorkflowFailed { workflow_id, .. }
            | EngineEvent::TaskQueued { workflow_id, .. }
            | EngineEvent::TaskStarted { workflow_id, .. }
            | EngineEvent::TaskStepOutput { workflow_id, .. }
            | EngineEvent::TaskCompleted { workflow_id, .. }
            | EngineEvent::TaskFailed { workflow_id, .. }
            | EngineEvent::TaskCancelled { workflow_id, .. }
            | EngineEvent::ApprovalRequested { workflow_id, .. }
            | EngineEvent::ApprovalDecision { workflow_id, .. }
            | EngineEvent::EmergencyUnblock { workflow_id, .. } => Some(*workflow_id),
            EngineEvent::ArtifactRecorded { workflow_id, .. } => *workflow_id,
            EngineEvent::ArtifactUpdated { .. } | EngineEvent::PersistenceDegraded { .. } => None,
        }
    }
}

/// In-process pub/sub for [`EngineEvent`]s.
///
/// A thin wrapper over `tokio::sync::broadcast`; the bus is an injected
/// dependency, never a global. Sending never blocks and ignores the case of
/// zero subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a bus with the given per-subscriber buffer.
    pub fn new(buffer: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(buffer);
        Self { sender }
    }

    /// Subscribes; the receiver observes every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event to all current subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Capturing subscriber that records every event it observes.
///
/// Used by tests to assert on event sequences and by the CLI to echo
/// progress; production transports subscribe to the bus directly.
pub struct EventLog {
    events: Arc<tokio::sync::RwLock<Vec<EngineEvent>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl EventLog {
    /// Attaches a collector to the bus.
    pub fn attach(bus: &EventBus) -> Self {
        let events: Arc<tokio::sync::RwLock<Vec<EngineEvent>>> = Arc::default();
        let sink = events.clone();
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.write().await.push(event);
            }
        });
        Self { events, handle }
    }

    /// Snapshot of everything captured so far.
    pub async fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.read().await.clone()
    }

    /// Captured events belonging to one workflow, in emission order.
    pub async fn for_workflow(&self, workflow_id: Uuid) -> Vec<EngineEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.workflow_id() == Some(workflow_id))
            .cloned()
            .collect()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
