use crate::approval::ApprovalGate;
use crate::scheduler::{has_cycle, QueueEntry, Scheduler};
use dirigent_brief::BriefManager;
use dirigent_core::{
    AgentRegistry, AgentRole, ApprovalRequest, ApprovalStatus, AuditEntry, Clock, Decision,
    DirigentError, DirigentResult, EngineConfig, EngineEvent, EventBus, Repository,
    RepositoryError, Task, TaskKind, TaskStatus, Workflow, WorkflowFilter, WorkflowStatus,
};
use dirigent_executor::ExecutorRegistry;
use dirigent_lineage::LineageStore;
use dirigent_planner::{PlanEstimate, Planner};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The workflow orchestration engine.
///
/// Owns the in-memory workflow store, the scheduler, and the approval gate.
/// All mutation of workflow state is serialized through one lock; the
/// dispatch loop, executor completions, and operator calls all funnel into
/// it. Readers receive snapshots.
pub struct Orchestrator {
    inner: Arc<EngineInner>,
    dispatch: tokio::task::JoinHandle<()>,
}

struct EngineInner {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    scheduler: Scheduler,
    executors: ExecutorRegistry,
    repository: Arc<dyn Repository>,
    lineage: LineageStore,
    planner: Planner,
    gate: ApprovalGate,
    roster: AgentRegistry,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Orchestrator {
    /// Builds the engine: one workspace and executor per roster agent, the
    /// lineage store, the planner, and the background dispatch loop.
    pub async fn new(
        config: EngineConfig,
        roster: AgentRegistry,
        repository: Arc<dyn Repository>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> DirigentResult<Self> {
        let lineage = LineageStore::new(bus.clone(), config.artifact_search_cap);
        let executors = ExecutorRegistry::for_roster(
            &roster,
            &config.workspace_root,
            lineage.clone(),
            bus.clone(),
            config.task_timeout(),
        )
        .await?;

        let inner = Arc::new(EngineInner {
            workflows: RwLock::new(HashMap::new()),
            scheduler: Scheduler::new(),
            executors,
            repository,
            lineage,
            planner: Planner::new(roster.clone()),
            gate: ApprovalGate::new(config.scoring.clone()),
            roster,
            bus,
            clock,
            config,
        });

        let loop_inner = inner.clone();
        let dispatch = tokio::spawn(async move {
            loop {
                loop_inner.dispatch_ready().await;
                loop_inner.scheduler.parked().await;
            }
        });

        Ok(Self { inner, dispatch })
    }

    /// The engine's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The artifact lineage store.
    pub fn lineage(&self) -> &LineageStore {
        &self.inner.lineage
    }

    /// Creates and starts a workflow directly from a directive, with default
    /// scope and timeline.
    pub async fn create_workflow(&self, directive: &str) -> DirigentResult<Workflow> {
        let directive = directive.trim();
        if directive.is_empty() {
            return Err(DirigentError::InvalidInput("empty directive".into()));
        }
        let workflow = Workflow::new(directive);
        let plan = self.inner.planner.plan_directive(workflow.id, directive)?;
        self.inner
            .admit(workflow, plan.tasks, Some(plan.estimate), false)
            .await
    }

    /// Admits a pre-planned task set through the normal validation and
    /// scheduling path. Transport adapters use this for externally supplied
    /// plans; task workflow ids are rewritten to the new workflow.
    pub async fn create_workflow_with_tasks(
        &self,
        directive: &str,
        mut tasks: Vec<Task>,
    ) -> DirigentResult<Workflow> {
        let directive = directive.trim();
        if directive.is_empty() {
            return Err(DirigentError::InvalidInput("empty directive".into()));
        }
        if tasks.is_empty() {
            return Err(DirigentError::InvalidInput("empty task set".into()));
        }
        let workflow = Workflow::new(directive);
        for task in &mut tasks {
            task.workflow_id = workflow.id;
        }
        self.inner.admit(workflow, tasks, None, false).await
    }

    /// Creates a workflow from a brief. Fails with `Unresolved` while the
    /// brief still carries an unanswered required clarifier (the
    /// high-priority `agent_mismatch` question among them).
    pub async fn create_workflow_from_brief(
        &self,
        briefs: &BriefManager,
        brief_id: Uuid,
    ) -> DirigentResult<Workflow> {
        let snapshot = briefs.get(brief_id).await?;
        let finalized = briefs.finalize(brief_id).await?;
        let has_open_optional = snapshot
            .questions
            .iter()
            .any(|q| !q.required && !snapshot.responses.contains_key(&q.id));

        let workflow = Workflow::new(&finalized.directive).with_brief(brief_id);
        let plan = self.inner.planner.plan(workflow.id, &finalized)?;
        self.inner
            .admit(workflow, plan.tasks, Some(plan.estimate), has_open_optional)
            .await
    }

    /// A snapshot merged from memory and the durable store; the durable row
    /// wins on canonical fields (status and timestamps).
    pub async fn get_workflow(&self, id: Uuid) -> DirigentResult<Workflow> {
        let memory = self.inner.workflows.read().await.get(&id).cloned();
        let durable = self.inner.repository.load_workflow(id).await.ok().flatten();
        match (memory, durable) {
            (Some(mut snapshot), Some(row)) => {
                snapshot.status = row.status;
                snapshot.started_at = row.started_at;
                snapshot.ended_at = row.ended_at;
                snapshot.total_duration_ms = row.total_duration_ms;
                Ok(snapshot)
            }
            (Some(snapshot), None) => Ok(snapshot),
            (None, Some(row)) => Ok(row),
            (None, None) => Err(DirigentError::InvalidInput(format!("unknown workflow {id}"))),
        }
    }

    /// Workflows newest first, merging the durable store with anything still
    /// memory-only.
    pub async fn list_workflows(&self, filter: WorkflowFilter) -> Vec<Workflow> {
        let mut listed = self
            .inner
            .repository
            .list_workflows(filter)
            .await
            .unwrap_or_default();
        let known: HashSet<Uuid> = listed.iter().map(|w| w.id).collect();
        for workflow in self.inner.workflows.read().await.values() {
            let matches = filter.status.map_or(true, |s| workflow.status == s);
            if matches && !known.contains(&workflow.id) {
                listed.push(workflow.clone());
            }
        }
        listed.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        listed
    }

    /// Cancels a non-terminal workflow: queued tasks are dropped, running
    /// tasks are signalled, and the workflow ends `failed` with the reason in
    /// its metadata.
    pub async fn cancel_workflow(&self, id: Uuid, reason: &str) -> DirigentResult<()> {
        self.inner.cancel_workflow(id, reason, "operator").await
    }

    /// Records an executive decision against the pending approval request.
    pub async fn record_approval_decision(
        &self,
        workflow_id: Uuid,
        decision: Decision,
        approver: &str,
        comments: &str,
    ) -> DirigentResult<Workflow> {
        self.inner
            .record_decision(workflow_id, decision, approver, comments)
            .await
    }

    /// Forces a workflow to `completed` past the approval gate. The reason
    /// is mandatory and lands in a high-severity audit entry.
    pub async fn emergency_unblock(
        &self,
        workflow_id: Uuid,
        approver: &str,
        reason: &str,
    ) -> DirigentResult<Workflow> {
        self.inner
            .emergency_unblock(workflow_id, approver, reason)
            .await
    }

    /// The pending or decided approval request for a workflow.
    pub async fn approval_request(&self, workflow_id: Uuid) -> Option<ApprovalRequest> {
        self.inner
            .repository
            .load_approval(workflow_id)
            .await
            .ok()
            .flatten()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

impl EngineInner {
    fn manager_agent(&self) -> String {
        self.roster
            .by_role(AgentRole::Manager)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "manager".into())
    }

    async fn admit(
        self: &Arc<Self>,
        workflow: Workflow,
        tasks: Vec<Task>,
        estimate: Option<PlanEstimate>,
        awaiting_clarification: bool,
    ) -> DirigentResult<Workflow> {
        if has_cycle(&tasks) {
            self.append_audit(
                AuditEntry::new("orchestrator", "plan_rejected", "workflow", workflow.id.to_string())
                    .with_metadata(serde_json::json!({"reason": "dependency cycle"}))
                    .high_severity(),
            )
            .await;
            return Err(DirigentError::DependencyCycle(format!(
                "planner produced a cyclic task graph for workflow {}",
                workflow.id
            )));
        }

        let mut workflow = workflow.with_tasks(tasks);
        if awaiting_clarification {
            workflow.status = WorkflowStatus::AwaitingClarification;
        }
        if let Some(estimate) = estimate {
            workflow.metadata.insert(
                "estimate".into(),
                serde_json::to_value(&estimate).unwrap_or(serde_json::Value::Null),
            );
        }

        let id = workflow.id;
        info!(workflow_id = %id, tasks = workflow.tasks.len(), "workflow created");

        let ready: Vec<QueueEntry> = workflow
            .tasks
            .iter()
            .filter(|t| t.dependencies.is_empty())
            .map(|t| QueueEntry {
                workflow_id: id,
                task_id: t.id,
                agent: t.agent.clone(),
            })
            .collect();

        self.workflows.write().await.insert(id, workflow.clone());
        self.persist_workflow(&workflow).await;
        self.bus.emit(EngineEvent::WorkflowCreated {
            workflow_id: id,
            directive: workflow.directive.clone(),
        });
        self.append_audit(AuditEntry::new(
            "orchestrator",
            "workflow_created",
            "workflow",
            id.to_string(),
        ))
        .await;

        for entry in ready {
            self.bus.emit(EngineEvent::TaskQueued {
                workflow_id: id,
                task_id: entry.task_id,
                agent: entry.agent.clone(),
            });
            self.scheduler.enqueue(entry);
        }

        if let Some(budget) = self.config.workflow_timeout() {
            let watchdog = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                let _ = watchdog.cancel_workflow(id, "timeout", "orchestrator").await;
            });
        }

        Ok(workflow)
    }

    /// One pass of the dispatch loop: pull and start every currently
    /// dispatchable task.
    async fn dispatch_ready(self: &Arc<Self>) {
        loop {
            let entry = {
                let workflows = self.workflows.read().await;
                // Optional global cap: workflows with a running task count
                // against it; others must wait for a slot.
                let cap = self.config.max_concurrent_workflows;
                let executing: HashSet<Uuid> = workflows
                    .values()
                    .filter(|w| w.tasks.iter().any(|t| t.status == TaskStatus::Running))
                    .map(|w| w.id)
                    .collect();
                self.scheduler.select(|entry| {
                    let within_cap = cap.map_or(true, |limit| {
                        executing.contains(&entry.workflow_id) || executing.len() < limit
                    });
                    within_cap
                        && workflows
                            .get(&entry.workflow_id)
                            .and_then(|w| {
                                let active = !w.is_terminal()
                                    && w.status != WorkflowStatus::WaitingForCeoApproval;
                                let task = w.task(entry.task_id)?;
                                Some(active && task.status == TaskStatus::Pending)
                            })
                            .unwrap_or(false)
                })
            };
            match entry {
                Some(entry) => self.start_task(entry).await,
                None => break,
            }
        }
    }

    async fn start_task(self: &Arc<Self>, entry: QueueEntry) {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let Some(workflow) = workflows.get_mut(&entry.workflow_id) else {
                self.scheduler.release_agent(&entry.agent);
                return;
            };
            let now = self.clock.now();
            let Some(task) = workflow.task_mut(entry.task_id) else {
                self.scheduler.release_agent(&entry.agent);
                return;
            };
            if task.status != TaskStatus::Pending {
                self.scheduler.release_agent(&entry.agent);
                return;
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            let task_snapshot = task.clone();

            if matches!(
                workflow.status,
                WorkflowStatus::Planned | WorkflowStatus::AwaitingClarification
            ) {
                workflow.status = WorkflowStatus::InProgress;
            }
            update_execution_status(workflow);
            (workflow.clone(), task_snapshot)
        };
        let (workflow_snapshot, task_snapshot) = snapshot;

        self.bus.emit(EngineEvent::TaskStarted {
            workflow_id: entry.workflow_id,
            task_id: entry.task_id,
            agent: entry.agent.clone(),
        });
        self.bus.emit(EngineEvent::WorkflowProgress {
            workflow_id: entry.workflow_id,
            progress: workflow_snapshot.progress,
            status: workflow_snapshot.status,
        });
        self.persist_workflow(&workflow_snapshot).await;

        let executor = match self.executors.get(&entry.agent) {
            Ok(executor) => executor,
            Err(err) => {
                error!(agent = %entry.agent, error = %err, "no executor for agent");
                self.complete_task(
                    entry.workflow_id,
                    entry.task_id,
                    TaskStatus::Failed,
                    None,
                    Some(format!("no executor for agent '{}'", entry.agent)),
                )
                .await;
                return;
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.scheduler.register_cancel(entry.task_id, cancel_tx);

        let runner = self.clone();
        tokio::spawn(async move {
            let outcome = executor.execute(&task_snapshot, cancel_rx).await;
            runner
                .complete_task(
                    entry.workflow_id,
                    entry.task_id,
                    outcome.status,
                    Some(outcome.exit),
                    outcome.error,
                )
                .await;
        });
    }

    /// Applies a task's terminal outcome: updates the task, frees the agent,
    /// promotes ready dependents, cancels the dependents of a failure, and
    /// runs the settlement checks (manager review, approval submission,
    /// workflow termination).
    async fn complete_task(
        self: &Arc<Self>,
        workflow_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        exit: Option<dirigent_core::ExitRecord>,
        error_reason: Option<String>,
    ) {
        let mut events: Vec<EngineEvent> = Vec::new();
        let mut new_entries: Vec<QueueEntry> = Vec::new();
        let mut released_agent: Option<String> = None;
        let mut snapshot: Option<Workflow> = None;
        let mut approval_to_save: Option<ApprovalRequest> = None;
        let mut artifact_ids: Vec<Uuid> = Vec::new();

        {
            let mut workflows = self.workflows.write().await;
            let now = self.clock.now();
            if let Some(workflow) = workflows.get_mut(&workflow_id) {
                let Some(task) = workflow.task_mut(task_id) else {
                    return;
                };
                if task.is_terminal() {
                    // Cancelled under our feet (workflow cancel); the slot
                    // was busy until the executor came back, free it now.
                    self.scheduler.clear_cancel(task_id);
                    self.scheduler.release_agent(&task.agent.clone());
                    return;
                }

                task.status = status;
                task.ended_at = Some(now);
                if let Some(exit) = exit {
                    artifact_ids = exit.artifact_ids.clone();
                    task.exit = Some(exit);
                }
                task.error = error_reason.clone();
                let agent = task.agent.clone();
                let title = task.title.clone();
                released_agent = Some(agent.clone());
                self.scheduler.clear_cancel(task_id);
                workflow.artifact_ids.extend(artifact_ids.iter().copied());

                match status {
                    TaskStatus::Completed => {
                        events.push(EngineEvent::TaskCompleted {
                            workflow_id,
                            task_id,
                        });
                        promote_ready_dependents(workflow, task_id, &mut events, &mut new_entries);
                    }
                    TaskStatus::Failed => {
                        let reason =
                            error_reason.unwrap_or_else(|| "command exited non-zero".into());
                        workflow
                            .push_failure_reason(format!("task '{title}' failed: {reason}"));
                        events.push(EngineEvent::TaskFailed {
                            workflow_id,
                            task_id,
                            reason,
                        });
                        cancel_dependents(workflow, task_id, now, &mut events);
                    }
                    TaskStatus::Cancelled => {
                        events.push(EngineEvent::TaskCancelled {
                            workflow_id,
                            task_id,
                            reason: error_reason.unwrap_or_else(|| "cancelled".into()),
                        });
                    }
                    _ => {}
                }

                workflow.recompute_progress();
                update_execution_status(workflow);
                events.push(EngineEvent::WorkflowProgress {
                    workflow_id,
                    progress: workflow.progress,
                    status: workflow.status,
                });

                self.settle(workflow, now, &mut events, &mut new_entries, &mut approval_to_save)
                    .await;
                snapshot = Some(workflow.clone());
            }
        }

        if let Some(agent) = &released_agent {
            self.scheduler.release_agent(agent);
        }
        for event in events {
            self.bus.emit(event);
        }
        for artifact_id in artifact_ids {
            if let Some(artifact) = self.lineage.get(artifact_id).await {
                self.persist_artifact(&artifact).await;
            }
        }
        if let Some(request) = approval_to_save {
            self.persist_approval(&request).await;
        }
        if let Some(workflow) = snapshot {
            self.persist_workflow(&workflow).await;
            if workflow.status == WorkflowStatus::Failed {
                self.append_audit(
                    AuditEntry::new("orchestrator", "workflow_failed", "workflow", workflow_id.to_string())
                        .with_metadata(serde_json::json!({
                            "reasons": workflow.failure_reasons()
                        })),
                )
                .await;
            }
        }
        for entry in new_entries {
            self.scheduler.enqueue(entry);
        }
        self.scheduler.kick();
    }

    /// Settlement rules, run after every terminal task transition:
    ///
    /// - every task settled with a failure → workflow `failed`;
    /// - every work task completed and no review task yet → append the
    ///   manager-review task;
    /// - review completed and no live approval request → freeze at
    ///   `waiting_for_ceo_approval` and submit the request.
    async fn settle(
        &self,
        workflow: &mut Workflow,
        now: chrono::DateTime<chrono::Utc>,
        events: &mut Vec<EngineEvent>,
        new_entries: &mut Vec<QueueEntry>,
        approval_to_save: &mut Option<ApprovalRequest>,
    ) {
        if workflow.is_terminal() || !workflow.tasks.iter().all(Task::is_terminal) {
            return;
        }

        if workflow.progress.failed > 0 {
            workflow.finish(WorkflowStatus::Failed, now);
            events.push(EngineEvent::WorkflowFailed {
                workflow_id: workflow.id,
                reasons: workflow.failure_reasons(),
            });
            return;
        }

        let review_status = workflow
            .tasks
            .iter()
            .rev()
            .find(|t| t.kind == TaskKind::ManagerReview)
            .map(|t| t.status);
        match review_status {
            None => {
                let dependencies: Vec<Uuid> = workflow.tasks.iter().map(|t| t.id).collect();
                let review_task = Task::new(
                    workflow.id,
                    "Review deliverables",
                    self.manager_agent(),
                )
                .with_description(
                    "Collect the produced artifacts and summarize them for sign-off".to_string(),
                )
                .with_kind(TaskKind::ManagerReview)
                .with_dependencies(dependencies)
                .with_estimate(300);
                let entry = QueueEntry {
                    workflow_id: workflow.id,
                    task_id: review_task.id,
                    agent: review_task.agent.clone(),
                };
                events.push(EngineEvent::TaskQueued {
                    workflow_id: workflow.id,
                    task_id: review_task.id,
                    agent: review_task.agent.clone(),
                });
                workflow.tasks.push(review_task);
                workflow.recompute_progress();
                events.push(EngineEvent::WorkflowProgress {
                    workflow_id: workflow.id,
                    progress: workflow.progress,
                    status: workflow.status,
                });
                new_entries.push(entry);
            }
            Some(TaskStatus::Completed) => {
                let live = matches!(
                    self.repository.load_approval(workflow.id).await,
                    Ok(Some(request)) if request.status != ApprovalStatus::NeedsRevision
                );
                if !live {
                    let artifact_count = self.lineage.for_workflow(workflow.id).await.len();
                    let summary = self.gate.summarize(workflow, artifact_count);
                    let request = ApprovalRequest::new(workflow.id, "orchestrator", summary);
                    workflow.status = WorkflowStatus::WaitingForCeoApproval;
                    info!(
                        workflow_id = %workflow.id,
                        quality = request.summary.quality_score,
                        risk = ?request.summary.risk_level,
                        "submitted for executive approval"
                    );
                    events.push(EngineEvent::ApprovalRequested {
                        workflow_id: workflow.id,
                        request_id: request.id,
                    });
                    *approval_to_save = Some(request);
                }
            }
            Some(_) => {}
        }
    }

    async fn record_decision(
        self: &Arc<Self>,
        workflow_id: Uuid,
        decision: Decision,
        approver: &str,
        comments: &str,
    ) -> DirigentResult<Workflow> {
        let mut request = self
            .repository
            .load_approval(workflow_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| {
                DirigentError::InvalidInput(format!(
                    "workflow {workflow_id} has no approval request"
                ))
            })?;
        if !request.is_pending() {
            return Err(DirigentError::InvalidInput(format!(
                "approval request for workflow {workflow_id} is already decided"
            )));
        }

        let mut events: Vec<EngineEvent> = Vec::new();
        let mut new_entries: Vec<QueueEntry> = Vec::new();
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let now = self.clock.now();
            let workflow = workflows
                .get_mut(&workflow_id)
                .ok_or_else(|| {
                    DirigentError::InvalidInput(format!("unknown workflow {workflow_id}"))
                })?;
            if workflow.status != WorkflowStatus::WaitingForCeoApproval {
                return Err(DirigentError::InvalidInput(format!(
                    "workflow {workflow_id} is not waiting for approval (status: {})",
                    workflow.status
                )));
            }

            request.decided_by = Some(approver.to_string());
            request.comments = Some(comments.to_string());
            request.decided_at = Some(now);

            match decision {
                Decision::Approved => {
                    request.status = ApprovalStatus::Approved;
                    workflow.metadata.insert(
                        "approval".into(),
                        serde_json::json!({"approver": approver, "comments": comments}),
                    );
                    workflow.finish(WorkflowStatus::Completed, now);
                    events.push(EngineEvent::ApprovalDecision {
                        workflow_id,
                        decision: ApprovalStatus::Approved,
                        approver: approver.to_string(),
                    });
                    events.push(EngineEvent::WorkflowCompleted { workflow_id });
                }
                Decision::Rejected => {
                    request.status = ApprovalStatus::Rejected;
                    workflow.metadata.insert(
                        "approval".into(),
                        serde_json::json!({"approver": approver, "comments": comments}),
                    );
                    workflow.finish(WorkflowStatus::Rejected, now);
                    events.push(EngineEvent::ApprovalDecision {
                        workflow_id,
                        decision: ApprovalStatus::Rejected,
                        approver: approver.to_string(),
                    });
                }
                Decision::NeedsRevision => {
                    request.status = ApprovalStatus::NeedsRevision;
                    let revision = Task::new(workflow_id, "Revision pass", self.manager_agent())
                        .with_description(format!("Address reviewer comments: {comments}"))
                        .with_kind(TaskKind::Revision)
                        .with_commands(vec![
                            "mkdir -p revisions".into(),
                            format!(
                                "printf '%s\\n' 'revision noted' > revisions/{workflow_id}.md"
                            ),
                        ])
                        .with_estimate(600);
                    events.push(EngineEvent::ApprovalDecision {
                        workflow_id,
                        decision: ApprovalStatus::NeedsRevision,
                        approver: approver.to_string(),
                    });
                    events.push(EngineEvent::TaskQueued {
                        workflow_id,
                        task_id: revision.id,
                        agent: revision.agent.clone(),
                    });
                    new_entries.push(QueueEntry {
                        workflow_id,
                        task_id: revision.id,
                        agent: revision.agent.clone(),
                    });
                    workflow.status = WorkflowStatus::InProgress;
                    workflow.tasks.push(revision);
                    workflow.recompute_progress();
                    events.push(EngineEvent::WorkflowProgress {
                        workflow_id,
                        progress: workflow.progress,
                        status: workflow.status,
                    });
                }
            }
            workflow.clone()
        };

        for event in events {
            self.bus.emit(event);
        }
        self.persist_approval(&request).await;
        self.persist_workflow(&snapshot).await;
        self.append_audit(
            AuditEntry::new(approver, "approval_decision", "workflow", workflow_id.to_string())
                .with_metadata(serde_json::json!({
                    "decision": request.status,
                    "comments": comments,
                })),
        )
        .await;
        for entry in new_entries {
            self.scheduler.enqueue(entry);
        }
        Ok(snapshot)
    }

    async fn emergency_unblock(
        self: &Arc<Self>,
        workflow_id: Uuid,
        approver: &str,
        reason: &str,
    ) -> DirigentResult<Workflow> {
        if reason.trim().is_empty() {
            return Err(DirigentError::InvalidInput(
                "emergency unblock requires a non-empty reason".into(),
            ));
        }

        let (snapshot, mut request) = {
            let mut workflows = self.workflows.write().await;
            let now = self.clock.now();
            let workflow = workflows
                .get_mut(&workflow_id)
                .ok_or_else(|| {
                    DirigentError::InvalidInput(format!("unknown workflow {workflow_id}"))
                })?;
            if workflow.is_terminal() {
                return Err(DirigentError::InvalidInput(format!(
                    "workflow {workflow_id} is already terminal"
                )));
            }

            let request = match self.repository.load_approval(workflow_id).await {
                Ok(Some(existing)) => existing,
                _ => {
                    let artifact_count = self.lineage.for_workflow(workflow_id).await.len();
                    let summary = self.gate.summarize(workflow, artifact_count);
                    ApprovalRequest::new(workflow_id, approver, summary)
                }
            };

            workflow.metadata.insert(
                "emergencyUnblock".into(),
                serde_json::json!({"approver": approver, "reason": reason}),
            );
            workflow.finish(WorkflowStatus::Completed, now);
            (workflow.clone(), request)
        };

        request.status = ApprovalStatus::EmergencyApproved;
        request.decided_by = Some(approver.to_string());
        request.comments = Some(reason.to_string());
        request.decided_at = Some(self.clock.now());

        warn!(workflow_id = %workflow_id, approver = %approver, reason = %reason, "emergency unblock");
        self.bus.emit(EngineEvent::EmergencyUnblock {
            workflow_id,
            approver: approver.to_string(),
            reason: reason.to_string(),
        });
        self.bus.emit(EngineEvent::WorkflowCompleted { workflow_id });
        self.persist_approval(&request).await;
        self.persist_workflow(&snapshot).await;
        self.append_audit(
            AuditEntry::new(approver, "emergency_unblock", "workflow", workflow_id.to_string())
                .with_metadata(serde_json::json!({"reason": reason}))
                .high_severity(),
        )
        .await;
        Ok(snapshot)
    }

    async fn cancel_workflow(
        self: &Arc<Self>,
        workflow_id: Uuid,
        reason: &str,
        actor: &str,
    ) -> DirigentResult<()> {
        self.scheduler.drain_workflow(workflow_id);

        let mut events: Vec<EngineEvent> = Vec::new();
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let now = self.clock.now();
            let workflow = workflows
                .get_mut(&workflow_id)
                .ok_or_else(|| {
                    DirigentError::InvalidInput(format!("unknown workflow {workflow_id}"))
                })?;
            if workflow.is_terminal() {
                return Err(DirigentError::InvalidInput(format!(
                    "workflow {workflow_id} is already terminal"
                )));
            }

            for task in &mut workflow.tasks {
                if !task.is_terminal() {
                    if task.status == TaskStatus::Running {
                        self.scheduler.cancel_running(task.id);
                    }
                    task.status = TaskStatus::Cancelled;
                    task.ended_at = Some(now);
                    task.error = Some(reason.to_string());
                    events.push(EngineEvent::TaskCancelled {
                        workflow_id,
                        task_id: task.id,
                        reason: reason.to_string(),
                    });
                }
            }

            workflow.recompute_progress();
            workflow
                .metadata
                .insert("cancelReason".into(), serde_json::json!(reason));
            workflow.push_failure_reason(format!("cancelled: {reason}"));
            workflow.finish(WorkflowStatus::Failed, now);
            events.push(EngineEvent::WorkflowCancelled {
                workflow_id,
                reason: reason.to_string(),
            });
            workflow.clone()
        };

        info!(workflow_id = %workflow_id, reason = %reason, "workflow cancelled");
        for event in events {
            self.bus.emit(event);
        }
        self.persist_workflow(&snapshot).await;
        self.append_audit(
            AuditEntry::new(actor, "workflow_cancelled", "workflow", workflow_id.to_string())
                .with_metadata(serde_json::json!({"reason": reason})),
        )
        .await;
        Ok(())
    }

    /// Bounded-retry persistence; memory stays authoritative and a
    /// `persistence_degraded` event is emitted on exhaustion.
    async fn persist_workflow(&self, workflow: &Workflow) {
        let retry = self.config.retry;
        for attempt in 1..=retry.max_attempts {
            match self.repository.save_workflow(workflow).await {
                Ok(()) => return,
                Err(RepositoryError::Transient(detail)) => {
                    warn!(
                        workflow_id = %workflow.id,
                        attempt,
                        detail = %detail,
                        "transient persistence failure"
                    );
                    if attempt < retry.max_attempts {
                        tokio::time::sleep(retry.backoff_after(attempt)).await;
                    }
                }
                Err(RepositoryError::Terminal(detail)) => {
                    error!(workflow_id = %workflow.id, detail = %detail, "terminal persistence failure");
                    self.bus.emit(EngineEvent::PersistenceDegraded {
                        detail: format!("save_workflow({}): {detail}", workflow.id),
                    });
                    self.append_audit(
                        AuditEntry::new(
                            "orchestrator",
                            "persistence_terminal",
                            "workflow",
                            workflow.id.to_string(),
                        )
                        .with_metadata(serde_json::json!({"detail": detail}))
                        .high_severity(),
                    )
                    .await;
                    return;
                }
            }
        }
        self.bus.emit(EngineEvent::PersistenceDegraded {
            detail: format!("save_workflow({}) retries exhausted", workflow.id),
        });
    }

    async fn persist_approval(&self, request: &ApprovalRequest) {
        let retry = self.config.retry;
        for attempt in 1..=retry.max_attempts {
            match self.repository.save_approval(request).await {
                Ok(()) => return,
                Err(RepositoryError::Transient(_)) if attempt < retry.max_attempts => {
                    tokio::time::sleep(retry.backoff_after(attempt)).await;
                }
                Err(_) => break,
            }
        }
        self.bus.emit(EngineEvent::PersistenceDegraded {
            detail: format!("save_approval({})", request.workflow_id),
        });
    }

    async fn persist_artifact(&self, artifact: &dirigent_core::Artifact) {
        if self.repository.save_artifact(artifact).await.is_err() {
            self.bus.emit(EngineEvent::PersistenceDegraded {
                detail: format!("save_artifact({})", artifact.id),
            });
        }
    }

    async fn append_audit(&self, entry: AuditEntry) {
        if let Err(err) = self.repository.append_audit(&entry).await {
            warn!(error = %err, action = %entry.action, "audit append failed");
        }
    }
}

fn repo_error(err: RepositoryError) -> DirigentError {
    match err {
        RepositoryError::Transient(detail) => DirigentError::PersistenceTransient(detail),
        RepositoryError::Terminal(detail) => DirigentError::PersistenceTerminal(detail),
    }
}

/// `in_progress → executing` once more than half of the tasks are past
/// pending.
fn update_execution_status(workflow: &mut Workflow) {
    if workflow.status == WorkflowStatus::InProgress {
        let past_pending = workflow
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Pending)
            .count();
        if past_pending * 2 > workflow.tasks.len() {
            workflow.status = WorkflowStatus::Executing;
        }
    }
}

/// Queues each pending dependent of `finished` whose dependency set is now
/// fully completed. A task enters the ready queue exactly once: when its
/// final dependency completes.
fn promote_ready_dependents(
    workflow: &mut Workflow,
    finished: Uuid,
    events: &mut Vec<EngineEvent>,
    new_entries: &mut Vec<QueueEntry>,
) {
    let completed: HashSet<Uuid> = workflow
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id)
        .collect();
    for task in &workflow.tasks {
        if task.status == TaskStatus::Pending
            && task.dependencies.contains(&finished)
            && task.dependencies.iter().all(|dep| completed.contains(dep))
        {
            events.push(EngineEvent::TaskQueued {
                workflow_id: workflow.id,
                task_id: task.id,
                agent: task.agent.clone(),
            });
            new_entries.push(QueueEntry {
                workflow_id: workflow.id,
                task_id: task.id,
                agent: task.agent.clone(),
            });
        }
    }
}

/// Cancels, transitively, every pending task that depends on a failed or
/// already-cancelled task.
fn cancel_dependents(
    workflow: &mut Workflow,
    failed_task: Uuid,
    now: chrono::DateTime<chrono::Utc>,
    events: &mut Vec<EngineEvent>,
) {
    let workflow_id = workflow.id;
    let mut doomed: HashSet<Uuid> = HashSet::new();
    doomed.insert(failed_task);
    loop {
        let mut changed = false;
        for task in &mut workflow.tasks {
            if !task.is_terminal() && task.dependencies.iter().any(|dep| doomed.contains(dep)) {
                task.status = TaskStatus::Cancelled;
                task.ended_at = Some(now);
                task.error = Some("upstream failed".into());
                doomed.insert(task.id);
                events.push(EngineEvent::TaskCancelled {
                    workflow_id,
                    task_id: task.id,
                    reason: "upstream failed".into(),
                });
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dirigent_core::Progress;

    fn workflow_with_chain() -> (Workflow, Uuid, Uuid, Uuid) {
        let mut workflow = Workflow::new("chain");
        let id = workflow.id;
        let a = Task::new(id, "a", "one");
        let b = Task::new(id, "b", "two").with_dependencies(vec![a.id]);
        let c = Task::new(id, "c", "three").with_dependencies(vec![b.id]);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        workflow = workflow.with_tasks(vec![a, b, c]);
        (workflow, a_id, b_id, c_id)
    }

    #[test]
    fn test_cancel_dependents_is_transitive() {
        let (mut workflow, a_id, b_id, c_id) = workflow_with_chain();
        workflow.task_mut(a_id).unwrap().status = TaskStatus::Failed;
        let mut events = Vec::new();
        cancel_dependents(&mut workflow, a_id, chrono::Utc::now(), &mut events);

        assert_eq!(workflow.task(b_id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(workflow.task(c_id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(
            workflow.task(c_id).unwrap().error.as_deref(),
            Some("upstream failed")
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_promote_ready_dependents_waits_for_all_deps() {
        let mut workflow = Workflow::new("diamond");
        let id = workflow.id;
        let left = Task::new(id, "left", "a");
        let right = Task::new(id, "right", "b");
        let join = Task::new(id, "join", "c").with_dependencies(vec![left.id, right.id]);
        let (left_id, join_id) = (left.id, join.id);
        workflow = workflow.with_tasks(vec![left, right, join]);

        workflow.task_mut(left_id).unwrap().status = TaskStatus::Completed;
        let mut events = Vec::new();
        let mut entries = Vec::new();
        promote_ready_dependents(&mut workflow, left_id, &mut events, &mut entries);
        assert!(entries.is_empty(), "join must wait for both dependencies");

        let mut right_id = Uuid::nil();
        for task in &mut workflow.tasks {
            if task.id != join_id {
                if task.title == "right" {
                    right_id = task.id;
                }
                task.status = TaskStatus::Completed;
            }
        }
        promote_ready_dependents(&mut workflow, right_id, &mut events, &mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, join_id);
    }

    #[test]
    fn test_update_execution_status_majority_rule() {
        let (mut workflow, a_id, b_id, _c) = workflow_with_chain();
        workflow.status = WorkflowStatus::InProgress;
        workflow.task_mut(a_id).unwrap().status = TaskStatus::Completed;
        update_execution_status(&mut workflow);
        assert_eq!(workflow.status, WorkflowStatus::InProgress);

        workflow.task_mut(b_id).unwrap().status = TaskStatus::Running;
        update_execution_status(&mut workflow);
        assert_eq!(workflow.status, WorkflowStatus::Executing);
    }

    #[test]
    fn test_progress_invariant_after_cancellation() {
        let (mut workflow, a_id, _b, _c) = workflow_with_chain();
        workflow.task_mut(a_id).unwrap().status = TaskStatus::Failed;
        let mut events = Vec::new();
        cancel_dependents(&mut workflow, a_id, chrono::Utc::now(), &mut events);
        workflow.recompute_progress();
        let Progress {
            completed,
            failed,
            total,
            ..
        } = workflow.progress;
        assert_eq!(completed + failed, total);
    }
}
