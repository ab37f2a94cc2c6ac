use crate::estimate::{price_plan, PlanEstimate};
use crate::templates::instantiate;
use dirigent_core::{
    AgentRegistry, DirigentResult, FinalizedBrief, ProjectKind, Task,
};
use tracing::info;
use uuid::Uuid;

/// A planned task DAG with its duration estimate.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    /// Tasks in topological order, dependencies wired, estimates priced.
    pub tasks: Vec<Task>,
    /// Plan-level duration numbers.
    pub estimate: PlanEstimate,
}

/// Rule-based, deterministic workflow planner.
///
/// Template selection dispatches on the brief's [`ProjectKind`] tag; the
/// roster supplies agent names per role. Two identical finalized briefs
/// produce identical topologies, assignments, and estimates.
pub struct Planner {
    roster: AgentRegistry,
}

impl Planner {
    /// Creates a planner over the given roster.
    pub fn new(roster: AgentRegistry) -> Self {
        Self { roster }
    }

    /// Plans a workflow from a finalized brief.
    pub fn plan(&self, workflow_id: Uuid, brief: &FinalizedBrief) -> DirigentResult<TaskPlan> {
        let mut tasks = instantiate(workflow_id, brief, &self.roster);
        let estimate = price_plan(&mut tasks, &brief.scope, &self.roster);
        info!(
            workflow_id = %workflow_id,
            kind = %brief.kind,
            tasks = tasks.len(),
            parallel_secs = estimate.estimated_parallel_secs,
            "plan built"
        );
        Ok(TaskPlan { tasks, estimate })
    }

    /// Plans directly from a raw directive with default scope and timeline,
    /// for workflows created without a brief.
    pub fn plan_directive(&self, workflow_id: Uuid, directive: &str) -> DirigentResult<TaskPlan> {
        let brief = FinalizedBrief {
            directive: directive.to_string(),
            kind: classify_for_plan(directive),
            scope: "prototype".into(),
            timeline: "standard".into(),
            key_features: Vec::new(),
            target_users: "general audience".into(),
            suggested_agents: Vec::new(),
            requested_agent: None,
            agent_explicit: false,
        };
        self.plan(workflow_id, &brief)
    }
}

/// Kind classification for brief-less planning. Mirrors the brief manager's
/// classifier so both paths pick the same template for the same text.
fn classify_for_plan(directive: &str) -> ProjectKind {
    let lower = directive.to_lowercase();
    let has = |needle: &str| lower.contains(needle);
    if has("brainstorm") || has("idea") {
        ProjectKind::Brainstorm
    } else if has("dashboard") {
        ProjectKind::Dashboard
    } else if has("fullstack") || has("full-stack") || has("full stack") || has("web app") {
        ProjectKind::Fullstack
    } else if has("landing page") || has("website") || has("web site") || has("homepage")
        || has("site") || has("page")
    {
        ProjectKind::Website
    } else {
        ProjectKind::Generic
    }
}
