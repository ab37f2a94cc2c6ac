use dirigent_core::{AgentRegistry, AgentRole, Task};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Base duration per role, in seconds.
fn base_secs(role: AgentRole) -> u64 {
    match role {
        AgentRole::Manager => 600,
        AgentRole::Designer => 1200,
        AgentRole::Frontend => 1800,
        AgentRole::Backend => 1800,
        AgentRole::Security => 900,
        AgentRole::Research => 900,
        AgentRole::Writer => 900,
    }
}

/// Scope multiplier applied to every base duration.
fn scope_multiplier(scope: &str) -> f64 {
    match scope {
        "production" => 1.6,
        "full-featured" => 1.3,
        _ => 1.0,
    }
}

/// Duration estimates for a planned task DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEstimate {
    /// Sum of every task's estimate.
    pub total_sequential_secs: u64,
    /// Longest-path duration with each agent treated as one serialized
    /// resource: tasks sharing an agent queue into that agent's chain.
    pub estimated_parallel_secs: u64,
    /// Agents that appear in the plan, in first-use order.
    pub available_agents: Vec<String>,
    /// Total estimated seconds per agent.
    pub per_agent_secs: HashMap<String, u64>,
    /// One-paragraph human explanation of the numbers.
    pub explanation: String,
}

/// Prices each task from the role table and scope, writing the estimate onto
/// the tasks, and computes the plan-level numbers.
///
/// The parallel estimate is a list-scheduling pass over the tasks in the
/// order the planner emitted them (already topological): a task starts at
/// the later of its dependencies' finish and its agent's availability.
pub(crate) fn price_plan(
    tasks: &mut [Task],
    scope: &str,
    roster: &AgentRegistry,
) -> PlanEstimate {
    let multiplier = scope_multiplier(scope);
    for task in tasks.iter_mut() {
        let base = roster
            .by_name(&task.agent)
            .map(|p| base_secs(p.role))
            .unwrap_or(900);
        task.estimated_secs = (base as f64 * multiplier).round() as u64;
    }

    let mut finish_at: HashMap<Uuid, u64> = HashMap::new();
    let mut agent_free: HashMap<String, u64> = HashMap::new();
    let mut agents_in_order: Vec<String> = Vec::new();
    let mut per_agent: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;
    let mut makespan = 0u64;

    for task in tasks.iter() {
        total += task.estimated_secs;
        *per_agent.entry(task.agent.clone()).or_default() += task.estimated_secs;
        if !agents_in_order.contains(&task.agent) {
            agents_in_order.push(task.agent.clone());
        }

        let deps_done = task
            .dependencies
            .iter()
            .filter_map(|dep| finish_at.get(dep).copied())
            .max()
            .unwrap_or(0);
        let agent_ready = agent_free.get(&task.agent).copied().unwrap_or(0);
        let start = deps_done.max(agent_ready);
        let finish = start + task.estimated_secs;
        finish_at.insert(task.id, finish);
        agent_free.insert(task.agent.clone(), finish);
        makespan = makespan.max(finish);
    }

    let explanation = format!(
        "{} tasks across {} agents: about {} minutes end to end with agents working \
         in parallel ({} minutes if everything ran back to back).",
        tasks.len(),
        agents_in_order.len(),
        makespan.div_ceil(60),
        total.div_ceil(60),
    );

    PlanEstimate {
        total_sequential_secs: total,
        estimated_parallel_secs: makespan,
        available_agents: agents_in_order,
        per_agent_secs: per_agent,
        explanation,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn chain(workflow: Uuid, agents: &[&str]) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::new();
        for (i, agent) in agents.iter().enumerate() {
            let mut task = Task::new(workflow, format!("t{i}"), *agent);
            if let Some(prev) = tasks.last() {
                task = task.with_dependencies(vec![prev.id]);
            }
            tasks.push(task);
        }
        tasks
    }

    #[test]
    fn test_sequential_chain_sums() {
        let roster = AgentRegistry::default_roster();
        let mut tasks = chain(Uuid::new_v4(), &["manager", "designer", "frontend"]);
        let estimate = price_plan(&mut tasks, "prototype", &roster);
        assert_eq!(estimate.total_sequential_secs, 600 + 1200 + 1800);
        // A pure chain cannot parallelize.
        assert_eq!(estimate.estimated_parallel_secs, estimate.total_sequential_secs);
    }

    #[test]
    fn test_parallel_branches_shorten_makespan() {
        let roster = AgentRegistry::default_roster();
        let workflow = Uuid::new_v4();
        let plan = Task::new(workflow, "plan", "manager");
        let plan_id = plan.id;
        let a = Task::new(workflow, "a", "designer").with_dependencies(vec![plan_id]);
        let b = Task::new(workflow, "b", "backend").with_dependencies(vec![plan_id]);
        let mut tasks = vec![plan, a, b];
        let estimate = price_plan(&mut tasks, "prototype", &roster);
        assert_eq!(estimate.total_sequential_secs, 600 + 1200 + 1800);
        // manager, then designer and backend overlap.
        assert_eq!(estimate.estimated_parallel_secs, 600 + 1800);
    }

    #[test]
    fn test_same_agent_serializes_into_one_chain() {
        let roster = AgentRegistry::default_roster();
        let workflow = Uuid::new_v4();
        let plan = Task::new(workflow, "plan", "manager");
        let plan_id = plan.id;
        let a = Task::new(workflow, "a", "backend").with_dependencies(vec![plan_id]);
        let b = Task::new(workflow, "b", "backend").with_dependencies(vec![plan_id]);
        let mut tasks = vec![plan, a, b];
        let estimate = price_plan(&mut tasks, "prototype", &roster);
        // The two backend tasks cannot overlap.
        assert_eq!(estimate.estimated_parallel_secs, 600 + 1800 + 1800);
    }

    #[test]
    fn test_production_scope_multiplier() {
        let roster = AgentRegistry::default_roster();
        let mut tasks = chain(Uuid::new_v4(), &["manager"]);
        let estimate = price_plan(&mut tasks, "production", &roster);
        assert_eq!(estimate.total_sequential_secs, 960);
        assert_eq!(tasks[0].estimated_secs, 960);
    }

    #[test]
    fn test_per_agent_breakdown() {
        let roster = AgentRegistry::default_roster();
        let mut tasks = chain(Uuid::new_v4(), &["manager", "manager", "frontend"]);
        let estimate = price_plan(&mut tasks, "prototype", &roster);
        assert_eq!(estimate.per_agent_secs["manager"], 1200);
        assert_eq!(estimate.per_agent_secs["frontend"], 1800);
        assert_eq!(estimate.available_agents, vec!["manager", "frontend"]);
    }
}
