use crate::executor::AgentExecutor;
use dirigent_core::{AgentRegistry, DirigentError, DirigentResult, EventBus};
use dirigent_lineage::LineageStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Runtime counterpart of the agent roster: one executor per agent name.
///
/// Built once at engine startup; executors are shared immutably afterwards.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<AgentExecutor>>,
}

impl ExecutorRegistry {
    /// Creates one executor (and workspace directory) per roster profile.
    pub async fn for_roster(
        roster: &AgentRegistry,
        workspace_base: &Path,
        lineage: LineageStore,
        bus: EventBus,
        task_timeout: Option<Duration>,
    ) -> DirigentResult<Self> {
        let mut executors = HashMap::new();
        for profile in roster.profiles() {
            let executor = AgentExecutor::new(
                &profile.name,
                workspace_base,
                lineage.clone(),
                bus.clone(),
                task_timeout,
            )
            .await?;
            executors.insert(profile.name.clone(), Arc::new(executor));
        }
        Ok(Self { executors })
    }

    /// The executor for `agent`, if the roster defines it.
    pub fn get(&self, agent: &str) -> DirigentResult<Arc<AgentExecutor>> {
        self.executors
            .get(agent)
            .cloned()
            .ok_or_else(|| DirigentError::InvalidInput(format!("unknown agent '{agent}'")))
    }

    /// Names of all registered agents.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}
