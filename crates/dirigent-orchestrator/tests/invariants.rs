//! Universal invariants over engine runs.
//!
//! Each test drives real workflows and then checks one of the properties the
//! engine must always hold: acyclicity, dependency ordering, per-agent
//! serialization, progress accounting, workspace containment, hash
//! integrity, the approval gate, planning determinism, and per-task event
//! consistency.

use dirigent_brief::BriefManager;
use dirigent_core::{
    AgentRegistry, ArtifactQuery, Decision, EngineConfig, EngineEvent, EventBus, EventLog,
    SystemClock, Task, WorkflowStatus,
};
use dirigent_lineage::hash_bytes;
use dirigent_orchestrator::Orchestrator;
use dirigent_planner::Planner;
use dirigent_storage::InMemoryRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Fixture {
    dir: tempfile::TempDir,
    orchestrator: Orchestrator,
    log: EventLog,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        workspace_root: dir.path().join("workspaces"),
        task_timeout_secs: Some(30),
        ..Default::default()
    };
    let bus = EventBus::new(2048);
    let log = EventLog::attach(&bus);
    let orchestrator = Orchestrator::new(
        config,
        AgentRegistry::default_roster(),
        Arc::new(InMemoryRepository::new()),
        bus,
        Arc::new(SystemClock),
    )
    .await
    .unwrap();
    Fixture {
        dir,
        orchestrator,
        log,
    }
}

async fn run_to_approval(orchestrator: &Orchestrator, directive: &str) -> dirigent_core::Workflow {
    let workflow = orchestrator.create_workflow(directive).await.unwrap();
    wait_for(orchestrator, workflow.id, WorkflowStatus::WaitingForCeoApproval).await
}

async fn wait_for(
    orchestrator: &Orchestrator,
    id: Uuid,
    status: WorkflowStatus,
) -> dirigent_core::Workflow {
    for _ in 0..500 {
        let workflow = orchestrator.get_workflow(id).await.unwrap();
        if workflow.status == status {
            return workflow;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("workflow never reached {status:?}");
}

/// Kahn's algorithm: returns false if the dependency graph has a cycle.
fn is_acyclic(tasks: &[Task]) -> bool {
    let mut indegree: HashMap<Uuid, usize> =
        tasks.iter().map(|t| (t.id, t.dependencies.len())).collect();
    let mut ready: Vec<Uuid> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut seen = 0;
    while let Some(done) = ready.pop() {
        seen += 1;
        for task in tasks {
            if task.dependencies.contains(&done) {
                let entry = indegree.get_mut(&task.id).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    ready.push(task.id);
                }
            }
        }
    }
    seen == tasks.len()
}

#[tokio::test]
async fn test_acyclicity_of_created_workflows() {
    let f = fixture().await;
    for directive in [
        "Create a landing page for a kitten rescue with donation links",
        "Build a sales dashboard",
        "Ship a full-stack booking app",
        "Bring me 3 ideas about retention",
    ] {
        let workflow = f.orchestrator.create_workflow(directive).await.unwrap();
        assert!(is_acyclic(&workflow.tasks), "cycle in plan for: {directive}");
    }
}

#[tokio::test]
async fn test_dependency_ordering_of_timestamps() {
    let f = fixture().await;
    let workflow = run_to_approval(&f.orchestrator, "Ship a full-stack booking app").await;
    let by_id: HashMap<Uuid, &Task> = workflow.tasks.iter().map(|t| (t.id, t)).collect();
    for task in &workflow.tasks {
        for dep in &task.dependencies {
            let dependency = by_id[dep];
            assert!(
                task.started_at.unwrap() >= dependency.ended_at.unwrap(),
                "task '{}' started before its dependency '{}' ended",
                task.title,
                dependency.title
            );
        }
    }
}

#[tokio::test]
async fn test_agent_serialization_across_workflows() {
    let f = fixture().await;
    // Two overlapping workflows sharing the same roster.
    let a = f
        .orchestrator
        .create_workflow("Create a landing page for a bakery")
        .await
        .unwrap();
    let b = f
        .orchestrator
        .create_workflow("Create a landing page for a florist")
        .await
        .unwrap();
    let a = wait_for(&f.orchestrator, a.id, WorkflowStatus::WaitingForCeoApproval).await;
    let b = wait_for(&f.orchestrator, b.id, WorkflowStatus::WaitingForCeoApproval).await;

    let mut intervals: HashMap<&str, Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>> =
        HashMap::new();
    for task in a.tasks.iter().chain(b.tasks.iter()) {
        intervals
            .entry(task.agent.as_str())
            .or_default()
            .push((task.started_at.unwrap(), task.ended_at.unwrap()));
    }
    for (agent, mut spans) in intervals {
        spans.sort();
        for pair in spans.windows(2) {
            assert!(
                pair[0].1 <= pair[1].0,
                "agent '{agent}' ran two tasks concurrently: {pair:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_progress_accounting_at_every_snapshot() {
    let f = fixture().await;
    let workflow = run_to_approval(
        &f.orchestrator,
        "Create a landing page for a kitten rescue with donation links",
    )
    .await;

    // Give the capturing subscriber a beat to drain the bus.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for event in f.log.for_workflow(workflow.id).await {
        if let EngineEvent::WorkflowProgress { progress, .. } = event {
            assert!(progress.completed + progress.failed <= progress.total);
            let expected = if progress.total == 0 {
                0
            } else {
                ((progress.completed as f64 / progress.total as f64) * 100.0).round() as u32
            };
            assert_eq!(progress.percentage, expected);
        }
    }

    let done = f
        .orchestrator
        .record_approval_decision(workflow.id, Decision::Approved, "ceo", "")
        .await
        .unwrap();
    assert_eq!(done.progress.completed + done.progress.failed, done.progress.total);
}

#[tokio::test]
async fn test_artifact_containment_in_agent_workspaces() {
    let f = fixture().await;
    let workflow = run_to_approval(
        &f.orchestrator,
        "Create a landing page for a kitten rescue with donation links",
    )
    .await;

    let root = f.dir.path().join("workspaces").canonicalize().unwrap();
    let artifacts = f.orchestrator.lineage().for_workflow(workflow.id).await;
    assert!(!artifacts.is_empty());
    for artifact in artifacts {
        let agent_root = root.join(&artifact.agent);
        assert!(
            artifact.absolute_path.starts_with(&agent_root),
            "artifact {} at {} escapes workspace of '{}'",
            artifact.name,
            artifact.absolute_path.display(),
            artifact.agent
        );
    }
}

#[tokio::test]
async fn test_hash_integrity_roundtrip() {
    let f = fixture().await;
    let workflow = run_to_approval(&f.orchestrator, "Create a landing page for a bakery").await;

    let artifacts = f
        .orchestrator
        .lineage()
        .search(&ArtifactQuery {
            workflow_id: Some(workflow.id),
            ..Default::default()
        })
        .await;
    assert!(!artifacts.is_empty());
    for artifact in artifacts {
        let bytes = f.orchestrator.lineage().content(artifact.id).await.unwrap();
        assert_eq!(hash_bytes(&bytes), artifact.content_hash);
        let on_disk = tokio::fs::read(&artifact.absolute_path).await.unwrap();
        assert_eq!(hash_bytes(&on_disk), artifact.content_hash);
    }
}

#[tokio::test]
async fn test_approval_gate_blocks_completion() {
    let f = fixture().await;
    let workflow = run_to_approval(&f.orchestrator, "Organize the press kit").await;

    // No decision recorded: the workflow must not complete on its own.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let still_waiting = f.orchestrator.get_workflow(workflow.id).await.unwrap();
    assert_eq!(still_waiting.status, WorkflowStatus::WaitingForCeoApproval);

    let done = f
        .orchestrator
        .record_approval_decision(workflow.id, Decision::Approved, "ceo", "")
        .await
        .unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_planning_determinism() {
    let briefs = BriefManager::new(AgentRegistry::default_roster());
    let brief = briefs
        .analyze(
            "Create a landing page for a kitten rescue with donation links",
            "operator",
        )
        .await
        .unwrap();
    briefs
        .record_response(brief.id, "scope", "Basic prototype/MVP")
        .await
        .unwrap();
    briefs
        .record_response(brief.id, "timeline", "No specific deadline")
        .await
        .unwrap();
    briefs
        .record_response(brief.id, "key_features", "Donation system")
        .await
        .unwrap();
    let finalized = briefs.finalize(brief.id).await.unwrap();

    let planner = Planner::new(AgentRegistry::default_roster());
    let a = planner.plan(Uuid::new_v4(), &finalized).unwrap();
    let b = planner.plan(Uuid::new_v4(), &finalized).unwrap();

    assert_eq!(a.tasks.len(), b.tasks.len());
    for (x, y) in a.tasks.iter().zip(b.tasks.iter()) {
        assert_eq!(x.title, y.title);
        assert_eq!(x.agent, y.agent);
        assert_eq!(x.estimated_secs, y.estimated_secs);
        assert_eq!(x.dependencies.len(), y.dependencies.len());
    }
    assert_eq!(a.estimate, b.estimate);
}

#[tokio::test]
async fn test_event_consistency_per_task() {
    let f = fixture().await;
    let workflow = run_to_approval(&f.orchestrator, "Bring me 3 ideas about retention").await;

    // Give the capturing subscriber a beat to drain the bus.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = f.log.for_workflow(workflow.id).await;
    let mut per_task: HashMap<Uuid, Vec<&'static str>> = HashMap::new();
    for event in &events {
        match event {
            EngineEvent::TaskQueued { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("queued");
            }
            EngineEvent::TaskStarted { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("started");
            }
            EngineEvent::TaskStepOutput { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("output");
            }
            EngineEvent::TaskCompleted { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("completed");
            }
            EngineEvent::TaskFailed { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("failed");
            }
            EngineEvent::TaskCancelled { task_id, .. } => {
                per_task.entry(*task_id).or_default().push("cancelled");
            }
            _ => {}
        }
    }

    let task_ids: HashSet<Uuid> = workflow.tasks.iter().map(|t| t.id).collect();
    assert_eq!(per_task.len(), task_ids.len());
    for (task_id, sequence) in per_task {
        assert!(task_ids.contains(&task_id));
        assert_eq!(sequence[0], "queued", "{sequence:?}");
        assert_eq!(sequence[1], "started", "{sequence:?}");
        let terminal = sequence.last().unwrap();
        assert!(
            matches!(*terminal, "completed" | "failed" | "cancelled"),
            "{sequence:?}"
        );
        for middle in &sequence[2..sequence.len() - 1] {
            assert_eq!(*middle, "output", "{sequence:?}");
        }
    }
}
