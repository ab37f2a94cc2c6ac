//! `dirigent` — run one directive end to end from the terminal.
//!
//! Analyzes the directive, answers the required clarifying questions with
//! defaults (flags override them), executes the workflow with live event
//! output, and either waits at the approval gate or auto-approves with
//! `--approve`.

use clap::Parser;
use dirigent_brief::BriefManager;
use dirigent_core::{
    AgentRegistry, Decision, EngineConfig, EngineEvent, EventBus, SystemClock, WorkflowStatus,
};
use dirigent_orchestrator::Orchestrator;
use dirigent_storage::FileRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirigent", about = "Dirigent — directive workflow orchestration")]
struct Cli {
    /// The directive to execute.
    directive: String,

    /// Engine config file (TOML); defaults are used when absent.
    #[arg(short, long, default_value = "dirigent.toml")]
    config: PathBuf,

    /// Directory for durable state (workflows, artifacts, audit log).
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Scope answer for the brief.
    #[arg(long, default_value = "Basic prototype/MVP")]
    scope: String,

    /// Timeline answer for the brief.
    #[arg(long, default_value = "No specific deadline")]
    timeline: String,

    /// Record an `approved` decision as soon as the approval gate is reached.
    #[arg(long)]
    approve: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => EngineConfig::from_toml_str(&raw)?,
        Err(_) => EngineConfig::default(),
    };

    let bus = EventBus::new(1024);
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let repository = Arc::new(FileRepository::new(&cli.data_dir).await?);
    let roster = AgentRegistry::default_roster();
    let briefs = BriefManager::new(roster.clone());
    let orchestrator =
        Orchestrator::new(config, roster, repository, bus, Arc::new(SystemClock)).await?;

    let brief = briefs.analyze(&cli.directive, "cli").await?;
    info!(brief_id = %brief.id, questions = brief.questions.len(), "directive analyzed");
    for question in &brief.questions {
        if !question.required {
            continue;
        }
        let answer = match question.id.as_str() {
            "scope" => cli.scope.clone(),
            "timeline" => cli.timeline.clone(),
            // Mismatches need a human call; default to dropping the explicit
            // assignment so the planner picks the specialist.
            "agent_mismatch" => "No preference".to_string(),
            _ => "n/a".to_string(),
        };
        briefs.record_response(brief.id, &question.id, &answer).await?;
    }

    let workflow = orchestrator
        .create_workflow_from_brief(&briefs, brief.id)
        .await?;
    println!("workflow {} started ({} tasks)", workflow.id, workflow.tasks.len());

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = orchestrator.get_workflow(workflow.id).await?;
        match snapshot.status {
            WorkflowStatus::WaitingForCeoApproval if cli.approve => {
                orchestrator
                    .record_approval_decision(
                        workflow.id,
                        Decision::Approved,
                        "cli",
                        "auto-approved via --approve",
                    )
                    .await?;
            }
            WorkflowStatus::WaitingForCeoApproval => {
                println!(
                    "workflow {} is waiting for executive approval (re-run with --approve)",
                    workflow.id
                );
                break;
            }
            status if status.is_terminal() => {
                println!("workflow {} finished: {status}", workflow.id);
                if status == WorkflowStatus::Failed {
                    for reason in snapshot.failure_reasons() {
                        println!("  reason: {reason}");
                    }
                }
                break;
            }
            _ => {}
        }
    }

    printer.abort();
    Ok(())
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::TaskStarted { agent, task_id, .. } => {
            println!("[{agent}] task {task_id} started");
        }
        EngineEvent::TaskStepOutput { agent, data, .. } => {
            for line in data.lines() {
                println!("[{agent}] {line}");
            }
        }
        EngineEvent::TaskCompleted { task_id, .. } => {
            println!("task {task_id} completed");
        }
        EngineEvent::TaskFailed { task_id, reason, .. } => {
            println!("task {task_id} FAILED: {reason}");
        }
        EngineEvent::WorkflowProgress { progress, status, .. } => {
            println!(
                "progress {}% ({}/{} tasks, status {status})",
                progress.percentage, progress.completed, progress.total
            );
        }
        EngineEvent::ArtifactRecorded { name, .. } => {
            println!("artifact recorded: {name}");
        }
        EngineEvent::ApprovalRequested { workflow_id, .. } => {
            println!("workflow {workflow_id} submitted for executive approval");
        }
        _ => {}
    }
}
