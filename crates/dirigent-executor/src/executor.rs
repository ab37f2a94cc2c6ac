use dirigent_core::{
    Artifact, DirigentResult, EngineEvent, EventBus, ExitRecord, OutputStream, StepRecord, Task,
    TaskKind, TaskStatus,
};
use dirigent_lineage::{LineageStore, NewArtifact};
use dirigent_workspace::AgentWorkspace;
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{info, warn};

const MAX_STREAM_EXCERPT: usize = 50_000;

/// Terminal result of executing one task.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// `Completed`, `Failed`, or `Cancelled`.
    pub status: TaskStatus,
    /// Per-command records and the captured artifact ids.
    pub exit: ExitRecord,
    /// Failure or cancellation reason.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn completed(exit: ExitRecord) -> Self {
        Self {
            status: TaskStatus::Completed,
            exit,
            error: None,
        }
    }

    fn failed(exit: ExitRecord, reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            exit,
            error: Some(reason.into()),
        }
    }

    fn cancelled(exit: ExitRecord) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            exit,
            error: Some("cancelled".into()),
        }
    }
}

/// Executes tasks for a single agent inside that agent's workspace.
///
/// The scheduler serializes tasks per agent, so this type assumes its
/// executions never overlap.
pub struct AgentExecutor {
    agent: String,
    workspace: AgentWorkspace,
    lineage: LineageStore,
    bus: EventBus,
    task_timeout: Option<Duration>,
}

impl AgentExecutor {
    /// Opens (creating if needed) the agent's workspace under `base`.
    pub async fn new(
        agent: &str,
        base: &std::path::Path,
        lineage: LineageStore,
        bus: EventBus,
        task_timeout: Option<Duration>,
    ) -> DirigentResult<Self> {
        let workspace = AgentWorkspace::create(base, agent).await?;
        Ok(Self {
            agent: agent.to_string(),
            workspace,
            lineage,
            bus,
            task_timeout,
        })
    }

    /// The owning agent's name.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// The agent's workspace.
    pub fn workspace(&self) -> &AgentWorkspace {
        &self.workspace
    }

    /// Runs one task to a terminal outcome, honoring `cancel`.
    ///
    /// Commands run in order; the first non-zero exit aborts the remainder.
    /// On success the workspace is scanned for files touched during the task
    /// window and each is registered with the lineage store before this
    /// method returns — so artifact registration always precedes the task's
    /// completion event.
    pub async fn execute(&self, task: &Task, cancel: watch::Receiver<bool>) -> ExecutionOutcome {
        info!(agent = %self.agent, task_id = %task.id, title = %task.title, "executing task");

        if task.kind == TaskKind::ManagerReview {
            return self.execute_review(task).await;
        }

        let window_start = SystemTime::now();
        let mut exit = ExitRecord::default();

        for (index, command) in task.commands.iter().enumerate() {
            let step = match self.run_command(task, command, cancel.clone()).await {
                StepResult::Finished(step) => step,
                StepResult::Cancelled(step) => {
                    if let Some(step) = step {
                        exit.steps.push(step);
                    }
                    return ExecutionOutcome::cancelled(exit);
                }
                StepResult::TimedOut(step) => {
                    exit.steps.push(step);
                    return ExecutionOutcome::failed(
                        exit,
                        format!("timeout: command {} exceeded the task budget", index + 1),
                    );
                }
                StepResult::SpawnError(err) => {
                    return ExecutionOutcome::failed(
                        exit,
                        format!("command {} failed to start: {err}", index + 1),
                    );
                }
            };

            let code = step.exit_code;
            exit.steps.push(step);
            if code != 0 {
                warn!(agent = %self.agent, task_id = %task.id, step = index + 1, code, "command failed");
                return ExecutionOutcome::failed(
                    exit,
                    format!("command {} exited with code {code}", index + 1),
                );
            }
        }

        match self.capture_artifacts(task, window_start).await {
            Ok(artifacts) => {
                exit.artifact_ids = artifacts.iter().map(|a| a.id).collect();
                ExecutionOutcome::completed(exit)
            }
            Err(err) => ExecutionOutcome::failed(exit, format!("artifact capture failed: {err}")),
        }
    }

    /// Writes a file directly into the workspace and registers it as an
    /// artifact. Convenience path used by synthetic tasks and operators.
    pub async fn create_file(
        &self,
        task: &Task,
        relative_path: &str,
        bytes: &[u8],
        parents: Vec<uuid::Uuid>,
    ) -> DirigentResult<Artifact> {
        self.workspace.write_file(relative_path, bytes).await?;
        self.lineage
            .record(
                &self.workspace,
                NewArtifact {
                    name: String::new(),
                    relative_path: relative_path.to_string(),
                    bytes: bytes.to_vec(),
                    workflow_id: Some(task.workflow_id),
                    task_id: Some(task.id),
                    parents,
                    reason: "created directly by agent".into(),
                },
            )
            .await
    }

    /// Reads a file from the workspace with the containment check applied.
    pub async fn read_file(&self, relative_path: &str) -> DirigentResult<Vec<u8>> {
        self.workspace.read_file(relative_path).await
    }

    async fn run_command(
        &self,
        task: &Task,
        command: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> StepResult {
        let started = Instant::now();
        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.workspace.root())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return StepResult::SpawnError(err.to_string()),
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let budget = self.task_timeout;
        let deadline = async move {
            match budget {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = deadline => None,
            _ = cancel_signalled(&mut cancel) => {
                let _ = child.kill().await;
                let step = self
                    .finish_step(task, command, -1, started, stdout_reader, stderr_reader)
                    .await;
                return StepResult::Cancelled(Some(step));
            }
        };

        match waited {
            Some(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                let step = self
                    .finish_step(task, command, code, started, stdout_reader, stderr_reader)
                    .await;
                StepResult::Finished(step)
            }
            Some(Err(err)) => StepResult::SpawnError(err.to_string()),
            None => {
                let _ = child.kill().await;
                let step = self
                    .finish_step(task, command, -1, started, stdout_reader, stderr_reader)
                    .await;
                StepResult::TimedOut(step)
            }
        }
    }

    async fn finish_step(
        &self,
        task: &Task,
        command: &str,
        exit_code: i32,
        started: Instant,
        stdout_reader: tokio::task::JoinHandle<Vec<u8>>,
        stderr_reader: tokio::task::JoinHandle<Vec<u8>>,
    ) -> StepRecord {
        let stdout_bytes = stdout_reader.await.unwrap_or_default();
        let stderr_bytes = stderr_reader.await.unwrap_or_default();
        let stdout = truncate_excerpt(&String::from_utf8_lossy(&stdout_bytes));
        let stderr = truncate_excerpt(&String::from_utf8_lossy(&stderr_bytes));

        if !stdout.is_empty() {
            self.bus.emit(EngineEvent::TaskStepOutput {
                workflow_id: task.workflow_id,
                task_id: task.id,
                agent: self.agent.clone(),
                stream: OutputStream::Stdout,
                data: stdout.clone(),
            });
        }
        if !stderr.is_empty() {
            self.bus.emit(EngineEvent::TaskStepOutput {
                workflow_id: task.workflow_id,
                task_id: task.id,
                agent: self.agent.clone(),
                stream: OutputStream::Stderr,
                data: stderr.clone(),
            });
        }

        StepRecord {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn capture_artifacts(
        &self,
        task: &Task,
        window_start: SystemTime,
    ) -> DirigentResult<Vec<Artifact>> {
        let touched = self.workspace.scan_modified_since(window_start).await?;
        let mut artifacts = Vec::with_capacity(touched.len());
        for relative in touched {
            let rel_str = relative.to_string_lossy().into_owned();
            let bytes = self.workspace.read_file(&rel_str).await?;
            let artifact = self
                .lineage
                .record(
                    &self.workspace,
                    NewArtifact {
                        name: String::new(),
                        relative_path: rel_str,
                        bytes,
                        workflow_id: Some(task.workflow_id),
                        task_id: Some(task.id),
                        parents: Vec::new(),
                        reason: format!("captured from task '{}'", task.title),
                    },
                )
                .await?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    /// Synthetic execution for manager-review tasks: no subprocesses, just a
    /// summary of the workflow's artifacts written into the reviewer's
    /// workspace and registered with every reviewed artifact as a parent.
    async fn execute_review(&self, task: &Task) -> ExecutionOutcome {
        let started = Instant::now();
        let reviewed = self.lineage.for_workflow(task.workflow_id).await;

        let mut summary = String::new();
        summary.push_str(&format!("# Review for workflow {}\n\n", task.workflow_id));
        summary.push_str(&format!("Artifacts reviewed: {}\n\n", reviewed.len()));
        for artifact in &reviewed {
            summary.push_str(&format!(
                "- {} ({} bytes, {}, by {})\n",
                artifact.name, artifact.size_bytes, artifact.file_type, artifact.agent
            ));
        }

        let relative = format!("reviews/{}.md", task.workflow_id);
        let parents: Vec<uuid::Uuid> = reviewed.iter().map(|a| a.id).collect();
        let result = async {
            self.workspace.write_file(&relative, summary.as_bytes()).await?;
            self.lineage
                .record(
                    &self.workspace,
                    NewArtifact {
                        name: String::new(),
                        relative_path: relative.clone(),
                        bytes: summary.clone().into_bytes(),
                        workflow_id: Some(task.workflow_id),
                        task_id: Some(task.id),
                        parents,
                        reason: "manager review summary".into(),
                    },
                )
                .await
        }
        .await;

        let mut exit = ExitRecord::default();
        match result {
            Ok(artifact) => {
                exit.artifact_ids = vec![artifact.id];
                exit.steps.push(StepRecord {
                    command: "<manager review>".into(),
                    exit_code: 0,
                    stdout: format!("reviewed {} artifacts", reviewed.len()),
                    stderr: String::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                ExecutionOutcome::completed(exit)
            }
            Err(err) => ExecutionOutcome::failed(exit, format!("review synthesis failed: {err}")),
        }
    }
}

enum StepResult {
    Finished(StepRecord),
    Cancelled(Option<StepRecord>),
    TimedOut(StepRecord),
    SpawnError(String),
}

async fn cancel_signalled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender dropped without signalling; treat as never-cancelled.
            std::future::pending::<()>().await;
        }
    }
}

fn truncate_excerpt(s: &str) -> String {
    if s.len() <= MAX_STREAM_EXCERPT {
        s.to_string()
    } else {
        let mut cut = MAX_STREAM_EXCERPT;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} total bytes]", &s[..cut], s.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dirigent_core::TaskKind;
    use uuid::Uuid;

    async fn fixture(timeout: Option<Duration>) -> (tempfile::TempDir, AgentExecutor, EventBus) {
        let base = tempfile::tempdir().unwrap();
        let bus = EventBus::new(256);
        let lineage = LineageStore::new(bus.clone(), 100);
        let executor = AgentExecutor::new("frontend", base.path(), lineage, bus.clone(), timeout)
            .await
            .unwrap();
        (base, executor, bus)
    }

    fn task(commands: Vec<&str>) -> Task {
        Task::new(Uuid::new_v4(), "build page", "frontend")
            .with_commands(commands.into_iter().map(String::from).collect())
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the duration of the test process.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_successful_commands_capture_artifacts() {
        let (_base, executor, _bus) = fixture(None).await;
        let task = task(vec![
            "printf '<html></html>' > index.html",
            "printf 'body{}' > site.css",
        ]);
        let outcome = executor.execute(&task, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.exit.steps.len(), 2);
        assert_eq!(outcome.exit.artifact_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_nonzero_exit_aborts_remaining_commands() {
        let (_base, executor, _bus) = fixture(None).await;
        let task = task(vec!["false", "printf 'never' > leftover.txt"]);
        let outcome = executor.execute(&task, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.exit.steps.len(), 1);
        assert!(outcome.error.unwrap().contains("command 1"));
        assert!(executor.read_file("leftover.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_stderr_is_captured_and_emitted() {
        let (_base, executor, bus) = fixture(None).await;
        let mut rx = bus.subscribe();
        let task = task(vec!["echo oops >&2"]);
        let outcome = executor.execute(&task, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert!(outcome.exit.steps[0].stderr.contains("oops"));

        let mut saw_stderr = false;
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::TaskStepOutput {
                stream: OutputStream::Stderr,
                data,
                ..
            } = event
            {
                assert!(data.contains("oops"));
                saw_stderr = true;
            }
        }
        assert!(saw_stderr);
    }

    #[tokio::test]
    async fn test_timeout_fails_the_task() {
        let (_base, executor, _bus) = fixture(Some(Duration::from_millis(100))).await;
        let task = task(vec!["sleep 5"]);
        let outcome = executor.execute(&task, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_cancel_kills_the_child() {
        let (_base, executor, _bus) = fixture(None).await;
        let task = task(vec!["sleep 5"]);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
            tx
        });
        let started = Instant::now();
        let outcome = executor.execute(&task, rx).await;
        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(4));
        drop(handle.await);
    }

    #[tokio::test]
    async fn test_manager_review_synthesizes_summary() {
        let (_base, executor, _bus) = fixture(None).await;
        let workflow_id = Uuid::new_v4();

        let mut work = Task::new(workflow_id, "build", "frontend")
            .with_commands(vec!["printf hi > page.html".into()]);
        work.workflow_id = workflow_id;
        let outcome = executor.execute(&work, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Completed);

        let review = Task::new(workflow_id, "Review deliverables", "frontend")
            .with_kind(TaskKind::ManagerReview);
        let outcome = executor.execute(&review, no_cancel()).await;
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.exit.artifact_ids.len(), 1);

        let summary = executor
            .read_file(&format!("reviews/{workflow_id}.md"))
            .await
            .unwrap();
        let text = String::from_utf8(summary).unwrap();
        assert!(text.contains("Artifacts reviewed: 1"));
        assert!(text.contains("page.html"));
    }

    #[tokio::test]
    async fn test_create_file_registers_artifact() {
        let (_base, executor, _bus) = fixture(None).await;
        let task = task(vec![]);
        let artifact = executor
            .create_file(&task, "notes/todo.md", b"- ship it", vec![])
            .await
            .unwrap();
        assert_eq!(artifact.file_type, "md");
        assert_eq!(executor.read_file("notes/todo.md").await.unwrap(), b"- ship it");
    }

    #[test]
    fn test_truncate_excerpt_bounds_output() {
        let long = "x".repeat(MAX_STREAM_EXCERPT + 10);
        let truncated = truncate_excerpt(&long);
        assert!(truncated.contains("truncated"));
        assert!(truncated.len() < long.len() + 64);
    }
}
