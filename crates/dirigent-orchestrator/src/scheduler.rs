use dirigent_core::Task;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

/// A task waiting in the ready queue.
#[derive(Debug, Clone)]
pub(crate) struct QueueEntry {
    pub workflow_id: Uuid,
    pub task_id: Uuid,
    pub agent: String,
}

#[derive(Default)]
struct SchedInner {
    queue: VecDeque<QueueEntry>,
    busy: HashSet<String>,
    cancels: HashMap<Uuid, watch::Sender<bool>>,
}

/// The ready queue plus one logical slot per agent.
///
/// Tasks enter the queue only once their dependency set is satisfied; the
/// engine's dispatch loop pulls the first entry whose agent is idle and
/// whose workflow is still active. FIFO arrival order is the only tie-break,
/// so the scheduler is work-conserving and starvation-free on finite task
/// sets. Selection never blocks; the dispatch loop parks on [`Notify`] until
/// a task-state change makes another pick possible.
pub struct Scheduler {
    inner: Mutex<SchedInner>,
    notify: Notify,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SchedInner::default()),
            notify: Notify::new(),
        }
    }

    /// Adds a dependency-satisfied task to the back of the ready queue.
    pub(crate) fn enqueue(&self, entry: QueueEntry) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.queue.push_back(entry);
        }
        self.notify.notify_one();
    }

    /// Wakes the dispatch loop after a task-state change.
    pub(crate) fn kick(&self) {
        self.notify.notify_one();
    }

    /// Parks until the next kick.
    pub(crate) async fn parked(&self) {
        self.notify.notified().await;
    }

    /// Removes and returns the first queue entry whose agent is idle and for
    /// which `active` holds, marking the agent busy. Entries are scanned in
    /// arrival order.
    pub(crate) fn select<F>(&self, active: F) -> Option<QueueEntry>
    where
        F: Fn(&QueueEntry) -> bool,
    {
        let mut inner = self.inner.lock().ok()?;
        let position = inner
            .queue
            .iter()
            .position(|entry| !inner.busy.contains(&entry.agent) && active(entry))?;
        let entry = inner.queue.remove(position)?;
        inner.busy.insert(entry.agent.clone());
        Some(entry)
    }

    /// Frees an agent's slot after its task reached a terminal state.
    pub(crate) fn release_agent(&self, agent: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.busy.remove(agent);
        }
        self.notify.notify_one();
    }

    /// Registers the cancel handle for a running task.
    pub(crate) fn register_cancel(&self, task_id: Uuid, handle: watch::Sender<bool>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancels.insert(task_id, handle);
        }
    }

    /// Drops the cancel handle once a task settles.
    pub(crate) fn clear_cancel(&self, task_id: Uuid) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancels.remove(&task_id);
        }
    }

    /// Signals a running task to stop. Returns whether a handle existed.
    pub(crate) fn cancel_running(&self, task_id: Uuid) -> bool {
        if let Ok(inner) = self.inner.lock() {
            if let Some(handle) = inner.cancels.get(&task_id) {
                let _ = handle.send(true);
                return true;
            }
        }
        false
    }

    /// Drops every queued entry of a workflow, returning the removed tasks.
    pub(crate) fn drain_workflow(&self, workflow_id: Uuid) -> Vec<QueueEntry> {
        let mut removed = Vec::new();
        if let Ok(mut inner) = self.inner.lock() {
            let mut keep = VecDeque::with_capacity(inner.queue.len());
            while let Some(entry) = inner.queue.pop_front() {
                if entry.workflow_id == workflow_id {
                    removed.push(entry);
                } else {
                    keep.push_back(entry);
                }
            }
            inner.queue = keep;
        }
        removed
    }

    /// Queue length, for observability.
    pub fn queued(&self) -> usize {
        self.inner.lock().map(|inner| inner.queue.len()).unwrap_or(0)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// DFS cycle check over a planned task set.
pub(crate) fn has_cycle(tasks: &[Task]) -> bool {
    let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut state: HashMap<Uuid, u8> = HashMap::new();

    fn visit(id: Uuid, by_id: &HashMap<Uuid, &Task>, state: &mut HashMap<Uuid, u8>) -> bool {
        match state.get(&id) {
            Some(1) => return true,  // back edge
            Some(2) => return false, // already finished
            _ => {}
        }
        state.insert(id, 1);
        if let Some(task) = by_id.get(&id) {
            for dep in &task.dependencies {
                if visit(*dep, by_id, state) {
                    return true;
                }
            }
        }
        state.insert(id, 2);
        false
    }

    tasks.iter().any(|t| visit(t.id, &by_id, &mut state))
}
