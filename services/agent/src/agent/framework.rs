//! Framework and task bookkeeping.
//!
//! Records are kept in per-kind tables keyed by id; cross-references are
//! ids, never pointers. A framework's `resources` always equals the sum
//! of its tasks' resources: `add_task` and `remove_task` are the only
//! mutators.

use std::collections::{HashMap, VecDeque};

use quarry_id::{FrameworkId, TaskId};
use quarry_messages::{
    ExecutorManifest, FrameworkManifest, ResourceVector, TaskDescription, TaskState,
};
use quarry_post::Address;

/// The agent's link to a framework's executor process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorLink {
    /// Launch requested; the process has not registered yet.
    Starting,

    /// The executor registered from this address. At most one executor
    /// exists per framework.
    Registered(Address),
}

/// A launched task the agent is accountable for.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub framework_id: FrameworkId,
    pub name: String,
    pub resources: ResourceVector,
    pub state: TaskState,
    pub message: String,
}

/// Everything the agent tracks for one tenant framework.
#[derive(Debug)]
pub struct Framework {
    pub id: FrameworkId,
    pub name: String,
    pub user: String,
    pub executor: ExecutorManifest,

    /// Task descriptions held back until the executor registers,
    /// in master-arrival order.
    pub queued: VecDeque<TaskDescription>,

    pub tasks: HashMap<TaskId, Task>,

    /// Sum of all tracked tasks' resources.
    pub resources: ResourceVector,

    pub link: ExecutorLink,

    /// Opaque status reported by the isolation backend (a pid, a cgroup
    /// name, ...).
    pub executor_note: Option<String>,

    /// A kill was requested; remove the record once the executor exits.
    pub doomed: bool,

    /// Creation stamp guarding against stale timers after the framework
    /// is removed and re-created.
    pub epoch: u64,
}

impl Framework {
    pub fn new(id: FrameworkId, manifest: &FrameworkManifest, epoch: u64) -> Self {
        Self {
            id,
            name: manifest.name.clone(),
            user: manifest.user.clone(),
            executor: manifest.executor.clone(),
            queued: VecDeque::new(),
            tasks: HashMap::new(),
            resources: ResourceVector::ZERO,
            link: ExecutorLink::Starting,
            executor_note: None,
            doomed: false,
            epoch,
        }
    }

    /// The executor address, once registered.
    pub fn executor_address(&self) -> Option<&Address> {
        match &self.link {
            ExecutorLink::Registered(addr) => Some(addr),
            ExecutorLink::Starting => None,
        }
    }

    pub fn lookup_task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Admits a task in `Starting` state and charges its resources.
    /// The caller has already ruled out a duplicate id.
    pub fn add_task(&mut self, desc: &TaskDescription) {
        let task = Task {
            id: desc.task_id.clone(),
            framework_id: self.id.clone(),
            name: desc.name.clone(),
            resources: desc.resources,
            state: TaskState::Starting,
            message: String::new(),
        };
        self.resources += desc.resources;
        self.tasks.insert(desc.task_id.clone(), task);
    }

    /// Drops a task from the table and the launch queue, releasing its
    /// resources.
    pub fn remove_task(&mut self, task_id: &TaskId) -> Option<Task> {
        self.queued.retain(|desc| &desc.task_id != task_id);
        let task = self.tasks.remove(task_id)?;
        self.resources -= task.resources;
        Some(task)
    }

    /// Ids of all tasks still in a live state.
    pub fn live_task_ids(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.state.is_live())
            .map(|t| t.id.clone())
            .collect()
    }
}
