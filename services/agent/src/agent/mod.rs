//! The agent actor: one mailbox, one handler loop, no locks.
//!
//! All mutable state (framework records, task ledger, executor links,
//! the committed-resources vector) is owned by [`Agent`] and mutated
//! only while handling a single [`AgentEvent`]. Transport deliveries,
//! isolation-backend reports, leader changes, timers, and signals all
//! arrive as events; handlers enqueue outbound sends and future timers
//! but never await a reply.

mod framework;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quarry_id::{AgentId, FrameworkId, TaskId};
use quarry_messages::{
    AgentToExecutor, AgentToMaster, ExecutorSnapshot, ExecutorToAgent, FrameworkManifest,
    MasterToAgent, ResourceVector, TaskDescription, TaskSnapshot, TaskState, WireMessage,
};
use quarry_post::{Address, Delivery, Mailbox, Post};
use tracing::{debug, error, info, warn};

use crate::actor::{Actor, ActorContext, ActorError, ActorHandle};
use crate::config::AgentTimeouts;
use crate::isolation::{ExecutorLaunch, ExitReason, IsolationBackend};
use crate::workspace::WorkspaceManager;

pub use framework::{ExecutorLink, Framework, Task};

/// Everything that can land in the agent's mailbox.
#[derive(Debug)]
pub enum AgentEvent {
    /// A transport message from the master.
    FromMaster(Address, MasterToAgent),

    /// A transport message from an executor.
    FromExecutor(Address, ExecutorToAgent),

    /// The isolation backend observed an executor exit.
    ExecutorExited {
        framework_id: FrameworkId,
        reason: ExitReason,
    },

    /// Opaque executor status from the isolation backend (a pid, a
    /// cgroup name, ...).
    ExecutorNote {
        framework_id: FrameworkId,
        note: String,
    },

    /// The leader watcher observed a (possibly new) master.
    NewLeader(Address),

    /// A monitored address went silent.
    PeerExited(Address),

    /// An executor never registered within the allowed window.
    RegistrationTimeout {
        framework_id: FrameworkId,
        epoch: u64,
    },

    /// A framework kill's grace period ran out.
    KillGraceExpired {
        framework_id: FrameworkId,
        epoch: u64,
    },

    /// The master stayed silent past the non-fault-tolerant grace
    /// window.
    MasterGraceExpired,

    /// Kill all executors and exit.
    Shutdown,
}

/// Feeds transport deliveries into the agent mailbox until either side
/// goes away.
pub async fn route(mut mailbox: Mailbox<WireMessage>, events: ActorHandle<AgentEvent>) {
    while let Some(delivery) = mailbox.recv().await {
        let event = match delivery {
            Delivery::Message { from, payload } => match payload {
                WireMessage::Master(msg) => AgentEvent::FromMaster(from, msg),
                WireMessage::Executor(msg) => AgentEvent::FromExecutor(from, msg),
                other => {
                    warn!(from = %from, msg = ?other, "ignoring message not addressed to an agent");
                    continue;
                }
            },
            Delivery::PeerExited { peer } => AgentEvent::PeerExited(peer),
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// The worker-node control actor.
pub struct Agent {
    /// Advertised capacity; immutable after construction.
    capacity: ResourceVector,

    /// Sum of all tracked tasks' resources, always dominated by
    /// `capacity`.
    committed: ResourceVector,

    agent_id: Option<AgentId>,
    master: Option<Address>,
    fault_tolerant: bool,

    frameworks: HashMap<FrameworkId, Framework>,

    post: Post<WireMessage>,
    isolation: Arc<dyn IsolationBackend>,
    workspaces: WorkspaceManager,
    timeouts: AgentTimeouts,

    epoch_counter: u64,
    master_lost: bool,
    reregistering: bool,
}

enum StatusOutcome {
    UnknownFramework,
    UnknownTask,
    Illegal(TaskState),
    Applied { released: Option<ResourceVector> },
}

impl Agent {
    /// Builds the agent. `master` is the fixed master address in
    /// non-fault-tolerant mode and `None` when a leader watcher will
    /// announce one.
    pub fn new(
        capacity: ResourceVector,
        master: Option<Address>,
        fault_tolerant: bool,
        post: Post<WireMessage>,
        isolation: Arc<dyn IsolationBackend>,
        workspaces: WorkspaceManager,
        timeouts: AgentTimeouts,
    ) -> Self {
        Self {
            capacity,
            committed: ResourceVector::ZERO,
            agent_id: None,
            master,
            fault_tolerant,
            frameworks: HashMap::new(),
            post,
            isolation,
            workspaces,
            timeouts,
            epoch_counter: 0,
            master_lost: false,
            reregistering: false,
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch_counter += 1;
        self.epoch_counter
    }

    fn send_to_master(&self, msg: AgentToMaster) {
        match &self.master {
            Some(addr) => {
                self.post.send(addr, WireMessage::Agent(msg));
            }
            None => debug!(msg = ?msg, "no master known; dropping outbound message"),
        }
    }

    fn send_to_executor(&self, addr: &Address, msg: AgentToExecutor) {
        self.post.send(addr, WireMessage::Command(msg));
    }

    fn status_update_to_master(
        &self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
        state: TaskState,
        message: &str,
    ) {
        self.send_to_master(AgentToMaster::StatusUpdate {
            framework_id: framework_id.clone(),
            task_id: task_id.clone(),
            state,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    // -------------------------------------------------------------------
    // Master messages
    // -------------------------------------------------------------------

    fn handle_registered(&mut self, agent_id: AgentId) {
        info!(agent_id = %agent_id, "registered with master");
        self.agent_id = Some(agent_id);

        // After a failover the new master may have assigned a fresh id
        // without adopting our state; re-announce whatever is live.
        if self.reregistering {
            self.reannounce_live_tasks();
        }
        self.reregistering = false;
    }

    fn handle_reregister_ack(&mut self, agent_id: AgentId) {
        match &self.agent_id {
            Some(existing) if existing != &agent_id => {
                warn!(
                    ours = %existing,
                    masters = %agent_id,
                    "master acknowledged re-registration under a different id"
                );
            }
            _ => info!(agent_id = %agent_id, "re-registered with master"),
        }
        self.agent_id = Some(agent_id);
        self.reregistering = false;
    }

    fn reannounce_live_tasks(&self) {
        for fw in self.frameworks.values() {
            for task in fw.tasks.values() {
                self.status_update_to_master(&fw.id, &task.id, task.state, &task.message);
            }
        }
    }

    fn handle_run_task(
        &mut self,
        ctx: &ActorContext<AgentEvent>,
        framework_id: FrameworkId,
        manifest: FrameworkManifest,
        desc: TaskDescription,
    ) -> Result<(), ActorError> {
        #[derive(Clone, Copy)]
        enum Admission {
            New,
            Known,
            Replay,
            DuplicateId,
            Doomed,
        }

        // Classify before any accounting: a replay is already counted
        // in `committed` and must not be charged (or rejected) twice.
        let admission = match self.frameworks.get(&framework_id) {
            None => Admission::New,
            Some(fw) => match fw.lookup_task(&desc.task_id) {
                Some(existing) if existing.resources == desc.resources => Admission::Replay,
                Some(_) => Admission::DuplicateId,
                None if fw.doomed => Admission::Doomed,
                None => Admission::Known,
            },
        };

        match admission {
            Admission::Replay => {
                // Masters may replay launches they adopted during
                // failover; an exact match is a no-op.
                warn!(
                    framework_id = %framework_id,
                    task_id = %desc.task_id,
                    "ignoring replayed launch of known task"
                );
                return Ok(());
            }
            Admission::DuplicateId => {
                error!(
                    framework_id = %framework_id,
                    task_id = %desc.task_id,
                    "master launched two different tasks with the same id"
                );
                return Err(ActorError::Permanent(format!(
                    "duplicate task id {} for framework {}",
                    desc.task_id, framework_id
                )));
            }
            Admission::Doomed => {
                warn!(
                    framework_id = %framework_id,
                    task_id = %desc.task_id,
                    "rejecting task for framework being torn down"
                );
                self.status_update_to_master(
                    &framework_id,
                    &desc.task_id,
                    TaskState::Lost,
                    "framework is shutting down",
                );
                return Ok(());
            }
            Admission::New | Admission::Known => {
                // This launch will charge the ledger; it must stay
                // within capacity.
                let needed = self.committed + desc.resources;
                if !self.capacity.dominates(&needed) {
                    warn!(
                        framework_id = %framework_id,
                        task_id = %desc.task_id,
                        requested = %desc.resources,
                        committed = %self.committed,
                        capacity = %self.capacity,
                        "rejecting task: capacity exceeded"
                    );
                    self.status_update_to_master(
                        &framework_id,
                        &desc.task_id,
                        TaskState::Lost,
                        "insufficient resources",
                    );
                    return Ok(());
                }
            }
        }

        if matches!(admission, Admission::New) {
            if let Err(update) = self.create_framework(ctx, &framework_id, &manifest) {
                self.status_update_to_master(&framework_id, &desc.task_id, TaskState::Lost, update);
                return Ok(());
            }
        }

        let Some(fw) = self.frameworks.get_mut(&framework_id) else {
            return Ok(());
        };
        fw.add_task(&desc);
        let forward_to = fw.executor_address().cloned();
        if forward_to.is_none() {
            fw.queued.push_back(desc.clone());
        }

        self.committed += desc.resources;
        info!(
            framework_id = %framework_id,
            task_id = %desc.task_id,
            resources = %desc.resources,
            committed = %self.committed,
            "task admitted"
        );
        self.status_update_to_master(&framework_id, &desc.task_id, TaskState::Starting, "");

        if let Some(addr) = forward_to {
            self.send_to_executor(&addr, AgentToExecutor::RunTask { task: desc });
        }
        Ok(())
    }

    /// Creates the framework record and starts its executor. On failure
    /// returns the status-update message to surface, leaving no record
    /// behind.
    fn create_framework(
        &mut self,
        ctx: &ActorContext<AgentEvent>,
        framework_id: &FrameworkId,
        manifest: &FrameworkManifest,
    ) -> Result<(), &'static str> {
        let Some(agent_id) = self.agent_id.clone() else {
            warn!(framework_id = %framework_id, "launch request before registration");
            return Err("agent not registered");
        };

        let workdir = match self
            .workspaces
            .create(&agent_id, framework_id, &manifest.user)
        {
            Ok(dir) => dir,
            Err(e) => {
                error!(
                    framework_id = %framework_id,
                    user = %manifest.user,
                    error = %e,
                    "workspace creation failed"
                );
                return Err("workspace creation failed");
            }
        };

        let epoch = self.next_epoch();
        info!(
            framework_id = %framework_id,
            name = %manifest.name,
            user = %manifest.user,
            workdir = %workdir.display(),
            "starting executor"
        );

        self.frameworks.insert(
            framework_id.clone(),
            Framework::new(framework_id.clone(), manifest, epoch),
        );

        self.isolation.launch_executor(ExecutorLaunch {
            framework_id: framework_id.clone(),
            manifest: manifest.executor.clone(),
            user: manifest.user.clone(),
            workdir,
            env: vec![
                ("QUARRY_FRAMEWORK_ID".to_string(), framework_id.to_string()),
                ("QUARRY_AGENT_ADDRESS".to_string(), self.post.address().to_string()),
            ],
        });
        ctx.notify_after(
            self.timeouts.registration,
            AgentEvent::RegistrationTimeout {
                framework_id: framework_id.clone(),
                epoch,
            },
        );
        Ok(())
    }

    fn handle_kill_task(&mut self, framework_id: FrameworkId, task_id: TaskId) {
        enum Action {
            Unknown(&'static str),
            Forward(Address),
            DropQueued(ResourceVector),
        }

        let action = match self.frameworks.get_mut(&framework_id) {
            None => Action::Unknown("framework unknown"),
            Some(fw) => {
                if fw.lookup_task(&task_id).is_none() {
                    Action::Unknown("task unknown")
                } else if let Some(addr) = fw.executor_address().cloned() {
                    Action::Forward(addr)
                } else {
                    match fw.remove_task(&task_id) {
                        Some(task) => Action::DropQueued(task.resources),
                        None => Action::Unknown("task unknown"),
                    }
                }
            }
        };

        match action {
            Action::Unknown(why) => {
                // A no-op kill is still acknowledged so the master can
                // settle its bookkeeping.
                debug!(framework_id = %framework_id, task_id = %task_id, why, "kill is a no-op");
                self.status_update_to_master(&framework_id, &task_id, TaskState::Lost, why);
            }
            Action::Forward(addr) => {
                self.send_to_executor(
                    &addr,
                    AgentToExecutor::KillTask {
                        task_id: task_id.clone(),
                    },
                );
            }
            Action::DropQueued(resources) => {
                self.committed -= resources;
                info!(
                    framework_id = %framework_id,
                    task_id = %task_id,
                    "killed task before its executor started"
                );
                self.status_update_to_master(
                    &framework_id,
                    &task_id,
                    TaskState::Killed,
                    "killed before launch",
                );
            }
        }
    }

    fn handle_kill_framework(&mut self, ctx: &ActorContext<AgentEvent>, framework_id: FrameworkId) {
        let Some(fw) = self.frameworks.get_mut(&framework_id) else {
            warn!(framework_id = %framework_id, "kill for unknown framework");
            return;
        };
        fw.doomed = true;
        let epoch = fw.epoch;
        let executor = fw.executor_address().cloned();

        match executor {
            Some(addr) => {
                info!(framework_id = %framework_id, executor = %addr, "shutting down executor");
                self.send_to_executor(&addr, AgentToExecutor::Shutdown);
                ctx.notify_after(
                    self.timeouts.kill_grace,
                    AgentEvent::KillGraceExpired {
                        framework_id,
                        epoch,
                    },
                );
            }
            None => {
                info!(framework_id = %framework_id, "killing executor that never registered");
                self.isolation.kill_executor(&framework_id);
            }
        }
    }

    fn handle_master_relay(&mut self, framework_id: FrameworkId, data: Vec<u8>) {
        let executor = self
            .frameworks
            .get(&framework_id)
            .and_then(|fw| fw.executor_address().cloned());
        match executor {
            Some(addr) => {
                self.send_to_executor(&addr, AgentToExecutor::FrameworkMessage { framework_id, data });
            }
            None => {
                warn!(framework_id = %framework_id, "dropping relay: no registered executor");
            }
        }
    }

    // -------------------------------------------------------------------
    // Executor messages
    // -------------------------------------------------------------------

    fn handle_executor_register(
        &mut self,
        ctx: &ActorContext<AgentEvent>,
        from: Address,
        framework_id: FrameworkId,
    ) {
        enum Registration {
            Stray,
            AlreadyRegistered(Address),
            Bound {
                queued: Vec<TaskDescription>,
                doomed: bool,
                epoch: u64,
            },
        }

        let registration = match self.frameworks.get_mut(&framework_id) {
            None => Registration::Stray,
            Some(fw) => match fw.link.clone() {
                ExecutorLink::Registered(existing) => Registration::AlreadyRegistered(existing),
                ExecutorLink::Starting => {
                    fw.link = ExecutorLink::Registered(from.clone());
                    Registration::Bound {
                        queued: fw.queued.drain(..).collect(),
                        doomed: fw.doomed,
                        epoch: fw.epoch,
                    }
                }
            },
        };

        match registration {
            Registration::Stray => {
                warn!(from = %from, framework_id = %framework_id, "stray executor; telling it to shut down");
                self.send_to_executor(&from, AgentToExecutor::Shutdown);
            }
            Registration::AlreadyRegistered(existing) => {
                error!(
                    framework_id = %framework_id,
                    existing = %existing,
                    from = %from,
                    "framework already has an executor"
                );
                if existing != from {
                    self.send_to_executor(&from, AgentToExecutor::Shutdown);
                }
            }
            Registration::Bound {
                queued,
                doomed,
                epoch,
            } => {
                info!(
                    framework_id = %framework_id,
                    executor = %from,
                    queued = queued.len(),
                    "executor registered"
                );

                // Flush in master-arrival order.
                for task in queued {
                    self.send_to_executor(&from, AgentToExecutor::RunTask { task });
                }

                // A kill raced the registration; finish it now.
                if doomed {
                    self.send_to_executor(&from, AgentToExecutor::Shutdown);
                    ctx.notify_after(
                        self.timeouts.kill_grace,
                        AgentEvent::KillGraceExpired {
                            framework_id,
                            epoch,
                        },
                    );
                }
            }
        }
    }

    fn handle_executor_status(
        &mut self,
        from: Address,
        framework_id: FrameworkId,
        task_id: TaskId,
        state: TaskState,
        message: String,
    ) {
        let registered = self
            .frameworks
            .get(&framework_id)
            .and_then(|fw| fw.executor_address())
            .map(|addr| addr == &from)
            .unwrap_or(false);
        if !registered {
            warn!(
                from = %from,
                framework_id = %framework_id,
                task_id = %task_id,
                "status update from an address that is not the framework's executor"
            );
            return;
        }
        self.apply_status_update(&framework_id, &task_id, state, &message, Some(from));
    }

    fn handle_executor_relay(&mut self, framework_id: FrameworkId, data: Vec<u8>) {
        self.send_to_master(AgentToMaster::FrameworkMessage { framework_id, data });
    }

    /// The single path every status change takes, whether reported by an
    /// executor or synthesized by the agent. Terminal states release
    /// resources and drop the task record; the update is then forwarded
    /// to the master and, for executor-reported updates, acknowledged.
    fn apply_status_update(
        &mut self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
        state: TaskState,
        message: &str,
        ack_to: Option<Address>,
    ) {
        let outcome = match self.frameworks.get_mut(framework_id) {
            None => StatusOutcome::UnknownFramework,
            Some(fw) => match fw.tasks.get_mut(task_id) {
                None => StatusOutcome::UnknownTask,
                Some(task) if state == TaskState::Starting => StatusOutcome::Illegal(task.state),
                Some(task) => {
                    task.state = state;
                    task.message = message.to_string();
                    let released = if state.is_terminal() {
                        fw.remove_task(task_id).map(|t| t.resources)
                    } else {
                        None
                    };
                    StatusOutcome::Applied { released }
                }
            },
        };

        match outcome {
            StatusOutcome::UnknownFramework => {
                warn!(framework_id = %framework_id, task_id = %task_id, "status update for unknown framework");
            }
            StatusOutcome::UnknownTask => {
                // Duplicate delivery of a terminal update: the record is
                // already gone. Acknowledge so the executor stops
                // retrying, but forward nothing.
                debug!(framework_id = %framework_id, task_id = %task_id, "duplicate status update");
                if let Some(addr) = ack_to {
                    self.send_to_executor(
                        &addr,
                        AgentToExecutor::StatusUpdateAck {
                            task_id: task_id.clone(),
                        },
                    );
                }
            }
            StatusOutcome::Illegal(current) => {
                error!(
                    framework_id = %framework_id,
                    task_id = %task_id,
                    current = %current,
                    attempted = %state,
                    "illegal task state transition"
                );
            }
            StatusOutcome::Applied { released } => {
                if let Some(resources) = released {
                    self.committed -= resources;
                    debug!(
                        framework_id = %framework_id,
                        task_id = %task_id,
                        released = %resources,
                        committed = %self.committed,
                        "released task resources"
                    );
                }
                info!(
                    framework_id = %framework_id,
                    task_id = %task_id,
                    state = %state,
                    "task status update"
                );
                self.status_update_to_master(framework_id, task_id, state, message);
                if let Some(addr) = ack_to {
                    self.send_to_executor(
                        &addr,
                        AgentToExecutor::StatusUpdateAck {
                            task_id: task_id.clone(),
                        },
                    );
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Isolation backend reports
    // -------------------------------------------------------------------

    fn handle_executor_exited(&mut self, framework_id: FrameworkId, reason: ExitReason) {
        if !self.frameworks.contains_key(&framework_id) {
            debug!(framework_id = %framework_id, reason = %reason, "exit for already-removed framework");
            return;
        }
        warn!(framework_id = %framework_id, reason = %reason, "executor exited");

        // Every still-live task, including ones only queued because the
        // executor never registered, is surfaced as lost through the
        // normal status-update path.
        let live = self
            .frameworks
            .get(&framework_id)
            .map(|fw| fw.live_task_ids())
            .unwrap_or_default();
        for task_id in live {
            self.apply_status_update(
                &framework_id,
                &task_id,
                TaskState::Lost,
                "executor exited",
                None,
            );
        }

        self.remove_framework(&framework_id);
    }

    fn remove_framework(&mut self, framework_id: &FrameworkId) {
        if self.frameworks.remove(framework_id).is_some() {
            info!(framework_id = %framework_id, "removed framework");
            if let Some(agent_id) = &self.agent_id {
                self.workspaces.remove(agent_id, framework_id);
            }
        }
    }

    fn handle_executor_note(&mut self, framework_id: FrameworkId, note: String) {
        if let Some(fw) = self.frameworks.get_mut(&framework_id) {
            debug!(framework_id = %framework_id, note = %note, "executor status");
            fw.executor_note = Some(note);
        }
    }

    // -------------------------------------------------------------------
    // Leadership and liveness
    // -------------------------------------------------------------------

    fn handle_new_leader(&mut self, addr: Address) {
        if self.master.as_ref() == Some(&addr) {
            debug!(master = %addr, "leader unchanged");
            return;
        }
        info!(master = %addr, "new master elected");
        self.master = Some(addr.clone());
        self.master_lost = false;
        self.reregistering = true;
        self.post.monitor(&addr);

        let executors: Vec<ExecutorSnapshot> = self
            .frameworks
            .values()
            .filter_map(|fw| {
                fw.executor_address().map(|address| ExecutorSnapshot {
                    framework_id: fw.id.clone(),
                    address: address.clone(),
                })
            })
            .collect();
        let tasks: Vec<TaskSnapshot> = self
            .frameworks
            .values()
            .flat_map(|fw| {
                fw.tasks.values().map(|task| TaskSnapshot {
                    framework_id: fw.id.clone(),
                    task_id: task.id.clone(),
                    name: task.name.clone(),
                    state: task.state,
                    resources: task.resources,
                })
            })
            .collect();

        self.send_to_master(AgentToMaster::Reregister {
            agent_id: self.agent_id.clone(),
            capacity: self.capacity,
            executors,
            tasks,
        });
    }

    fn handle_peer_exited(&mut self, ctx: &ActorContext<AgentEvent>, addr: Address) {
        if self.master.as_ref() != Some(&addr) {
            debug!(peer = %addr, "peer exited");
            return;
        }
        if self.fault_tolerant {
            warn!(master = %addr, "master exited; keeping executors and awaiting a new leader");
        } else {
            warn!(
                master = %addr,
                grace = ?self.timeouts.master_grace,
                "master exited; shutting down unless it returns"
            );
            self.master_lost = true;
            ctx.notify_after(self.timeouts.master_grace, AgentEvent::MasterGraceExpired);
        }
    }

    // -------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------

    fn handle_registration_timeout(&mut self, framework_id: FrameworkId, epoch: u64) {
        let Some(fw) = self.frameworks.get(&framework_id) else {
            return;
        };
        if fw.epoch != epoch || fw.executor_address().is_some() {
            return;
        }
        warn!(
            framework_id = %framework_id,
            timeout = ?self.timeouts.registration,
            "executor never registered; treating as exited"
        );
        self.isolation.kill_executor(&framework_id);
        self.handle_executor_exited(
            framework_id,
            ExitReason::Failed("registration timeout".to_string()),
        );
    }

    fn handle_kill_grace_expired(&mut self, framework_id: FrameworkId, epoch: u64) {
        let Some(fw) = self.frameworks.get(&framework_id) else {
            return;
        };
        if fw.epoch != epoch {
            return;
        }
        warn!(framework_id = %framework_id, "shutdown grace expired; killing executor");
        self.isolation.kill_executor(&framework_id);
    }

    // -------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------

    fn kill_all_executors(&mut self) {
        let frameworks: Vec<FrameworkId> = self.frameworks.keys().cloned().collect();
        for framework_id in frameworks {
            if let Some(addr) = self
                .frameworks
                .get(&framework_id)
                .and_then(|fw| fw.executor_address().cloned())
            {
                self.send_to_executor(&addr, AgentToExecutor::Shutdown);
            }
            self.isolation.kill_executor(&framework_id);
        }
    }

    fn handle_from_master(
        &mut self,
        ctx: &ActorContext<AgentEvent>,
        from: Address,
        msg: MasterToAgent,
    ) -> Result<bool, ActorError> {
        if self.master.as_ref() != Some(&from) {
            warn!(from = %from, "ignoring message from non-leading master");
            return Ok(true);
        }
        // Traffic from the master cancels a pending loss window.
        self.master_lost = false;

        match msg {
            MasterToAgent::Registered { agent_id } => self.handle_registered(agent_id),
            MasterToAgent::ReregisterAck { agent_id } => self.handle_reregister_ack(agent_id),
            MasterToAgent::RunTask {
                framework_id,
                framework,
                task,
            } => self.handle_run_task(ctx, framework_id, framework, task)?,
            MasterToAgent::KillTask {
                framework_id,
                task_id,
            } => self.handle_kill_task(framework_id, task_id),
            MasterToAgent::KillFramework { framework_id } => {
                self.handle_kill_framework(ctx, framework_id)
            }
            MasterToAgent::FrameworkMessage { framework_id, data } => {
                self.handle_master_relay(framework_id, data)
            }
        }
        Ok(true)
    }

    fn handle_from_executor(&mut self, ctx: &ActorContext<AgentEvent>, from: Address, msg: ExecutorToAgent) {
        match msg {
            ExecutorToAgent::Register { framework_id } => {
                self.handle_executor_register(ctx, from, framework_id)
            }
            ExecutorToAgent::StatusUpdate {
                framework_id,
                task_id,
                state,
                message,
            } => self.handle_executor_status(from, framework_id, task_id, state, message),
            ExecutorToAgent::FrameworkMessage { framework_id, data } => {
                self.handle_executor_relay(framework_id, data)
            }
        }
    }
}

#[async_trait]
impl Actor for Agent {
    type Message = AgentEvent;

    fn name(&self) -> &str {
        "agent"
    }

    async fn on_start(&mut self, _ctx: &mut ActorContext<AgentEvent>) -> Result<(), ActorError> {
        if let Some(master) = self.master.clone() {
            info!(master = %master, capacity = %self.capacity, "registering with master");
            self.post.monitor(&master);
            self.send_to_master(AgentToMaster::Register {
                capacity: self.capacity,
            });
        } else {
            info!(capacity = %self.capacity, "awaiting leader election");
        }
        Ok(())
    }

    async fn handle(
        &mut self,
        msg: AgentEvent,
        ctx: &mut ActorContext<AgentEvent>,
    ) -> Result<bool, ActorError> {
        match msg {
            AgentEvent::FromMaster(from, msg) => return self.handle_from_master(ctx, from, msg),
            AgentEvent::FromExecutor(from, msg) => self.handle_from_executor(ctx, from, msg),
            AgentEvent::ExecutorExited {
                framework_id,
                reason,
            } => self.handle_executor_exited(framework_id, reason),
            AgentEvent::ExecutorNote { framework_id, note } => {
                self.handle_executor_note(framework_id, note)
            }
            AgentEvent::NewLeader(addr) => self.handle_new_leader(addr),
            AgentEvent::PeerExited(addr) => self.handle_peer_exited(ctx, addr),
            AgentEvent::RegistrationTimeout {
                framework_id,
                epoch,
            } => self.handle_registration_timeout(framework_id, epoch),
            AgentEvent::KillGraceExpired {
                framework_id,
                epoch,
            } => self.handle_kill_grace_expired(framework_id, epoch),
            AgentEvent::MasterGraceExpired => {
                if self.master_lost {
                    warn!("master did not return; shutting down");
                    self.kill_all_executors();
                    return Ok(false);
                }
                debug!("master returned before the grace window expired");
            }
            AgentEvent::Shutdown => {
                info!("shutdown requested; killing all executors");
                self.kill_all_executors();
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn on_stop(&mut self, _ctx: &mut ActorContext<AgentEvent>) {
        info!(
            frameworks = self.frameworks.len(),
            committed = %self.committed,
            "agent stopping"
        );
    }
}
