//! Wire messages exchanged between master, agent, and executors.
//!
//! Four directional enums, one per edge of the protocol, plus the
//! [`WireMessage`] envelope the transport actually carries. Variants are
//! serde-tagged so a future socket transport can frame them however it
//! likes.

use chrono::{DateTime, Utc};
use quarry_id::{AgentId, FrameworkId, TaskId};
use quarry_post::Address;
use serde::{Deserialize, Serialize};

use crate::{FrameworkManifest, ResourceVector, TaskDescription, TaskState};

/// An executor link reported during re-registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSnapshot {
    pub framework_id: FrameworkId,
    pub address: Address,
}

/// A task reported during re-registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub framework_id: FrameworkId,
    pub task_id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub resources: ResourceVector,
}

/// Messages from the master to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MasterToAgent {
    /// Registration accepted; a fresh agent id was assigned.
    Registered { agent_id: AgentId },

    /// Re-registration accepted; the agent keeps the id it presented.
    ReregisterAck { agent_id: AgentId },

    /// Launch a task on behalf of a framework. The manifest lets the
    /// agent create the framework record on first contact.
    RunTask {
        framework_id: FrameworkId,
        framework: FrameworkManifest,
        task: TaskDescription,
    },

    /// Kill one task.
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },

    /// Tear down a framework and everything it owns on this agent.
    KillFramework { framework_id: FrameworkId },

    /// Opaque data relayed to the framework's executor.
    FrameworkMessage {
        framework_id: FrameworkId,
        data: Vec<u8>,
    },
}

/// Messages from an agent to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentToMaster {
    /// First contact: advertise capacity.
    Register { capacity: ResourceVector },

    /// Contact after a leader change: everything the new master needs to
    /// adopt this agent's state.
    Reregister {
        agent_id: Option<AgentId>,
        capacity: ResourceVector,
        executors: Vec<ExecutorSnapshot>,
        tasks: Vec<TaskSnapshot>,
    },

    /// A task changed state.
    StatusUpdate {
        framework_id: FrameworkId,
        task_id: TaskId,
        state: TaskState,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Opaque data relayed from the framework's executor.
    FrameworkMessage {
        framework_id: FrameworkId,
        data: Vec<u8>,
    },
}

/// Messages from an executor to its agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorToAgent {
    /// The executor process is up and ready for tasks.
    Register { framework_id: FrameworkId },

    /// A task changed state.
    StatusUpdate {
        framework_id: FrameworkId,
        task_id: TaskId,
        state: TaskState,
        message: String,
    },

    /// Opaque data relayed to the master.
    FrameworkMessage {
        framework_id: FrameworkId,
        data: Vec<u8>,
    },
}

/// Messages from an agent to one of its executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentToExecutor {
    /// Launch a task.
    RunTask { task: TaskDescription },

    /// Kill one task.
    KillTask { task_id: TaskId },

    /// A status update was accepted and forwarded.
    StatusUpdateAck { task_id: TaskId },

    /// Opaque data relayed from the master.
    FrameworkMessage {
        framework_id: FrameworkId,
        data: Vec<u8>,
    },

    /// Shut down: kill remaining tasks and exit.
    Shutdown,
}

/// The transport payload: one envelope for every edge so a single
/// mailbox carries the whole protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum WireMessage {
    Master(MasterToAgent),
    Agent(AgentToMaster),
    Executor(ExecutorToAgent),
    Command(AgentToExecutor),
}
