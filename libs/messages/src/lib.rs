//! Protocol vocabulary shared by the quarry master, agents, and executors.
//!
//! This crate defines the value types that cross process boundaries
//! (resource vectors, task descriptions and states, framework manifests,
//! re-registration snapshots) and the tagged message enums exchanged
//! over the transport. The bit-exact encoding is the transport's
//! business; everything here is plain serde data.

mod framework;
mod protocol;
mod resources;
mod task;

pub use framework::{ExecutorManifest, FrameworkManifest};
pub use protocol::{
    AgentToExecutor, AgentToMaster, ExecutorSnapshot, ExecutorToAgent, MasterToAgent,
    TaskSnapshot, WireMessage,
};
pub use resources::{ResourceParseError, ResourceVector};
pub use task::{TaskDescription, TaskState};
