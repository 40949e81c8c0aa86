//! Executor isolation backends.
//!
//! A backend owns the mechanics of launching, containing, and tearing
//! down executor processes. Backends run their own tasks and communicate
//! with the agent *only* through its mailbox: launches and kills are
//! fire-and-forget from the agent's point of view, and every exit,
//! including a failure to launch at all, arrives as an
//! [`AgentEvent::ExecutorExited`].

mod cgroup;
mod process;
mod stub;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use quarry_id::FrameworkId;
use quarry_messages::ExecutorManifest;
use thiserror::Error;

use crate::agent::AgentEvent;

pub use cgroup::CgroupBackend;
pub use process::ProcessBackend;
pub use stub::{StubBackend, StubCall};

/// Everything a backend needs to start one executor.
#[derive(Debug, Clone)]
pub struct ExecutorLaunch {
    pub framework_id: FrameworkId,
    pub manifest: ExecutorManifest,
    pub user: String,
    pub workdir: PathBuf,

    /// Agent-provided environment, merged over the manifest's.
    pub env: Vec<(String, String)>,
}

/// Why an executor is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The process exited with this code.
    Exited(i32),

    /// The process was killed by this signal.
    Signaled(i32),

    /// The executor never ran to an exit: launch failure, registration
    /// timeout, or a backend-internal error.
    Failed(String),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Exited(code) => write!(f, "exited with code {code}"),
            ExitReason::Signaled(sig) => write!(f, "killed by signal {sig}"),
            ExitReason::Failed(why) => write!(f, "failed: {why}"),
        }
    }
}

/// A point-in-time resource usage reading for one executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSample {
    pub cpu_time: Duration,
    pub mem_bytes: u64,
}

/// Backend-internal failures.
#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("failed to spawn executor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("cgroup setup failed at {path}: {source}")]
    Cgroup {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Launches, kills, and meters executors, one per framework.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Starts the framework's executor. Non-blocking: the real work runs
    /// on a backend task, and any failure surfaces as an
    /// `ExecutorExited` event.
    fn launch_executor(&self, launch: ExecutorLaunch);

    /// Tears the framework's executor down. Non-blocking; the eventual
    /// exit is reported like any other.
    fn kill_executor(&self, framework_id: &FrameworkId);

    /// Current resource usage of the framework's executor, if this
    /// backend can measure it.
    async fn resource_usage(&self, framework_id: &FrameworkId) -> Option<UsageSample>;
}

pub(crate) type Events = crate::actor::ActorHandle<AgentEvent>;
