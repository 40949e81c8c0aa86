//! Agent configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quarry_messages::ResourceVector;
use quarry_post::Address;
use thiserror::Error;

/// Every environment variable with this prefix is cleared at startup so
/// stray settings cannot leak into executors or tests.
pub const ENV_PREFIX: &str = "QUARRY_";

/// Which isolation backend to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationKind {
    /// Fresh process group per executor.
    Process,
    /// cgroup-v2 per executor.
    Cgroup,
    /// Recording stub for tests.
    Stub,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown isolation kind {0:?} (expected process, cgroup, or stub)")]
pub struct ParseIsolationError(String);

impl FromStr for IsolationKind {
    type Err = ParseIsolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Self::Process),
            "cgroup" => Ok(Self::Cgroup),
            "stub" => Ok(Self::Stub),
            other => Err(ParseIsolationError(other.to_string())),
        }
    }
}

impl std::fmt::Display for IsolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Process => "process",
            Self::Cgroup => "cgroup",
            Self::Stub => "stub",
        };
        f.write_str(s)
    }
}

/// Where the agent learns who the master is.
#[derive(Debug, Clone)]
pub enum MasterSource {
    /// A fixed master address; the agent shuts itself down if it goes
    /// away for too long.
    Pid(Address),

    /// A coordination-service URL to watch for leader elections
    /// (fault-tolerant mode).
    Coordinator(String),
}

/// Grace periods and timeouts governing the agent's state machine.
#[derive(Debug, Clone)]
pub struct AgentTimeouts {
    /// From executor launch to its registration.
    pub registration: Duration,

    /// From executor shutdown request to forcible kill.
    pub kill_grace: Duration,

    /// From master loss to self-shutdown in non-fault-tolerant mode.
    pub master_grace: Duration,
}

impl Default for AgentTimeouts {
    fn default() -> Self {
        Self {
            registration: Duration::from_secs(60),
            kill_grace: Duration::from_secs(5),
            master_grace: Duration::from_secs(15),
        }
    }
}

/// Full agent configuration, assembled from the command line.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub master: MasterSource,
    pub capacity: ResourceVector,
    pub isolation: IsolationKind,
    pub work_dir: PathBuf,
    pub quiet: bool,
    pub timeouts: AgentTimeouts,
}

/// Clears every `QUARRY_`-prefixed environment variable.
pub fn scrub_environment() {
    let stale: Vec<String> = std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with(ENV_PREFIX))
        .collect();
    for key in stale {
        std::env::remove_var(&key);
    }
}
