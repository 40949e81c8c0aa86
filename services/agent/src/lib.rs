//! quarry worker-node agent.
//!
//! The agent runs on every worker host. It registers with the cluster
//! master, advertises the host's capacity, launches one executor per
//! tenant framework through a pluggable isolation backend, keeps the
//! task ledger, and streams status updates back to the master. In
//! fault-tolerant deployments it follows leader elections and
//! re-registers with whichever master wins.
//!
//! ## Architecture
//!
//! One actor owns all mutable state:
//!
//! ```text
//! transport mailbox ─┐
//! isolation backend ─┼─► Agent actor (single consumer) ─► outbound sends
//! leader watcher    ─┤
//! timers, signals   ─┘
//! ```
//!
//! Helpers run on their own tasks but only ever enqueue messages; no
//! handler blocks on I/O mid-transition.
//!
//! ## Modules
//!
//! - `actor`: minimal mailbox/actor runtime
//! - `agent`: the agent state machine
//! - `isolation`: executor launch/kill backends (`process`, `cgroup`, `stub`)
//! - `leader`: coordination-service leader watching
//! - `workspace`: per-framework work directories
//! - `config`: agent configuration

pub mod actor;
pub mod agent;
pub mod config;
pub mod isolation;
pub mod leader;
pub mod workspace;

pub use agent::{Agent, AgentEvent};
pub use config::{AgentConfig, AgentTimeouts, IsolationKind, MasterSource};
