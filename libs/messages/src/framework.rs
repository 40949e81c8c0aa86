//! Framework and executor manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How to start a framework's executor on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorManifest {
    /// Program to run.
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables set for the executor process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ExecutorManifest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Framework metadata carried alongside the first launch request the
/// agent sees for that framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkManifest {
    /// Human-readable framework name.
    pub name: String,

    /// Unix user the framework's executor and workspace belong to.
    pub user: String,

    /// How to start the framework's executor.
    pub executor: ExecutorManifest,
}
