//! Task descriptions and lifecycle states.

use std::collections::BTreeMap;

use quarry_id::TaskId;
use serde::{Deserialize, Serialize};

use crate::ResourceVector;

/// Lifecycle state of a task.
///
/// `Starting` and `Running` are live; the rest are terminal. A task
/// never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// True for states a task can still leave.
    pub fn is_live(&self) -> bool {
        matches!(self, TaskState::Starting | TaskState::Running)
    }

    /// True for states a task never leaves.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// A task the master wants launched: identity, an opaque payload handed
/// to the executor, free-form parameters, and the resource footprint
/// charged against the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub resources: ResourceVector,
}

impl TaskDescription {
    /// Convenience constructor with empty payload and params.
    pub fn new(task_id: TaskId, name: impl Into<String>, resources: ResourceVector) -> Self {
        Self {
            task_id,
            name: name.into(),
            payload: Vec::new(),
            params: BTreeMap::new(),
            resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_partition() {
        for state in [TaskState::Starting, TaskState::Running] {
            assert!(state.is_live());
            assert!(!state.is_terminal());
        }
        for state in [
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Lost,
        ] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&TaskState::Lost).unwrap();
        assert_eq!(json, "\"lost\"");
    }

    #[test]
    fn description_roundtrip() {
        let mut desc = TaskDescription::new(
            TaskId::new("t1"),
            "crawler",
            ResourceVector::new(1.0, 128),
        );
        desc.params.insert("shard".to_string(), "3".to_string());
        let json = serde_json::to_string(&desc).unwrap();
        let parsed: TaskDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, parsed);
    }
}
