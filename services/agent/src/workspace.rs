//! Per-framework work directories.
//!
//! Each framework gets `<base>/agent-<agent_id>/framework-<framework_id>/`,
//! created lazily on first launch and owned by the framework's user. The
//! tree is deleted when the framework record is removed. A failure to
//! create or chown is surfaced to the caller, which treats it like any
//! other isolation failure.

use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{chown, geteuid, User};
use quarry_id::{AgentId, FrameworkId};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to look up user {user:?}: {source}")]
    UserLookup { user: String, source: nix::Error },

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("failed to chown {path} to {user:?}: {source}")]
    Chown {
        path: PathBuf,
        user: String,
        source: nix::Error,
    },
}

/// Computes, creates, and removes framework work directories.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The deterministic directory for one framework on one agent.
    pub fn framework_dir(&self, agent_id: &AgentId, framework_id: &FrameworkId) -> PathBuf {
        self.base
            .join(format!("agent-{agent_id}"))
            .join(format!("framework-{framework_id}"))
    }

    /// Creates the framework directory and assigns it to `user`.
    pub fn create(
        &self,
        agent_id: &AgentId,
        framework_id: &FrameworkId,
        user: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let dir = self.framework_dir(agent_id, framework_id);
        std::fs::create_dir_all(&dir).map_err(|source| WorkspaceError::Create {
            path: dir.clone(),
            source,
        })?;

        if !runs_as(user) {
            let record = User::from_name(user)
                .map_err(|source| WorkspaceError::UserLookup {
                    user: user.to_string(),
                    source,
                })?
                .ok_or_else(|| WorkspaceError::UnknownUser(user.to_string()))?;
            chown(&dir, Some(record.uid), Some(record.gid)).map_err(|source| {
                WorkspaceError::Chown {
                    path: dir.clone(),
                    user: user.to_string(),
                    source,
                }
            })?;
        }

        debug!(path = %dir.display(), user, "workspace ready");
        Ok(dir)
    }

    /// Deletes the framework's tree. Missing directories are fine;
    /// anything else is logged and swallowed; the framework is going
    /// away regardless.
    pub fn remove(&self, agent_id: &AgentId, framework_id: &FrameworkId) {
        let dir = self.framework_dir(agent_id, framework_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => debug!(path = %dir.display(), "workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove workspace"),
        }
    }
}

/// Whether the agent itself already runs as `user`.
fn runs_as(user: &str) -> bool {
    User::from_uid(geteuid())
        .ok()
        .flatten()
        .map(|u| u.name == user)
        .unwrap_or(false)
}
