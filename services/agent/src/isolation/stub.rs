//! Recording stub backend for tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_id::FrameworkId;

use super::{Events, ExecutorLaunch, ExitReason, IsolationBackend, UsageSample};
use crate::agent::AgentEvent;

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Launch {
        framework_id: FrameworkId,
        command: String,
        workdir: PathBuf,
    },
    Kill {
        framework_id: FrameworkId,
    },
}

/// Records every call and lets the harness inject executor exits.
pub struct StubBackend {
    events: Events,
    calls: Arc<Mutex<Vec<StubCall>>>,
    usage: Arc<Mutex<HashMap<FrameworkId, UsageSample>>>,
}

impl StubBackend {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            calls: Arc::new(Mutex::new(Vec::new())),
            usage: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().expect("stub calls poisoned").clone()
    }

    /// Number of launches recorded so far.
    pub fn launch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StubCall::Launch { .. }))
            .count()
    }

    /// Number of kills recorded so far.
    pub fn kill_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StubCall::Kill { .. }))
            .count()
    }

    /// Makes `resource_usage` return `sample` for this framework.
    pub fn set_usage(&self, framework_id: FrameworkId, sample: UsageSample) {
        self.usage
            .lock()
            .expect("stub usage poisoned")
            .insert(framework_id, sample);
    }

    /// Delivers an executor exit into the agent mailbox, as a real
    /// backend would.
    pub async fn inject_exit(&self, framework_id: FrameworkId, reason: ExitReason) {
        let _ = self
            .events
            .send(AgentEvent::ExecutorExited {
                framework_id,
                reason,
            })
            .await;
    }
}

#[async_trait]
impl IsolationBackend for StubBackend {
    fn launch_executor(&self, launch: ExecutorLaunch) {
        self.calls
            .lock()
            .expect("stub calls poisoned")
            .push(StubCall::Launch {
                framework_id: launch.framework_id,
                command: launch.manifest.command,
                workdir: launch.workdir,
            });
    }

    fn kill_executor(&self, framework_id: &FrameworkId) {
        self.calls
            .lock()
            .expect("stub calls poisoned")
            .push(StubCall::Kill {
                framework_id: framework_id.clone(),
            });
    }

    async fn resource_usage(&self, framework_id: &FrameworkId) -> Option<UsageSample> {
        self.usage
            .lock()
            .expect("stub usage poisoned")
            .get(framework_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_messages::ExecutorManifest;
    use std::time::Duration;

    fn launch(fid: &str) -> ExecutorLaunch {
        ExecutorLaunch {
            framework_id: FrameworkId::new(fid),
            manifest: ExecutorManifest::new("/bin/executor"),
            user: "nobody".to_string(),
            workdir: PathBuf::from("/tmp/quarry/f"),
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let (events, _rx) = crate::actor::mailbox("agent", 4);
        let backend = StubBackend::new(events);

        backend.launch_executor(launch("f1"));
        backend.kill_executor(&FrameworkId::new("f1"));

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], StubCall::Launch { framework_id, .. } if framework_id == &FrameworkId::new("f1")));
        assert!(matches!(&calls[1], StubCall::Kill { framework_id } if framework_id == &FrameworkId::new("f1")));
    }

    #[tokio::test]
    async fn injected_exit_reaches_the_mailbox() {
        let (events, mut rx) = crate::actor::mailbox("agent", 4);
        let backend = StubBackend::new(events);

        backend
            .inject_exit(FrameworkId::new("f1"), ExitReason::Exited(0))
            .await;

        match rx.recv().await.unwrap() {
            AgentEvent::ExecutorExited {
                framework_id,
                reason,
            } => {
                assert_eq!(framework_id, FrameworkId::new("f1"));
                assert_eq!(reason, ExitReason::Exited(0));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn configured_usage_is_returned() {
        let (events, _rx) = crate::actor::mailbox("agent", 4);
        let backend = StubBackend::new(events);
        let sample = UsageSample {
            cpu_time: Duration::from_secs(3),
            mem_bytes: 1024,
        };

        backend.set_usage(FrameworkId::new("f1"), sample.clone());

        assert_eq!(
            backend.resource_usage(&FrameworkId::new("f1")).await,
            Some(sample)
        );
        assert!(backend.resource_usage(&FrameworkId::new("f2")).await.is_none());
    }
}
