//! Process-group isolation.
//!
//! Each executor runs in a fresh process group (`setsid` before exec) so
//! a kill reaches the executor and everything it spawned. Teardown sends
//! SIGTERM to the group, then SIGKILL after a grace period.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use quarry_id::FrameworkId;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Events, ExecutorLaunch, ExitReason, IsolationBackend, UsageSample};
use crate::agent::AgentEvent;

/// Runs executors in per-framework process groups.
pub struct ProcessBackend {
    events: Events,
    kill_grace: Duration,
    running: Arc<Mutex<HashMap<FrameworkId, u32>>>,
}

impl ProcessBackend {
    pub fn new(events: Events, kill_grace: Duration) -> Self {
        Self {
            events,
            kill_grace,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn spawn_executor(launch: &ExecutorLaunch) -> std::io::Result<Child> {
    let stdout = File::create(launch.workdir.join("stdout"))?;
    let stderr = File::create(launch.workdir.join("stderr"))?;

    let mut cmd = Command::new(&launch.manifest.command);
    cmd.args(&launch.manifest.args)
        .current_dir(&launch.workdir)
        .envs(launch.manifest.env.iter())
        .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    // New session => new process group, detached from our terminal.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    cmd.spawn()
}

fn exit_reason(status: std::process::ExitStatus) -> ExitReason {
    if let Some(code) = status.code() {
        ExitReason::Exited(code)
    } else if let Some(sig) = status.signal() {
        ExitReason::Signaled(sig)
    } else {
        ExitReason::Failed("unknown wait status".to_string())
    }
}

#[async_trait]
impl IsolationBackend for ProcessBackend {
    fn launch_executor(&self, launch: ExecutorLaunch) {
        let events = self.events.clone();
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let framework_id = launch.framework_id.clone();
            let mut child = match spawn_executor(&launch) {
                Ok(child) => child,
                Err(e) => {
                    warn!(
                        framework_id = %framework_id,
                        command = %launch.manifest.command,
                        error = %e,
                        "executor failed to launch"
                    );
                    let _ = events
                        .send(AgentEvent::ExecutorExited {
                            framework_id,
                            reason: ExitReason::Failed(format!("spawn failed: {e}")),
                        })
                        .await;
                    return;
                }
            };

            if let Some(pid) = child.id() {
                info!(framework_id = %framework_id, pid, "executor started");
                running
                    .lock()
                    .expect("process table poisoned")
                    .insert(framework_id.clone(), pid);
                let _ = events
                    .send(AgentEvent::ExecutorNote {
                        framework_id: framework_id.clone(),
                        note: format!("pid {pid}"),
                    })
                    .await;
            }

            let reason = match child.wait().await {
                Ok(status) => exit_reason(status),
                Err(e) => ExitReason::Failed(format!("wait failed: {e}")),
            };
            running
                .lock()
                .expect("process table poisoned")
                .remove(&framework_id);
            let _ = events
                .send(AgentEvent::ExecutorExited {
                    framework_id,
                    reason,
                })
                .await;
        });
    }

    fn kill_executor(&self, framework_id: &FrameworkId) {
        let pid = self
            .running
            .lock()
            .expect("process table poisoned")
            .get(framework_id)
            .copied();
        let Some(pid) = pid else {
            debug!(framework_id = %framework_id, "no running executor to kill");
            return;
        };

        let running = Arc::clone(&self.running);
        let framework_id = framework_id.clone();
        let grace = self.kill_grace;
        tokio::spawn(async move {
            let group = Pid::from_raw(pid as i32);
            debug!(framework_id = %framework_id, pid, "sending SIGTERM to executor group");
            let _ = killpg(group, Signal::SIGTERM);

            tokio::time::sleep(grace).await;

            let still_running = running
                .lock()
                .expect("process table poisoned")
                .contains_key(&framework_id);
            if still_running {
                warn!(framework_id = %framework_id, pid, "executor ignored SIGTERM; sending SIGKILL");
                let _ = killpg(group, Signal::SIGKILL);
            }
        });
    }

    async fn resource_usage(&self, _framework_id: &FrameworkId) -> Option<UsageSample> {
        // Plain process groups carry no accounting.
        None
    }
}
