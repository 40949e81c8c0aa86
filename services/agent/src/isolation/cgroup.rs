//! cgroup-v2 isolation.
//!
//! Each executor gets its own cgroup under the configured root. The
//! child is started in a fresh process group and attached to the cgroup
//! right after spawn; teardown uses `cgroup.kill`, which takes the whole
//! subtree down at once. Usage readings come from `memory.current` and
//! `cpu.stat`.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use quarry_id::FrameworkId;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Events, ExecutorLaunch, ExitReason, IsolationBackend, IsolationError, UsageSample};
use crate::agent::AgentEvent;

struct CgroupEntry {
    dir: PathBuf,
    pid: u32,
}

/// Runs executors inside per-framework cgroups.
pub struct CgroupBackend {
    events: Events,
    root: PathBuf,
    running: Arc<Mutex<HashMap<FrameworkId, CgroupEntry>>>,
}

impl CgroupBackend {
    pub fn new(events: Events, root: impl Into<PathBuf>) -> Self {
        Self {
            events,
            root: root.into(),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cgroup_dir(&self, framework_id: &FrameworkId) -> PathBuf {
        self.root.join(format!("quarry-{framework_id}"))
    }
}

fn spawn_in_cgroup(launch: &ExecutorLaunch, dir: &Path) -> Result<Child, IsolationError> {
    std::fs::create_dir_all(dir).map_err(|source| IsolationError::Cgroup {
        path: dir.to_path_buf(),
        source,
    })?;

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

    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn()?;

    if let Some(pid) = child.id() {
        std::fs::write(dir.join("cgroup.procs"), pid.to_string()).map_err(|source| {
            IsolationError::Cgroup {
                path: dir.join("cgroup.procs"),
                source,
            }
        })?;
    }

    Ok(child)
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

/// Pulls `usage_usec` out of a cgroup-v2 `cpu.stat` file.
fn parse_cpu_stat(content: &str) -> Option<u64> {
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() == Some("usage_usec") {
            return parts.next().and_then(|v| v.parse().ok());
        }
    }
    None
}

#[async_trait]
impl IsolationBackend for CgroupBackend {
    fn launch_executor(&self, launch: ExecutorLaunch) {
        let events = self.events.clone();
        let running = Arc::clone(&self.running);
        let dir = self.cgroup_dir(&launch.framework_id);

        tokio::spawn(async move {
            let framework_id = launch.framework_id.clone();
            let mut child = match spawn_in_cgroup(&launch, &dir) {
                Ok(child) => child,
                Err(e) => {
                    warn!(
                        framework_id = %framework_id,
                        cgroup = %dir.display(),
                        error = %e,
                        "executor failed to launch"
                    );
                    let _ = std::fs::remove_dir(&dir);
                    let _ = events
                        .send(AgentEvent::ExecutorExited {
                            framework_id,
                            reason: ExitReason::Failed(e.to_string()),
                        })
                        .await;
                    return;
                }
            };

            if let Some(pid) = child.id() {
                info!(
                    framework_id = %framework_id,
                    pid,
                    cgroup = %dir.display(),
                    "executor started"
                );
                running.lock().expect("cgroup table poisoned").insert(
                    framework_id.clone(),
                    CgroupEntry {
                        dir: dir.clone(),
                        pid,
                    },
                );
                let _ = events
                    .send(AgentEvent::ExecutorNote {
                        framework_id: framework_id.clone(),
                        note: format!("cgroup {} pid {pid}", dir.display()),
                    })
                    .await;
            }

            let reason = match child.wait().await {
                Ok(status) => exit_reason(status),
                Err(e) => ExitReason::Failed(format!("wait failed: {e}")),
            };
            running
                .lock()
                .expect("cgroup table poisoned")
                .remove(&framework_id);
            if let Err(e) = std::fs::remove_dir(&dir) {
                debug!(cgroup = %dir.display(), error = %e, "could not remove cgroup");
            }
            let _ = events
                .send(AgentEvent::ExecutorExited {
                    framework_id,
                    reason,
                })
                .await;
        });
    }

    fn kill_executor(&self, framework_id: &FrameworkId) {
        let entry = {
            let running = self.running.lock().expect("cgroup table poisoned");
            running
                .get(framework_id)
                .map(|e| (e.dir.clone(), e.pid))
        };
        let Some((dir, pid)) = entry else {
            debug!(framework_id = %framework_id, "no running executor to kill");
            return;
        };

        debug!(framework_id = %framework_id, cgroup = %dir.display(), "killing executor cgroup");
        if let Err(e) = std::fs::write(dir.join("cgroup.kill"), "1") {
            warn!(
                framework_id = %framework_id,
                error = %e,
                "cgroup.kill unavailable; falling back to SIGKILL on the process group"
            );
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }

    async fn resource_usage(&self, framework_id: &FrameworkId) -> Option<UsageSample> {
        let dir = {
            let running = self.running.lock().expect("cgroup table poisoned");
            running.get(framework_id).map(|e| e.dir.clone())
        }?;

        let mem_bytes = tokio::fs::read_to_string(dir.join("memory.current"))
            .await
            .ok()?
            .trim()
            .parse()
            .ok()?;
        let cpu_usec = parse_cpu_stat(&tokio::fs::read_to_string(dir.join("cpu.stat")).await.ok()?)?;

        Some(UsageSample {
            cpu_time: Duration::from_micros(cpu_usec),
            mem_bytes,
        })
    }
}
