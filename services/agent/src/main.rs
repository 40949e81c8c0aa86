//! quarry agent binary.
//!
//! Registers this host with the cluster master (or follows leader
//! elections in fault-tolerant mode), then serves launch and kill
//! requests until told to shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use quarry_messages::{ResourceVector, WireMessage};
use quarry_post::Hub;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quarry_agent::actor;
use quarry_agent::agent::{self, Agent, AgentEvent};
use quarry_agent::config::{self, AgentConfig, AgentTimeouts, IsolationKind, MasterSource};
use quarry_agent::isolation::{CgroupBackend, IsolationBackend, ProcessBackend, StubBackend};
use quarry_agent::leader::{self, HttpLeaderWatcher};
use quarry_agent::workspace::WorkspaceManager;

const LEADER_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

#[derive(Debug, Parser)]
#[command(name = "quarry-agent", about = "quarry worker-node agent")]
struct Args {
    /// Master address (name@ip:port), or the coordination service URL
    /// when --fault-tolerant is set.
    #[arg(long)]
    master: String,

    /// Follow leader elections through the coordination service named
    /// by --master.
    #[arg(long)]
    fault_tolerant: bool,

    /// Advertised capacity, e.g. cpu:4;mem:1073741824.
    #[arg(long)]
    resources: ResourceVector,

    /// Isolation backend for executors.
    #[arg(long, default_value = "process")]
    isolation: IsolationKind,

    /// Base directory for framework workspaces.
    #[arg(long, default_value = "/tmp/quarry")]
    work_dir: PathBuf,

    /// Silence info-level diagnostics.
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> Result<AgentConfig> {
        let master = if self.fault_tolerant {
            MasterSource::Coordinator(self.master)
        } else {
            MasterSource::Pid(
                self.master
                    .parse()
                    .context("invalid master address (expected name@ip:port)")?,
            )
        };
        Ok(AgentConfig {
            master,
            capacity: self.resources,
            isolation: self.isolation,
            work_dir: self.work_dir,
            quiet: self.quiet,
            timeouts: AgentTimeouts::default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stray settings must not leak into executors or tests.
    config::scrub_environment();

    let default_filter = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = args.into_config()?;
    info!(
        capacity = %cfg.capacity,
        isolation = %cfg.isolation,
        work_dir = %cfg.work_dir.display(),
        "starting quarry agent"
    );

    std::fs::create_dir_all(&cfg.work_dir)
        .with_context(|| format!("cannot create work dir {}", cfg.work_dir.display()))?;

    let hub: Hub<WireMessage> = Hub::new();
    let (post, mailbox) = hub.bind("agent").context("cannot bind agent address")?;
    info!(address = %post.address(), "transport bound");

    let (events, rx) = actor::mailbox::<AgentEvent>("agent", 1024);

    let isolation: Arc<dyn IsolationBackend> = match cfg.isolation {
        IsolationKind::Process => Arc::new(ProcessBackend::new(
            events.clone(),
            cfg.timeouts.kill_grace,
        )),
        IsolationKind::Cgroup => Arc::new(CgroupBackend::new(events.clone(), CGROUP_ROOT)),
        IsolationKind::Stub => Arc::new(StubBackend::new(events.clone())),
    };

    let (master_addr, fault_tolerant) = match &cfg.master {
        MasterSource::Pid(addr) => (Some(addr.clone()), false),
        MasterSource::Coordinator(url) => {
            info!(coordinator = %url, "fault-tolerant mode");
            leader::spawn(
                Box::new(HttpLeaderWatcher::new(url, LEADER_POLL_INTERVAL)),
                events.clone(),
            );
            (None, true)
        }
    };

    let agent = Agent::new(
        cfg.capacity,
        master_addr,
        fault_tolerant,
        post,
        isolation,
        WorkspaceManager::new(&cfg.work_dir),
        cfg.timeouts.clone(),
    );

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = actor::spawn(agent, events.clone(), rx, shutdown_rx);
    tokio::spawn(agent::route(mailbox, events.clone()));

    // SIGTERM/SIGINT become a graceful shutdown event.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let signal_events = events.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        let _ = signal_events.send(AgentEvent::Shutdown).await;
    });

    join.await.context("agent task panicked")?;
    info!("agent exited");
    Ok(())
}
