//! Leader watching for fault-tolerant deployments.
//!
//! A watcher observes the external coordination service and reports the
//! currently elected master by enqueuing [`AgentEvent::NewLeader`]
//! messages. It runs on its own task; that message is its only effect on
//! the agent. When no leader is known it emits nothing; the agent keeps
//! its last master until a new one is observed.

use std::time::Duration;

use async_trait::async_trait;
use quarry_post::Address;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::actor::ActorHandle;
use crate::agent::AgentEvent;

/// Observes leader elections and announces the winner.
#[async_trait]
pub trait LeaderWatcher: Send + 'static {
    /// Runs until the agent goes away.
    async fn run(self: Box<Self>, events: ActorHandle<AgentEvent>);
}

/// Document served by the coordination service at `<base>/leader`.
#[derive(Debug, Deserialize)]
struct LeaderDoc {
    address: Address,
}

/// Polls an HTTP coordination service for the elected master.
pub struct HttpLeaderWatcher {
    url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl HttpLeaderWatcher {
    pub fn new(base_url: &str, interval: Duration) -> Self {
        let url = format!("{}/leader", base_url.trim_end_matches('/'));
        Self {
            url,
            interval,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self) -> Option<Address> {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %self.url, error = %e, "leader poll failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url = %self.url, status = %response.status(), "no leader elected");
            return None;
        }
        match response.json::<LeaderDoc>().await {
            Ok(doc) => Some(doc.address),
            Err(e) => {
                warn!(url = %self.url, error = %e, "malformed leader document");
                None
            }
        }
    }
}

#[async_trait]
impl LeaderWatcher for HttpLeaderWatcher {
    async fn run(self: Box<Self>, events: ActorHandle<AgentEvent>) {
        let mut last: Option<Address> = None;
        loop {
            if let Some(addr) = self.fetch().await {
                if last.as_ref() != Some(&addr) {
                    debug!(leader = %addr, "observed leader");
                    last = Some(addr.clone());
                    if events.send(AgentEvent::NewLeader(addr)).await.is_err() {
                        return;
                    }
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Test watcher driven by a `watch` channel. Every `Some` value sent on
/// the channel is announced, including repeats, so tests can exercise
/// the agent's own deduplication.
pub struct StubLeaderWatcher {
    rx: watch::Receiver<Option<Address>>,
}

impl StubLeaderWatcher {
    pub fn new() -> (watch::Sender<Option<Address>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

#[async_trait]
impl LeaderWatcher for StubLeaderWatcher {
    async fn run(mut self: Box<Self>, events: ActorHandle<AgentEvent>) {
        loop {
            if self.rx.changed().await.is_err() {
                return;
            }
            let addr = self.rx.borrow_and_update().clone();
            if let Some(addr) = addr {
                if events.send(AgentEvent::NewLeader(addr)).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Spawns a watcher on its own task.
pub fn spawn(watcher: Box<dyn LeaderWatcher>, events: ActorHandle<AgentEvent>) {
    tokio::spawn(watcher.run(events));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor;

    #[tokio::test]
    async fn stub_watcher_announces_each_value() {
        let (tx, watcher) = StubLeaderWatcher::new();
        let (events, mut rx) = actor::mailbox("agent", 16);
        spawn(Box::new(watcher), events);

        let m1: Address = "master1@10.0.0.1:5050".parse().unwrap();
        tx.send(Some(m1.clone())).unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::NewLeader(addr) => assert_eq!(addr, m1),
            other => panic!("unexpected event: {other:?}"),
        }

        // A repeated announcement is passed through verbatim.
        tx.send(Some(m1.clone())).unwrap();
        match rx.recv().await.unwrap() {
            AgentEvent::NewLeader(addr) => assert_eq!(addr, m1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stub_watcher_skips_none() {
        let (tx, watcher) = StubLeaderWatcher::new();
        let (events, mut rx) = actor::mailbox("agent", 16);
        spawn(Box::new(watcher), events);

        tx.send(None).unwrap();
        let m2: Address = "master2@10.0.0.2:5050".parse().unwrap();
        tx.send(Some(m2.clone())).unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::NewLeader(addr) => assert_eq!(addr, m2),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn http_watcher_builds_leader_url() {
        let watcher = HttpLeaderWatcher::new("http://coord:2181/", Duration::from_secs(1));
        assert_eq!(watcher.url, "http://coord:2181/leader");
    }
}
