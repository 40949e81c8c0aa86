//! In-process message routing between bound addresses.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::Address;

/// Environment variable selecting the port bindings advertise.
pub const PORT_ENV: &str = "POST_PORT";

const DEFAULT_PORT: u16 = 5050;

/// Errors from hub operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostError {
    /// Another mailbox is already bound under this name.
    #[error("address name {0:?} already bound")]
    NameTaken(String),
}

/// What a mailbox yields.
#[derive(Debug)]
pub enum Delivery<M> {
    /// A message from another participant.
    Message { from: Address, payload: M },

    /// A monitored address went silent.
    PeerExited { peer: Address },
}

struct Registry<M> {
    bindings: HashMap<Address, mpsc::UnboundedSender<Delivery<M>>>,
    monitors: HashMap<Address, HashSet<Address>>,
}

/// Routes messages between addresses bound on this hub.
///
/// Cloning a `Hub` yields another handle to the same router.
pub struct Hub<M> {
    registry: Arc<Mutex<Registry<M>>>,
    ip: Ipv4Addr,
    port: u16,
}

impl<M> Clone for Hub<M> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            ip: self.ip,
            port: self.port,
        }
    }
}

impl<M: Send + 'static> Hub<M> {
    /// Creates an empty hub. The advertised port comes from `POST_PORT`
    /// when set.
    pub fn new() -> Self {
        let port = std::env::var(PORT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            registry: Arc::new(Mutex::new(Registry {
                bindings: HashMap::new(),
                monitors: HashMap::new(),
            })),
            ip: Ipv4Addr::LOCALHOST,
            port,
        }
    }

    /// Binds a name, yielding a send handle and the receiving mailbox.
    pub fn bind(&self, name: &str) -> Result<(Post<M>, Mailbox<M>), PostError> {
        let address = Address::new(name, self.ip, self.port);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut reg = self.registry.lock().expect("hub registry poisoned");
            if reg.bindings.contains_key(&address) {
                return Err(PostError::NameTaken(name.to_string()));
            }
            reg.bindings.insert(address.clone(), tx);
        }
        let post = Post {
            hub: self.clone(),
            from: address.clone(),
        };
        let mailbox = Mailbox {
            hub: self.clone(),
            address,
            rx,
        };
        Ok((post, mailbox))
    }

    /// Delivers `payload` from `from` to `to`. Returns whether the
    /// destination was reachable; an unreachable destination drops the
    /// message.
    pub fn send(&self, from: &Address, to: &Address, payload: M) -> bool {
        let reg = self.registry.lock().expect("hub registry poisoned");
        match reg.bindings.get(to) {
            Some(tx) => tx
                .send(Delivery::Message {
                    from: from.clone(),
                    payload,
                })
                .is_ok(),
            None => {
                debug!(to = %to, "dropping message to unbound address");
                false
            }
        }
    }

    /// Asks for a `PeerExited` notification at `watcher` when `target`
    /// goes away. A target that is already gone notifies immediately.
    pub fn monitor(&self, watcher: &Address, target: &Address) {
        let mut reg = self.registry.lock().expect("hub registry poisoned");
        if reg.bindings.contains_key(target) {
            reg.monitors
                .entry(target.clone())
                .or_default()
                .insert(watcher.clone());
        } else if let Some(tx) = reg.bindings.get(watcher) {
            let _ = tx.send(Delivery::PeerExited {
                peer: target.clone(),
            });
        }
    }

    /// Removes a binding and notifies its monitors.
    pub fn unbind(&self, address: &Address) {
        let mut reg = self.registry.lock().expect("hub registry poisoned");
        if reg.bindings.remove(address).is_none() {
            return;
        }
        if let Some(watchers) = reg.monitors.remove(address) {
            for watcher in watchers {
                if let Some(tx) = reg.bindings.get(&watcher) {
                    let _ = tx.send(Delivery::PeerExited {
                        peer: address.clone(),
                    });
                }
            }
        }
    }
}

impl<M: Send + 'static> Default for Hub<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Send handle tied to one bound address.
pub struct Post<M> {
    hub: Hub<M>,
    from: Address,
}

impl<M> Clone for Post<M> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            from: self.from.clone(),
        }
    }
}

impl<M: Send + 'static> Post<M> {
    /// The local address messages are sent from.
    pub fn address(&self) -> &Address {
        &self.from
    }

    /// Sends without blocking; drops if the destination is gone.
    pub fn send(&self, to: &Address, payload: M) -> bool {
        self.hub.send(&self.from, to, payload)
    }

    /// Requests a liveness notification for `target`.
    pub fn monitor(&self, target: &Address) {
        self.hub.monitor(&self.from, target);
    }
}

/// Receiving side of a binding. Dropping the mailbox unbinds the address
/// and notifies monitors.
pub struct Mailbox<M> {
    hub: Hub<M>,
    address: Address,
    rx: mpsc::UnboundedReceiver<Delivery<M>>,
}

impl<M: Send + 'static> Mailbox<M> {
    /// The bound address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Waits for the next delivery. `None` after `unbind`.
    pub async fn recv(&mut self) -> Option<Delivery<M>> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Delivery<M>> {
        self.rx.try_recv().ok()
    }
}

impl<M> Drop for Mailbox<M> {
    fn drop(&mut self) {
        // Mirror of Hub::unbind, without requiring M: Send.
        let mut reg = self.hub.registry.lock().expect("hub registry poisoned");
        if reg.bindings.remove(&self.address).is_none() {
            return;
        }
        if let Some(watchers) = reg.monitors.remove(&self.address) {
            for watcher in watchers {
                if let Some(tx) = reg.bindings.get(&watcher) {
                    let _ = tx.send(Delivery::PeerExited {
                        peer: self.address.clone(),
                    });
                }
            }
        }
    }
}
