//! Minimal single-consumer actor runtime.
//!
//! One actor owns its state and processes messages strictly one at a
//! time from a bounded mailbox. Handlers never await external replies;
//! anything that takes time runs elsewhere and reports back by
//! enqueuing another message, including timers scheduled through
//! [`ActorHandle::notify_after`].

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// Behavior of an actor.
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle one message. `Ok(true)` continues, `Ok(false)` stops the
    /// loop, `Err(Permanent)` aborts it.
    async fn handle(
        &mut self,
        msg: Self::Message,
        ctx: &mut ActorContext<Self::Message>,
    ) -> Result<bool, ActorError>;

    /// Called once before the first message.
    async fn on_start(&mut self, _ctx: &mut ActorContext<Self::Message>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called when the loop ends.
    async fn on_stop(&mut self, _ctx: &mut ActorContext<Self::Message>) {}
}

/// Errors surfaced by actors.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Recoverable; the loop keeps running.
    #[error("transient error: {0}")]
    Transient(String),

    /// Contract breach; the loop aborts.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// The actor is gone.
    #[error("actor stopped")]
    Stopped,

    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    name: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Sends a message, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.send(msg).await.map_err(|_| ActorError::Stopped)
    }

    /// Sends without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::Stopped,
        })
    }

    /// Enqueues `msg` after `delay`. This is the only way handlers
    /// schedule future work.
    pub fn notify_after(&self, delay: Duration, msg: M) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        });
    }

    /// The actor's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Context handed to handlers.
pub struct ActorContext<M: Message> {
    /// Actor name.
    pub name: String,

    /// Messages processed so far.
    pub messages_processed: u64,

    handle: ActorHandle<M>,
}

impl<M: Message> ActorContext<M> {
    /// A handle to this actor's own mailbox.
    pub fn handle(&self) -> &ActorHandle<M> {
        &self.handle
    }

    /// Enqueues `msg` to this actor after `delay`.
    pub fn notify_after(&self, delay: Duration, msg: M) {
        self.handle.notify_after(delay, msg);
    }
}

/// Creates a mailbox before the actor exists, so collaborators that
/// report into the actor can be built first.
pub fn mailbox<M: Message>(name: &str, capacity: usize) -> (ActorHandle<M>, mpsc::Receiver<M>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ActorHandle {
            tx,
            name: name.to_string(),
        },
        rx,
    )
}

/// Runs the actor loop on its own task.
pub fn spawn<A: Actor>(
    mut actor: A,
    handle: ActorHandle<A::Message>,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let name = actor.name().to_string();
        let mut ctx = ActorContext {
            name: name.clone(),
            messages_processed: 0,
            handle,
        };

        if let Err(e) = actor.on_start(&mut ctx).await {
            error!(actor = %name, error = %e, "actor failed to start");
            return;
        }
        debug!(actor = %name, "actor started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    match changed {
                        Ok(()) => {
                            if *shutdown.borrow() {
                                info!(actor = %name, "actor received shutdown signal");
                                break;
                            }
                        }
                        Err(_) => {
                            debug!(actor = %name, "shutdown channel closed");
                            break;
                        }
                    }
                }

                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        debug!(actor = %name, "actor mailbox closed");
                        break;
                    };
                    ctx.messages_processed += 1;
                    match actor.handle(msg, &mut ctx).await {
                        Ok(true) => {}
                        Ok(false) => {
                            info!(actor = %name, "actor requested stop");
                            break;
                        }
                        Err(e) => {
                            error!(actor = %name, error = %e, "actor error");
                            if matches!(e, ActorError::Permanent(_)) {
                                break;
                            }
                        }
                    }
                }
            }
        }

        actor.on_stop(&mut ctx).await;
        info!(
            actor = %name,
            messages_processed = ctx.messages_processed,
            "actor stopped"
        );
    })
}
