//! Addressable message delivery for quarry services.
//!
//! Every participant in the cluster protocol (master, agent, executor)
//! is reachable through an [`Address`]: a `(name, ip, port)` tuple that is
//! the sole handle for sending a message. The [`Hub`] routes messages
//! between bound addresses and tracks per-correspondent liveness: when an
//! address goes away, everyone monitoring it receives a synthetic
//! [`Delivery::PeerExited`] notification.
//!
//! Delivery is ordered per sender/receiver pair and never blocks the
//! sender; a message to an unknown or departed address is dropped. The
//! wire encoding over real sockets belongs to a future transport and is
//! not part of this crate.

mod address;
mod hub;

pub use address::{Address, AddressParseError};
pub use hub::{Delivery, Hub, Mailbox, Post, PostError};
