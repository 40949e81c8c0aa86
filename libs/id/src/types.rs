//! Typed id definitions for the cluster protocol.
//!
//! All four kinds are minted by the master; the agent only stores,
//! compares, and echoes them.

use crate::define_id;

define_id!(FrameworkId);
define_id!(TaskId);
define_id!(AgentId);
define_id!(OfferId);
