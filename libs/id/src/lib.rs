//! Typed identifiers for quarry cluster resources.
//!
//! Every entity the agent deals with is named by the master: the agent
//! receives its own id at registration and framework/task ids inside
//! launch requests. Ids are opaque UTF-8 strings: the agent compares
//! and hashes them but never interprets their content. The `define_id!`
//! macro generates one newtype per resource kind so ids of different
//! kinds cannot be mixed up at compile time.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::{AgentId, FrameworkId, OfferId, TaskId};
