//! Session Registry and the process-level Supervisor (spec §4.2, §4.9).

mod registry;
mod supervisor;

pub use registry::{ConnectionId, SessionRegistry, TeardownHook};
pub use supervisor::Supervisor;
