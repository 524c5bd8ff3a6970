//! Session lifecycle: the state machine, its persisted snapshot, and
//! single-flight token renewal.

pub mod manager;
pub(crate) mod refresh;
pub mod snapshot;

pub use manager::SessionManager;
