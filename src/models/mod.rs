//! Data models for the session core.
//!
//! This module contains the data structures representing the
//! authenticated identity:
//!
//! - `Session`: the canonical identity record and its state machine states
//! - `Role`: the closed set of user roles
//! - `Account`: role-dependent profile record (tagged union over roles)

pub mod account;
pub mod session;

pub use account::{Account, AdminAccount, ClientAccount, DeveloperAccount, Role};
pub use session::{Session, SessionState, TOKEN_TYPE_BEARER};
