//! Client-side session and credential management core.
//!
//! The crate centers on [`SessionManager`]: login, logout, startup
//! rehydration, and observable session state, backed by a durable
//! [`CredentialStore`] snapshot and a single-flight token renewal
//! coordinator. [`Transport`] layers bearer-token attachment and a bounded
//! 401 retry on top of `reqwest` for application requests.
//!
//! Everything is injected: construct an [`AuthApi`] (usually
//! [`HttpAuthApi`]) and a store, hand them to [`SessionManager::new`], and
//! subscribe to state changes with [`SessionManager::subscribe`].

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod transport;

pub use api::{AuthApi, HttpAuthApi, LoginPayload, ProfilePayload, TokenSet};
pub use config::Config;
pub use error::AuthError;
pub use models::{
    Account, AdminAccount, ClientAccount, DeveloperAccount, Role, Session, SessionState,
};
pub use session::SessionManager;
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use transport::Transport;
