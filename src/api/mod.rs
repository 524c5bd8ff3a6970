//! Authentication API client module.
//!
//! This module provides the `AuthApi` trait covering the four endpoint
//! contracts (login, token renewal, profile, logout) and `HttpAuthApi`,
//! the reqwest-backed implementation.
//!
//! The API uses JWT bearer token authentication; tokens are obtained
//! through the login endpoint and renewed through the refresh endpoint.

pub mod client;

pub use client::{AuthApi, HttpAuthApi, LoginPayload, ProfilePayload, TokenSet};
