//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: token-based session with a fixed freshness window
//! - `Credential` / `SessionDescriptor`: what a session persists
//!
//! Sessions are persisted through a `SessionStorage` backend and expire
//! 24 hours after login.

pub mod session;

pub use session::{
    Credential, SessionDescriptor, SessionStore, SESSION_TTL_HOURS, TOKEN_KEY, USER_DATA_KEY,
};
