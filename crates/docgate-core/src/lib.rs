//! docgate - session and permission gate for the document-management client.
//!
//! `SessionStore` owns the login credential and its 24 hour freshness window.
//! `AccessGate` decides whether a protected action may run, attaches the
//! bearer token to outbound calls, and ends the session when the server
//! rejects it. Both are wired together by `GateContext`.
//!
//! The gate is a convenience for the UI, not a security boundary: the
//! backend enforces authorization on its own.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod gate;
pub mod storage;

pub use api::{ApiRequest, ApiResponse, GateError, HttpTransport, ScriptedTransport, Transport};
pub use auth::{Credential, SessionDescriptor, SessionStore};
pub use config::{Config, StorageBackend};
pub use context::GateContext;
pub use gate::{AccessGate, Feature, Permission, PermissionSet, PermissionSnapshot, PermissionState};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage};
