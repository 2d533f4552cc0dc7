//! REST transport for the document-management backend.
//!
//! This module provides the `Transport` capability the gate sends requests
//! through, a reqwest-backed `HttpTransport`, a `ScriptedTransport` for tests,
//! and the `GateError` type shared by the whole crate.
//!
//! Protected endpoints expect `Authorization: Bearer <token>` and answer
//! `401` when the token is rejected.

pub mod client;
pub mod error;
pub mod stub;

pub use client::{ApiRequest, ApiResponse, HttpTransport, RequestBody, Transport, DEFAULT_BASE_URL};
pub use error::GateError;
pub use stub::ScriptedTransport;
