//! Permission gate for protected actions.
//!
//! `AccessGate` holds the permission snapshot of the live session, answers
//! "is this allowed" and wraps outbound calls so that a rejected credential
//! ends the session. Permission data never outlives the session it was
//! loaded for.

pub mod access;
pub mod permissions;

pub use access::AccessGate;
pub use permissions::{Feature, Permission, PermissionSet, PermissionSnapshot, PermissionState};
