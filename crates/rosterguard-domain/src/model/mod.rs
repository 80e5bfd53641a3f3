//! Session and authorization data model.
//!
//! This module contains:
//! - Identity types (Principal, Session, SessionEvent)
//! - Roles and the single role-derivation function
//! - Authorization records and their ordering stamps

mod record;
mod types;
#[cfg(test)]
mod record_proptest;

pub use record::{derive_role, AuthorizationRecord, ResolutionStamp, StampSource};
pub use types::*;
