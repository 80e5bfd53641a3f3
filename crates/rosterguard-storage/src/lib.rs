//! rosterguard-storage: in-memory collaborators for the authorization core.
//!
//! This crate provides implementations of the traits the domain crate
//! consumes:
//! - [`MemoryMemberDirectory`]: member and admin-level tables
//! - [`MemoryIdentityProvider`]: credential table and session event stream
//! - [`MokaTabStorage`]: capacity-bounded, idle-expiring key/value medium
//!
//! They back the runtime's default wiring and the integration tests.

pub mod directory;
pub mod provider;
pub mod tab;

pub use directory::MemoryMemberDirectory;
pub use provider::MemoryIdentityProvider;
pub use tab::{MokaTabStorage, TabStorageConfig};
