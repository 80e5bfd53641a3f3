//! rosterguard-server: configuration, logging and runtime wiring
//!
//! This crate assembles the authorization core into a running unit:
//! - Configuration loading (defaults, YAML, environment)
//! - Logging initialisation
//! - The [`AuthRuntime`] that owns a started session store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             rosterguard-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration loading   │
//! │  observability.rs - Logging setup           │
//! │  runtime.rs       - Collaborator wiring     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod runtime;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use observability::{init_logging, LoggingConfig};
pub use runtime::{AuthRuntime, MemoryCollaborators};
