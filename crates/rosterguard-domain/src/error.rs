//! Domain error types for session and permission operations.

use thiserror::Error;

/// Errors raised by the external collaborators the core talks to.
///
/// None of these reach the consumers of authorization state: the resolver
/// and cache recover from them locally and degrade to "no privilege".
#[derive(Debug, Error)]
pub enum DomainError {
    /// The member directory could not answer a lookup.
    #[error("directory lookup failed: {message}")]
    LookupFailed { message: String },

    /// A remote call exceeded its deadline.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A spawned lookup task panicked or was aborted.
    #[error("lookup task aborted: {message}")]
    TaskAborted { message: String },

    /// The identity provider failed outside of a credential check.
    #[error("identity provider error: {message}")]
    ProviderError { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors surfaced to the caller of an explicit sign-in.
///
/// Unlike [`DomainError`], these are not recovered locally: the UI needs
/// them to show a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Email/password pair was rejected by the identity provider.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The provider accepted the credentials but returned no session.
    #[error("sign-in completed without a session")]
    MissingSession,

    /// The provider failed for a reason unrelated to the credentials.
    #[error("identity provider error: {message}")]
    Provider { message: String },
}

/// Errors from the per-tab key/value medium backing the permission cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Storage is disabled or otherwise unreachable.
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    /// The medium refused a write because it is full.
    #[error("storage quota exceeded ({bytes} bytes requested)")]
    QuotaExceeded { bytes: usize },

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}
