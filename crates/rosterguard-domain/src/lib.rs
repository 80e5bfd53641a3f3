//! rosterguard-domain: Session and permission resolution core
//!
//! This crate turns a signed-in principal into an authorization level
//! (`None` / `ElevatedMember` / `Administrator` / `SuperAdministrator`)
//! with low perceived latency, while staying consistent with the
//! asynchronous session-event stream of an external identity provider.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                rosterguard-domain                 │
//! ├──────────────────────────────────────────────────┤
//! │  model/        - Principal, Role, records, stamps │
//! │  cache/        - TTL permission cache             │
//! │  resolver/     - Two-step remote role lookup      │
//! │  revalidation/ - Stale-while-revalidate loading   │
//! │  session/      - Session actor, sign-in, gate     │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Data flows from the identity provider's event stream into the
//! [`SessionStore`](session::SessionStore), which asks the
//! [`RevalidationCoordinator`](revalidation::RevalidationCoordinator) to
//! resolve permissions. The coordinator answers from the
//! [`PermissionCache`](cache::PermissionCache) when it can and refreshes in
//! the background through the [`PermissionResolver`](resolver::PermissionResolver).

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod resolver;
pub mod revalidation;
pub mod session;

mod tasks;

#[cfg(test)]
pub(crate) mod mocks;

// Re-export commonly used types at the crate root
pub use cache::{CacheEntry, PermissionCache, PermissionCacheConfig, TabStorage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{AuthError, DomainError, DomainResult, StorageError};
pub use model::{
    derive_role, AdminLevelRecord, AuthorizationRecord, MemberRecord, Principal,
    ResolutionRequest, ResolutionStamp, Role, Session, SessionEvent,
};
pub use resolver::{MemberDirectory, PermissionResolver, Resolution, ResolutionKind, ResolverConfig};
pub use revalidation::RevalidationCoordinator;
pub use session::{
    AuthState, AuthStateHandle, AuthView, IdentityProvider, LiveSession, LoadingGate,
    SessionPhase, SessionStore, SignInFlow, SignInToken,
};
