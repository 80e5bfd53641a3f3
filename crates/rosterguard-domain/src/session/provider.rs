//! Identity provider abstraction.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{AuthError, DomainResult};
use crate::model::{Session, SessionEvent};

/// External identity provider.
///
/// The provider owns credentials and sessions; this crate only observes the
/// session it reports and reacts to its change notifications.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the session persisted from a previous load, if any.
    async fn get_session(&self) -> DomainResult<Option<Session>>;

    /// Subscribes to session change notifications.
    ///
    /// Providers may deliver an `InitialSession` event to a fresh
    /// subscriber describing the session at subscription time.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Signs in with email and password.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    /// Ends the current session.
    async fn sign_out(&self) -> DomainResult<()>;
}
