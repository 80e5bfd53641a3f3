//! Explicit sign-in and its coordination with the session event stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{IdentityProvider, LiveSession};
use crate::error::AuthError;
use crate::model::{normalize_email, AuthorizationRecord, ResolutionRequest, Session};
use crate::resolver::MemberDirectory;
use crate::revalidation::RevalidationCoordinator;

#[derive(Debug, Default)]
struct TokenInner {
    /// Normalized emails with an explicit sign-in in flight.
    pending: Mutex<Vec<String>>,
    claimed: Mutex<Option<String>>,
}

/// Shared marker telling the session store that a `SignedIn` event is
/// already being handled by [`SignInFlow`].
#[derive(Debug, Clone, Default)]
pub struct SignInToken {
    inner: Arc<TokenInner>,
}

impl SignInToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a sign-in for `email` as in progress until the guard drops.
    pub fn begin(&self, email: &str) -> SignInGuard {
        let email = normalize_email(email);
        self.inner.pending.lock().push(email.clone());
        SignInGuard {
            token: self.clone(),
            email,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        !self.inner.pending.lock().is_empty()
    }

    /// Records `session_id` as handled by the explicit flow.
    pub fn claim(&self, session_id: &str) {
        *self.inner.claimed.lock() = Some(session_id.to_string());
    }

    pub fn clear_claim(&self) {
        self.inner.claimed.lock().take();
    }

    /// True when a `SignedIn` for `session` must not trigger a load.
    ///
    /// Only sign-ins for an email currently being signed in explicitly, or
    /// for the session the flow already claimed, are skipped.
    pub fn should_skip(&self, session: &Session) -> bool {
        if self.inner.claimed.lock().as_deref() == Some(session.id.as_str()) {
            return true;
        }
        let email = normalize_email(&session.email);
        self.inner.pending.lock().iter().any(|pending| *pending == email)
    }
}

/// Clears the in-progress mark on drop.
#[derive(Debug)]
pub struct SignInGuard {
    token: SignInToken,
    email: String,
}

impl Drop for SignInGuard {
    fn drop(&mut self) {
        let mut pending = self.token.inner.pending.lock();
        if let Some(index) = pending.iter().position(|email| *email == self.email) {
            pending.swap_remove(index);
        }
    }
}

/// User-triggered sign-in.
pub struct SignInFlow<D, P> {
    provider: Arc<P>,
    coordinator: RevalidationCoordinator<D>,
    token: SignInToken,
    live: LiveSession,
}

impl<D, P> Clone for SignInFlow<D, P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            coordinator: self.coordinator.clone(),
            token: self.token.clone(),
            live: self.live.clone(),
        }
    }
}

impl<D, P> SignInFlow<D, P>
where
    D: MemberDirectory + 'static,
    P: IdentityProvider + 'static,
{
    pub fn new(
        provider: Arc<P>,
        coordinator: RevalidationCoordinator<D>,
        token: SignInToken,
        live: LiveSession,
    ) -> Self {
        Self {
            provider,
            coordinator,
            token,
            live,
        }
    }

    /// Signs in and resolves permissions before returning.
    ///
    /// The resolution always bypasses the cache. Credential failures are
    /// returned; permission lookup failures degrade to `Role::None`.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthorizationRecord, AuthError> {
        let email = normalize_email(email);
        let _guard = self.token.begin(&email);

        let session = match self.provider.sign_in_with_password(&email, password).await {
            Ok(session) => session,
            Err(error) => {
                warn!(email = %email, %error, "sign-in rejected");
                return Err(error);
            }
        };
        self.token.claim(&session.id);
        self.live.install(&session.id);
        info!(email = %email, session_id = %session.id, "signed in");

        let principal = session.principal();
        let state = self.coordinator.state();
        state.install_principal(principal.clone());
        let record = self
            .coordinator
            .load(ResolutionRequest::explicit_sign_in(principal.email()))
            .await;
        state.mark_resolved(principal.email());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, email: &str) -> Session {
        Session::new(id, "u-1", email)
    }

    #[test]
    fn test_guard_clears_in_progress() {
        let token = SignInToken::new();
        {
            let _guard = token.begin("alice@example.org");
            assert!(token.is_in_progress());
            assert!(token.should_skip(&session("any", "alice@example.org")));
        }
        assert!(!token.is_in_progress());
        assert!(!token.should_skip(&session("any", "alice@example.org")));
    }

    #[test]
    fn test_in_progress_skip_matches_email() {
        let token = SignInToken::new();
        let _guard = token.begin(" Alice@Example.org ");

        assert!(token.should_skip(&session("session-1", "alice@example.org")));
        assert!(!token.should_skip(&session("session-2", "bob@example.org")));
    }

    #[test]
    fn test_overlapping_guards_for_same_email() {
        let token = SignInToken::new();
        let first = token.begin("alice@example.org");
        let second = token.begin("alice@example.org");
        drop(first);
        assert!(token.should_skip(&session("any", "alice@example.org")));
        drop(second);
        assert!(!token.is_in_progress());
    }

    #[test]
    fn test_claimed_session_is_skipped() {
        let token = SignInToken::new();
        token.claim("session-1");

        assert!(token.should_skip(&session("session-1", "alice@example.org")));
        assert!(!token.should_skip(&session("session-2", "alice@example.org")));

        token.clear_claim();
        assert!(!token.should_skip(&session("session-1", "alice@example.org")));
    }

    #[test]
    fn test_tokens_are_independent() {
        let a = SignInToken::new();
        let b = SignInToken::new();
        let _guard = a.begin("alice@example.org");
        assert!(!b.is_in_progress());
    }
}
