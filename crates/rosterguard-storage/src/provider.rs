//! In-memory identity provider.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use rosterguard_domain::model::normalize_email;
use rosterguard_domain::{AuthError, DomainResult, IdentityProvider, Session, SessionEvent};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user_id: String,
}

/// In-memory implementation of [`IdentityProvider`].
///
/// Holds a credential table and at most one live session. Every session
/// change is published on a broadcast channel; fresh subscribers receive an
/// `InitialSession` event describing the session at subscription time.
#[derive(Debug)]
pub struct MemoryIdentityProvider {
    accounts: DashMap<String, Account>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
    next_session: AtomicU64,
    announce_initial: AtomicBool,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: DashMap::new(),
            session: Mutex::new(None),
            events,
            next_session: AtomicU64::new(1),
            announce_initial: AtomicBool::new(true),
        }
    }

    /// Adds an account to the credential table.
    pub fn register(&self, email: &str, password: &str, user_id: &str) {
        self.accounts.insert(
            normalize_email(email),
            Account {
                password: password.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    /// Seeds a session as if it had been persisted by an earlier load.
    pub fn restore(&self, session: Session) {
        *self.session.lock() = Some(session);
    }

    /// Controls whether new subscribers get an `InitialSession` event.
    pub fn set_announce_initial(&self, announce: bool) {
        self.announce_initial.store(announce, Ordering::SeqCst);
    }

    /// Publishes a token refresh for the live session, if any.
    pub fn refresh_token(&self) -> bool {
        let current = self.session.lock().clone();
        match current {
            Some(session) => {
                self.publish(SessionEvent::TokenRefreshed(Some(session)));
                true
            }
            None => false,
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    fn publish(&self, event: SessionEvent) {
        let name = event.name();
        // No receivers is fine: nobody is listening yet.
        if self.events.send(event).is_err() {
            debug!(event = name, "no session subscribers");
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn get_session(&self) -> DomainResult<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        let receiver = self.events.subscribe();
        if self.announce_initial.load(Ordering::SeqCst) {
            let current = self.session.lock().clone();
            self.publish(SessionEvent::InitialSession(current));
        }
        receiver
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let account = self
            .accounts
            .get(&email)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredentials)?;
        if account.password != password {
            return Err(AuthError::InvalidCredentials);
        }

        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session = Session::new(format!("session-{n}"), account.user_id, email);
        *self.session.lock() = Some(session.clone());
        self.publish(SessionEvent::SignedIn(Some(session.clone())));
        Ok(session)
    }

    async fn sign_out(&self) -> DomainResult<()> {
        let previous = self.session.lock().take();
        self.publish(SessionEvent::SignedOut(previous));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_publishes_signed_in() {
        let provider = MemoryIdentityProvider::new();
        provider.register("alice@example.org", "pw", "u-1");
        provider.set_announce_initial(false);
        let mut events = provider.subscribe();

        let session = provider
            .sign_in_with_password("Alice@Example.org", "pw")
            .await
            .unwrap();

        assert_eq!(session.email, "alice@example.org");
        assert_eq!(session.user_id, "u-1");
        match events.recv().await.unwrap() {
            SessionEvent::SignedIn(Some(published)) => assert_eq!(published, session),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(provider.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        provider.register("alice@example.org", "pw", "u-1");

        let err = provider
            .sign_in_with_password("alice@example.org", "nope")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        let err = provider
            .sign_in_with_password("bob@example.org", "pw")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert!(provider.current_session().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_announces_initial_session() {
        let provider = MemoryIdentityProvider::new();
        let restored = Session::new("s-0", "u-1", "alice@example.org");
        provider.restore(restored.clone());

        let mut events = provider.subscribe();

        match events.recv().await.unwrap() {
            SessionEvent::InitialSession(Some(session)) => assert_eq!(session, restored),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sign_out_publishes_previous_session() {
        let provider = MemoryIdentityProvider::new();
        provider.set_announce_initial(false);
        let restored = Session::new("s-0", "u-1", "alice@example.org");
        provider.restore(restored.clone());
        let mut events = provider.subscribe();

        provider.sign_out().await.unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::SignedOut(Some(session)) => assert_eq!(session, restored),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(provider.current_session().is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_requires_session() {
        let provider = MemoryIdentityProvider::new();
        provider.set_announce_initial(false);
        let mut events = provider.subscribe();

        assert!(!provider.refresh_token());

        provider.restore(Session::new("s-0", "u-1", "alice@example.org"));
        assert!(provider.refresh_token());
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::TokenRefreshed(Some(_))
        ));
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let provider = MemoryIdentityProvider::new();
        provider.register("alice@example.org", "pw", "u-1");

        let first = provider.sign_in_with_password("alice@example.org", "pw").await.unwrap();
        let second = provider.sign_in_with_password("alice@example.org", "pw").await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
