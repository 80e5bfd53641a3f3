//! Session store: single owner of the principal.
//!
//! The store runs as an actor. One task consumes the provider's event
//! stream in order and decides, per event, whether to install a principal,
//! load permissions, or sign out. Permission loads themselves run on
//! separate tasks so a slow directory never stalls event handling.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AuthState, AuthStateHandle, AuthView, IdentityProvider, LiveSession, LoadingGate, SignInFlow,
    SignInToken, SignOutDisposition,
};
use crate::cache::PermissionCache;
use crate::config::AuthConfig;
use crate::error::DomainResult;
use crate::model::{AuthorizationRecord, ResolutionRequest, Session, SessionEvent};
use crate::resolver::{MemberDirectory, PermissionResolver};
use crate::revalidation::RevalidationCoordinator;

/// Owns the current principal and reacts to session changes.
pub struct SessionStore<D, P> {
    provider: Arc<P>,
    coordinator: RevalidationCoordinator<D>,
    gate: LoadingGate,
    token: SignInToken,
    live: LiveSession,
    /// Session id handled during mount, used to drop the matching
    /// `InitialSession` event.
    mounted_session: Mutex<Option<String>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D, P> SessionStore<D, P>
where
    D: MemberDirectory + 'static,
    P: IdentityProvider + 'static,
{
    /// Wires a store over the given collaborators. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        provider: Arc<P>,
        directory: Arc<D>,
        cache: Arc<PermissionCache>,
        config: &AuthConfig,
    ) -> Arc<Self> {
        let resolver = PermissionResolver::with_config(directory, cache, config.resolver.clone());
        let state = AuthStateHandle::new();
        let gate = LoadingGate::new(state.clone(), config.loading_deadline);
        Arc::new(Self {
            provider,
            coordinator: RevalidationCoordinator::new(resolver, state),
            gate,
            token: SignInToken::new(),
            live: LiveSession::new(),
            mounted_session: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Subscribes to the provider, restores any persisted session and
    /// spawns the event loop.
    ///
    /// Subscribing happens first so no event emitted during mount is lost.
    pub async fn start(self: &Arc<Self>) {
        let events = self.provider.subscribe();
        self.mount().await;

        let store = Arc::clone(self);
        let handle = tokio::spawn(async move { store.run(events).await });
        if let Some(previous) = self.worker.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn mount(&self) {
        let session = match self.provider.get_session().await {
            Ok(session) => session,
            Err(error) => {
                warn!(%error, "could not restore session, starting signed out");
                None
            }
        };

        let Some(session) = session else {
            debug!("no session to restore");
            self.gate.open();
            return;
        };

        *self.mounted_session.lock() = Some(session.id.clone());
        debug!(session_id = %session.id, "restoring session");
        self.begin_load(&session);
    }

    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session events dropped, resynchronizing with provider");
                    self.resync().await;
                }
                Err(RecvError::Closed) => {
                    debug!("session event stream closed");
                    break;
                }
            }
        }
    }

    fn handle_event(&self, event: SessionEvent) {
        debug!(event = event.name(), "session event");
        match &event {
            SessionEvent::SignedOut(session) => {
                match self.live.classify_sign_out(session.as_ref()) {
                    SignOutDisposition::Apply => {
                        self.live.clear();
                        self.apply_sign_out(session.as_ref());
                    }
                    SignOutDisposition::Echo => {
                        debug!("sign-out already applied locally");
                    }
                    SignOutDisposition::Stale => {
                        debug!("sign-out for a session that is no longer live, ignored");
                    }
                }
            }
            SessionEvent::InitialSession(Some(session)) if self.is_mounted(session) => {
                debug!(session_id = %session.id, "initial session already handled at mount");
            }
            SessionEvent::SignedIn(Some(session)) if self.token.should_skip(session) => {
                debug!(session_id = %session.id, "sign-in handled by the explicit flow");
            }
            _ => match event.session() {
                Some(session) => self.begin_load(session),
                None => debug!(event = event.name(), "event carries no session, ignored"),
            },
        }
    }

    /// Installs the session's principal and loads its permissions.
    ///
    /// A usable cache entry resolves the principal synchronously. Otherwise
    /// the load runs in the background; the loading gate is raised only when
    /// the principal changed.
    fn begin_load(&self, session: &Session) {
        let principal = session.principal();
        let email = principal.email().to_string();
        let state = self.coordinator.state();
        self.live.install(&session.id);
        let changed = state.install_principal(principal);

        if self.coordinator.load_cached(&email).is_some() {
            state.mark_resolved(&email);
            if changed || state.is_loading() {
                self.gate.open();
            }
            return;
        }

        let epoch = (changed || state.is_loading()).then(|| self.gate.begin());
        let coordinator = self.coordinator.clone();
        let gate = self.gate.clone();
        self.coordinator.tasks().spawn(async move {
            let record = coordinator.load(ResolutionRequest::restore(&email)).await;
            coordinator.state().mark_resolved(&email);
            if let Some(epoch) = epoch {
                gate.release(epoch);
            }
            debug!(email = %email, role = %record.role(), "session permissions loaded");
        });
    }

    fn apply_sign_out(&self, outgoing: Option<&Session>) {
        let previous = self.coordinator.state().clear_session();
        self.mounted_session.lock().take();
        self.token.clear_claim();
        self.gate.open();

        let cache = self.coordinator.cache();
        let email = previous
            .as_ref()
            .map(|principal| principal.email().to_string())
            .or_else(|| outgoing.map(|session| session.principal().email().to_string()));
        match email {
            Some(email) => {
                cache.invalidate(&email);
                if previous.is_some() {
                    info!(email = %email, "signed out");
                }
            }
            None => {
                debug!("sign-out without a known principal, clearing permission cache");
                cache.invalidate_all();
            }
        }
    }

    async fn resync(&self) {
        match self.provider.get_session().await {
            Ok(Some(session)) => self.begin_load(&session),
            Ok(None) => {
                if self.coordinator.state().principal().is_some() {
                    self.live.clear();
                    self.apply_sign_out(None);
                }
            }
            Err(error) => warn!(%error, "resynchronization failed, keeping current session"),
        }
    }

    fn is_mounted(&self, session: &Session) -> bool {
        self.mounted_session.lock().as_deref() == Some(session.id.as_str())
    }

    /// Returns a sign-in flow that shares this store's state and token.
    pub fn sign_in_flow(&self) -> SignInFlow<D, P> {
        SignInFlow::new(
            Arc::clone(&self.provider),
            self.coordinator.clone(),
            self.token.clone(),
            self.live.clone(),
        )
    }

    /// Signs out through the provider and applies the transition locally.
    ///
    /// The local transition happens even if the provider call fails. The
    /// provider's `SignedOut` echo is then recognized and dropped, so it
    /// cannot clear a principal signed in right after.
    pub async fn sign_out(&self) -> DomainResult<()> {
        self.live.retire();
        let result = self.provider.sign_out().await;
        if let Err(error) = &result {
            warn!(%error, "provider sign-out failed, clearing local session anyway");
            self.live.cancel_echo();
        }
        self.apply_sign_out(None);
        result
    }

    /// Forces a fresh resolution for the live principal.
    pub async fn refresh_permissions(&self) -> Option<AuthorizationRecord> {
        let email = self.coordinator.state().principal_email()?;
        let record = self
            .coordinator
            .load(ResolutionRequest::forced(&email))
            .await;
        Some(record)
    }

    pub fn view(&self) -> AuthView {
        self.coordinator.state().view()
    }

    pub fn snapshot(&self) -> AuthState {
        self.coordinator.state().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.coordinator.state().subscribe()
    }

    pub fn state(&self) -> &AuthStateHandle {
        self.coordinator.state()
    }

    pub fn token(&self) -> &SignInToken {
        &self.token
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        self.coordinator.cache()
    }

    /// Test aid: lets the event loop drain and waits for the loads it
    /// started.
    ///
    /// Draining is approximate. The store yields a fixed number of times
    /// for the event task to catch up, which is enough on a single-threaded
    /// test runtime but carries no ordering guarantee for events published
    /// concurrently from other threads. Application code should observe
    /// [`subscribe`](Self::subscribe) instead.
    pub async fn settle(&self) {
        for _ in 0..2 {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
            self.coordinator.settle().await;
        }
    }

    /// Stops the event loop and aborts background work.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        self.coordinator.shutdown();
    }
}
