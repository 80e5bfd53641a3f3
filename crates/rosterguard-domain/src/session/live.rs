//! Tracks which provider session the store currently acts on.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::Session;

/// What to do with a `SignedOut` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutDisposition {
    /// The event ends the live session (or there is none to protect).
    Apply,
    /// The event echoes a sign-out that was already applied locally.
    Echo,
    /// The event names a session that is no longer live.
    Stale,
}

#[derive(Debug, Default)]
struct LiveInner {
    current: Option<String>,
    /// Set by a local sign-out until the provider's echo arrives. The inner
    /// option is the session id that was live at the time.
    awaiting_echo: Option<Option<String>>,
}

/// Shared between [`SessionStore`](super::SessionStore) and
/// [`SignInFlow`](super::SignInFlow).
#[derive(Debug, Clone, Default)]
pub struct LiveSession {
    inner: Arc<Mutex<LiveInner>>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, session_id: &str) {
        self.inner.lock().current = Some(session_id.to_string());
    }

    pub fn current(&self) -> Option<String> {
        self.inner.lock().current.clone()
    }

    /// Drops the live session after a provider-driven sign-out.
    pub fn clear(&self) {
        self.inner.lock().current = None;
    }

    /// Drops the live session after a local sign-out and expects the
    /// provider to echo it.
    pub fn retire(&self) {
        let mut inner = self.inner.lock();
        let retired = inner.current.take();
        inner.awaiting_echo = Some(retired);
    }

    /// Forgets a pending echo, for a provider sign-out that failed.
    pub fn cancel_echo(&self) {
        self.inner.lock().awaiting_echo = None;
    }

    /// Classifies a `SignedOut` event. An echo is consumed by this call.
    pub fn classify_sign_out(&self, outgoing: Option<&Session>) -> SignOutDisposition {
        let mut inner = self.inner.lock();
        let outgoing_id = outgoing.map(|session| session.id.clone());

        if inner.awaiting_echo.as_ref() == Some(&outgoing_id) {
            inner.awaiting_echo = None;
            return SignOutDisposition::Echo;
        }

        match (&inner.current, outgoing_id) {
            (Some(current), Some(outgoing)) if *current != outgoing => SignOutDisposition::Stale,
            _ => SignOutDisposition::Apply,
        }
    }
}
