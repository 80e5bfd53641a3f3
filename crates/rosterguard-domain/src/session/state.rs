//! Observable authentication state.
//!
//! [`AuthStateHandle`] wraps a `watch` channel. Every mutation goes through
//! one of its methods so the stamp and principal checks live in one place.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{AuthorizationRecord, Principal, Role};

/// Session state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Unauthenticated,
    AuthenticatedPendingPermissions,
    AuthenticatedResolved,
}

/// Full authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    pub principal: Option<Principal>,
    pub phase: SessionPhase,
    pub record: Option<AuthorizationRecord>,
    /// A permission load the caller is waiting on is in flight.
    pub permissions_loading: bool,
    /// Externally visible loading flag, bounded by the loading gate.
    pub is_loading: bool,
}

impl AuthState {
    /// Current role, `None` when nothing is resolved.
    pub fn role(&self) -> Role {
        self.record.as_ref().map(AuthorizationRecord::role).unwrap_or_default()
    }

    pub fn member_id(&self) -> Option<&str> {
        self.record.as_ref().and_then(AuthorizationRecord::member_id)
    }

    pub fn view(&self) -> AuthView {
        AuthView {
            role: self.role(),
            member_id: self.member_id().map(str::to_string),
            is_loading: self.is_loading,
        }
    }
}

/// What consumers of the authorization core read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AuthView {
    pub role: Role,
    pub member_id: Option<String>,
    pub is_loading: bool,
}

/// Shared handle to the authentication state.
#[derive(Debug, Clone)]
pub struct AuthStateHandle {
    tx: Arc<watch::Sender<AuthState>>,
}

impl Default for AuthStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateHandle {
    /// Creates a handle in the mounting state: no principal, loading.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState {
            is_loading: true,
            ..AuthState::default()
        });
        Self { tx: Arc::new(tx) }
    }

    /// Installs `principal` and moves to the pending phase.
    ///
    /// Returns true when the principal changed. A record that belongs to
    /// another email is dropped along with the old principal.
    pub fn install_principal(&self, principal: Principal) -> bool {
        let mut changed = false;
        self.tx.send_if_modified(|state| {
            changed = state.principal.as_ref() != Some(&principal);
            if state
                .record
                .as_ref()
                .is_some_and(|record| record.email() != principal.email())
            {
                state.record = None;
            }
            let was_pending = state.phase == SessionPhase::AuthenticatedPendingPermissions;
            state.principal = Some(principal);
            state.phase = SessionPhase::AuthenticatedPendingPermissions;
            changed || !was_pending
        });
        changed
    }

    /// Applies `record` if it belongs to the live principal and supersedes
    /// the record in state.
    ///
    /// Subscribers are notified only when the grant actually changes.
    /// Returns true when the record was stored.
    pub fn apply_record(&self, record: AuthorizationRecord) -> bool {
        let mut stored = false;
        self.tx.send_if_modified(|state| {
            let live = state
                .principal
                .as_ref()
                .is_some_and(|principal| principal.email() == record.email());
            if !live {
                debug!(
                    email = record.email(),
                    stamp = %record.stamp(),
                    "ignoring record for a principal that is no longer live"
                );
                return false;
            }

            let grant_changed = match &state.record {
                Some(current) if !record.supersedes(current) => {
                    debug!(
                        email = record.email(),
                        stamp = %record.stamp(),
                        current = %current.stamp(),
                        "ignoring record older than state"
                    );
                    return false;
                }
                Some(current) => {
                    !current.same_grant(&record) || current.is_degraded() != record.is_degraded()
                }
                None => true,
            };

            debug!(
                email = record.email(),
                role = %record.role(),
                stamp = %record.stamp(),
                degraded = record.is_degraded(),
                "permissions applied"
            );
            state.record = Some(record);
            stored = true;
            grant_changed
        });
        stored
    }

    /// Moves the live principal to the resolved phase.
    pub fn mark_resolved(&self, email: &str) {
        self.tx.send_if_modified(|state| {
            let live = state
                .principal
                .as_ref()
                .is_some_and(|principal| principal.email() == email);
            if live && state.phase == SessionPhase::AuthenticatedPendingPermissions {
                state.phase = SessionPhase::AuthenticatedResolved;
                return true;
            }
            false
        });
    }

    pub fn set_permissions_loading(&self, loading: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.permissions_loading != loading;
            state.permissions_loading = loading;
            changed
        });
    }

    pub fn set_loading(&self, loading: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.is_loading != loading;
            state.is_loading = loading;
            changed
        });
    }

    /// Returns to the unauthenticated state and hands back the outgoing
    /// principal.
    pub fn clear_session(&self) -> Option<Principal> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            previous = state.principal.take();
            let changed = previous.is_some()
                || state.record.is_some()
                || state.phase != SessionPhase::Unauthenticated
                || state.is_loading
                || state.permissions_loading;
            *state = AuthState::default();
            changed
        });
        previous
    }

    pub fn principal(&self) -> Option<Principal> {
        self.tx.borrow().principal.clone()
    }

    pub fn principal_email(&self) -> Option<String> {
        self.tx
            .borrow()
            .principal
            .as_ref()
            .map(|principal| principal.email().to_string())
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn view(&self) -> AuthView {
        self.tx.borrow().view()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}
