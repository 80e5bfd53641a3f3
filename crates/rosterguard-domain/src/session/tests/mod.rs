//! Tests for the session layer.
//!
//! Organized by functionality:
//! - Mount and loading scenarios (store_tests)
//! - Explicit sign-in and its race with the event stream (sign_in_tests)


use std::sync::Arc;

use crate::cache::PermissionCache;
use crate::clock::{Clock, ManualClock};
use crate::config::AuthConfig;
use crate::mocks::{cache_fixture, MockDirectory, MockProvider, MockTabStorage};
use crate::model::{AuthorizationRecord, Role, Session};
use crate::session::SessionStore;

pub(super) const ALICE: &str = "alice@example.org";
pub(super) const BOB: &str = "bob@example.org";
pub(super) const PASSWORD: &str = "correct horse";

pub(super) struct Harness {
    pub directory: Arc<MockDirectory>,
    pub provider: Arc<MockProvider>,
    pub storage: Arc<MockTabStorage>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<PermissionCache>,
    pub store: Arc<SessionStore<MockDirectory, MockProvider>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(AuthConfig::default()).await
    }

    pub async fn with_config(config: AuthConfig) -> Self {
        let directory = Arc::new(MockDirectory::new());
        directory.add_member(ALICE, "m-alice", false).await;
        directory.add_member(BOB, "m-bob", false).await;

        let provider = Arc::new(MockProvider::new());
        provider.add_user(ALICE, PASSWORD, "u-alice");
        provider.add_user(BOB, PASSWORD, "u-bob");

        let (storage, clock, cache) = cache_fixture();
        let store = SessionStore::new(provider.clone(), directory.clone(), cache.clone(), &config);

        Self {
            directory,
            provider,
            storage,
            clock,
            cache,
            store,
        }
    }

    /// Writes a definitive record straight into the cache.
    pub fn warm_cache(&self, email: &str, member_id: &str, role: Role) -> AuthorizationRecord {
        let record = AuthorizationRecord::resolved(
            email,
            Some(member_id.to_string()),
            role,
            self.cache.stamps().next(),
            self.clock.now(),
        );
        assert!(self.cache.set(email, &record));
        record
    }
}

pub(super) fn alice_session(id: &str) -> Session {
    Session::new(id, "u-alice", ALICE)
}

pub(super) fn bob_session(id: &str) -> Session {
    Session::new(id, "u-bob", BOB)
}
