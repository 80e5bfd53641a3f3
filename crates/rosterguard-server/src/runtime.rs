//! Runtime wiring.
//!
//! [`AuthRuntime`] builds the permission cache over a tab storage medium,
//! starts a [`SessionStore`] against the given collaborators and exposes
//! the operations consumers need.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use rosterguard_domain::cache::register_permission_cache_metrics;
use rosterguard_domain::model::StampSource;
use rosterguard_domain::{
    AuthError, AuthState, AuthView, AuthorizationRecord, Clock, DomainResult, IdentityProvider,
    MemberDirectory, PermissionCache, SessionStore, SignInFlow, SystemClock, TabStorage,
};
use rosterguard_storage::{MemoryIdentityProvider, MemoryMemberDirectory, MokaTabStorage};

use crate::config::ServerConfig;

/// In-memory collaborators built from configuration.
///
/// The tab storage outlives any single runtime, so starting a second
/// runtime over the same collaborators behaves like a page reload.
#[derive(Debug, Clone)]
pub struct MemoryCollaborators {
    pub directory: Arc<MemoryMemberDirectory>,
    pub provider: Arc<MemoryIdentityProvider>,
    pub storage: Arc<MokaTabStorage>,
}

impl MemoryCollaborators {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            directory: MemoryMemberDirectory::new_shared(),
            provider: Arc::new(MemoryIdentityProvider::new()),
            storage: Arc::new(MokaTabStorage::new(config.tab_storage_config())),
        }
    }
}

/// A started authorization core.
pub struct AuthRuntime<D = MemoryMemberDirectory, P = MemoryIdentityProvider> {
    store: Arc<SessionStore<D, P>>,
    sign_in: SignInFlow<D, P>,
}

impl AuthRuntime {
    /// Starts a runtime over in-memory collaborators.
    pub async fn start_in_memory(config: &ServerConfig, collaborators: &MemoryCollaborators) -> Self {
        Self::start(
            config,
            Arc::clone(&collaborators.directory),
            Arc::clone(&collaborators.provider),
            collaborators.storage.clone(),
        )
        .await
    }
}

impl<D, P> AuthRuntime<D, P>
where
    D: MemberDirectory + 'static,
    P: IdentityProvider + 'static,
{
    /// Wires the cache, starts the session store and restores any session
    /// the provider persisted.
    pub async fn start(
        config: &ServerConfig,
        directory: Arc<D>,
        provider: Arc<P>,
        storage: Arc<dyn TabStorage>,
    ) -> Self {
        register_permission_cache_metrics();

        let auth = config.auth_config();
        let stamps = Arc::new(StampSource::new(Arc::new(SystemClock) as Arc<dyn Clock>));
        let cache = Arc::new(PermissionCache::new(storage, stamps, auth.cache.clone()));
        let store = SessionStore::new(provider, directory, cache, &auth);
        store.start().await;

        let view = store.view();
        info!(
            role = %view.role,
            is_loading = view.is_loading,
            lookup_timeout_ms = config.auth.lookup_timeout_ms,
            loading_deadline_ms = config.auth.loading_deadline_ms,
            "authorization runtime started"
        );

        let sign_in = store.sign_in_flow();
        Self { store, sign_in }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthorizationRecord, AuthError> {
        self.sign_in.sign_in(email, password).await
    }

    pub async fn sign_out(&self) -> DomainResult<()> {
        self.store.sign_out().await
    }

    pub async fn refresh_permissions(&self) -> Option<AuthorizationRecord> {
        self.store.refresh_permissions().await
    }

    pub fn view(&self) -> AuthView {
        self.store.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<SessionStore<D, P>> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        self.store.cache()
    }

    /// Test aid: waits for queued events and background loads to finish.
    ///
    /// See [`SessionStore::settle`] for its limits.
    pub async fn settle(&self) {
        self.store.settle().await;
    }

    pub fn shutdown(&self) {
        self.store.shutdown();
        info!("authorization runtime stopped");
    }
}
