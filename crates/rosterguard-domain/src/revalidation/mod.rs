//! Stale-while-revalidate permission loading.
//!
//! The coordinator answers from the cache whenever it can and refreshes the
//! answer in the background. Every record it produces, foreground or
//! background, reaches the state through [`AuthStateHandle::apply_record`],
//! which orders by stamp instead of completion order.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::PermissionCache;
use crate::model::{AuthorizationRecord, ResolutionRequest};
use crate::resolver::{LateResolution, MemberDirectory, PermissionResolver};
use crate::session::AuthStateHandle;
use crate::tasks::BackgroundTasks;

/// Decrements the in-flight count when a foreground load ends, however it
/// ends.
struct LoadingGuard {
    in_flight: Arc<AtomicUsize>,
    state: AuthStateHandle,
}

impl LoadingGuard {
    fn enter(in_flight: &Arc<AtomicUsize>, state: &AuthStateHandle) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        state.set_permissions_loading(true);
        Self {
            in_flight: Arc::clone(in_flight),
            state: state.clone(),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.set_permissions_loading(false);
        }
    }
}

/// Loads permissions for the live principal.
pub struct RevalidationCoordinator<D> {
    resolver: PermissionResolver<D>,
    state: AuthStateHandle,
    tasks: Arc<BackgroundTasks>,
    in_flight: Arc<AtomicUsize>,
}

impl<D> Clone for RevalidationCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            state: self.state.clone(),
            tasks: Arc::clone(&self.tasks),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<D> RevalidationCoordinator<D>
where
    D: MemberDirectory + 'static,
{
    pub fn new(resolver: PermissionResolver<D>, state: AuthStateHandle) -> Self {
        Self {
            resolver,
            state,
            tasks: Arc::new(BackgroundTasks::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolver(&self) -> &PermissionResolver<D> {
        &self.resolver
    }

    pub fn state(&self) -> &AuthStateHandle {
        &self.state
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        self.resolver.cache()
    }

    pub(crate) fn tasks(&self) -> &Arc<BackgroundTasks> {
        &self.tasks
    }

    /// Loads permissions for `request.email`.
    ///
    /// - explicit sign-in or forced refresh: the cache is bypassed and the
    ///   resolver is awaited.
    /// - cache hit: the cached record is returned at once and a forced
    ///   resolution runs in the background.
    /// - cache miss: the resolver is awaited with `permissions_loading` set.
    pub async fn load(&self, request: ResolutionRequest) -> AuthorizationRecord {
        if !request.bypasses_cache() {
            if let Some(record) = self.load_cached(&request.email) {
                return record;
            }
        }

        let _loading = LoadingGuard::enter(&self.in_flight, &self.state);
        self.resolve_and_apply(&request.email).await
    }

    /// Serves `email` from the cache if the entry is usable for the live
    /// principal, scheduling a background revalidation on a hit.
    pub fn load_cached(&self, email: &str) -> Option<AuthorizationRecord> {
        let principal_email = self.state.principal_email()?;
        let entry = self.cache().get_for(email, &principal_email)?;
        debug!(email = %entry.key, stamp = %entry.record.stamp(), "serving cached permissions");
        self.state.apply_record(entry.record.clone());
        self.spawn_revalidation(entry.key);
        Some(entry.record)
    }

    /// Forces a resolution for `email` without blocking the caller.
    pub fn spawn_revalidation(&self, email: String) {
        metrics::counter!("rosterguard_revalidations_total").increment(1);
        let coordinator = self.clone();
        self.tasks.spawn(async move {
            let record = coordinator.resolve_and_apply(&email).await;
            debug!(
                email = %email,
                role = %record.role(),
                degraded = record.is_degraded(),
                "background revalidation finished"
            );
        });
    }

    /// Waits for every background revalidation and late completion
    /// scheduled so far.
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    /// Aborts outstanding background work.
    pub fn shutdown(&self) {
        self.tasks.abort_all();
    }

    async fn resolve_and_apply(&self, email: &str) -> AuthorizationRecord {
        let mut resolution = self.resolver.resolve(email, true).await;
        if let Some(late) = resolution.take_late() {
            self.track_late(late);
        }
        let record = resolution.into_record();
        self.state.apply_record(record.clone());
        record
    }

    /// Applies a late completion once the underlying lookup returns.
    fn track_late(&self, late: LateResolution) {
        let state = self.state.clone();
        self.tasks.spawn(async move {
            match late.await {
                Ok(resolution) => {
                    let record = resolution.into_record();
                    debug!(
                        email = record.email(),
                        role = %record.role(),
                        stamp = %record.stamp(),
                        "late resolution completed"
                    );
                    state.apply_record(record);
                }
                Err(error) => warn!(%error, "late resolution did not complete"),
            }
        });
    }
}
