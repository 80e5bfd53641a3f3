//! Permission resolver: turns an email into an [`AuthorizationRecord`].
//!
//! The resolver performs two dependent directory lookups, member by email
//! and then admin level by member id, each raced against a deadline.
//!
//! # Architecture Decisions
//!
//! - **Single derivation**: every record produced here goes through
//!   [`derive_role`], so the precedence rule cannot drift between the
//!   foreground and background paths.
//!
//! - **Deadlines without cancellation**: each lookup runs in its own task.
//!   When the deadline fires first the resolver returns a degraded,
//!   fail-closed record immediately and hands back a [`LateResolution`]
//!   that finishes the chain once the original call returns. The late
//!   record carries the stamp of the resolution that started it, so the
//!   cache and state apply it under the usual stamp ordering.
//!
//! - **Fail-closed**: lookup failures never raise to the caller. They yield
//!   a degraded record that is never cached. Without a member the role is
//!   [`Role::None`]; once the member is known, a missing admin-level answer
//!   counts as "no record" and the member flag decides.

mod config;
mod resolution;
mod traits;

#[cfg(test)]
mod tests;

pub use config::ResolverConfig;
pub use resolution::{LateResolution, Resolution, ResolutionKind};
pub use traits::MemberDirectory;

use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::PermissionCache;
use crate::error::{DomainError, DomainResult};
use crate::model::{
    derive_role, normalize_email, AdminLevelRecord, AuthorizationRecord, MemberRecord,
    ResolutionStamp, Role,
};

/// Outcome of racing a lookup against its deadline.
enum Raced<T> {
    /// The lookup finished (successfully or not) before the deadline.
    Ready(DomainResult<T>),
    /// The deadline fired; the lookup is still running.
    Late(JoinHandle<DomainResult<T>>),
}

fn joined<T>(result: Result<DomainResult<T>, JoinError>) -> DomainResult<T> {
    result.unwrap_or_else(|error| {
        Err(DomainError::TaskAborted {
            message: error.to_string(),
        })
    })
}

/// Resolves authorization records from the member directory.
///
/// Holds no memory of past calls apart from the cache it writes to.
pub struct PermissionResolver<D> {
    directory: Arc<D>,
    cache: Arc<PermissionCache>,
    config: ResolverConfig,
}

impl<D> Clone for PermissionResolver<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
        }
    }
}

impl<D> std::fmt::Debug for PermissionResolver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("config", &self.config)
            .finish()
    }
}

impl<D> PermissionResolver<D>
where
    D: MemberDirectory + 'static,
{
    /// Creates a resolver with the default configuration.
    pub fn new(directory: Arc<D>, cache: Arc<PermissionCache>) -> Self {
        Self::with_config(directory, cache, ResolverConfig::default())
    }

    /// Creates a resolver with a custom configuration.
    pub fn with_config(
        directory: Arc<D>,
        cache: Arc<PermissionCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            directory,
            cache,
            config,
        }
    }

    /// Returns the resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns the cache this resolver writes to.
    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Resolves the role for `email`. Never fails.
    ///
    /// Unless `force_refresh` is set, a usable cache entry is returned
    /// without any remote call. Definitive results are written to the cache;
    /// a positively missing member drops the cache entry.
    pub async fn resolve(&self, email: &str, force_refresh: bool) -> Resolution {
        let email = normalize_email(email);

        if !force_refresh {
            if let Some(entry) = self.cache.get(&email) {
                return Resolution::new(entry.record, ResolutionKind::Cached);
            }
        }

        let stamp = self.cache.stamps().next();
        debug!(email = %email, %stamp, force_refresh, "resolving permissions");

        let lookup = {
            let directory = Arc::clone(&self.directory);
            let email = email.clone();
            async move { directory.find_member_by_email(&email).await }
        };

        match self.race("member", lookup).await {
            Raced::Ready(member) => self.after_member(email, stamp, member).await,
            Raced::Late(pending) => {
                let placeholder = self.degraded(&email, None, Role::None, stamp);
                let resolver = self.clone();
                let late = tokio::spawn(async move {
                    let member = joined(pending.await);
                    resolver.finish_late(email, stamp, member).await
                });
                Resolution::new(placeholder, ResolutionKind::Degraded).with_late(late)
            }
        }
    }

    async fn after_member(
        &self,
        email: String,
        stamp: ResolutionStamp,
        member: DomainResult<Option<MemberRecord>>,
    ) -> Resolution {
        let member = match self.classify_member(&email, stamp, member) {
            Ok(member) => member,
            Err(done) => return done,
        };

        let lookup = {
            let directory = Arc::clone(&self.directory);
            let member_id = member.id.clone();
            async move { directory.find_admin_level(&member_id).await }
        };

        match self.race("admin_level", lookup).await {
            Raced::Ready(level) => self.conclude(&email, stamp, &member, level),
            Raced::Late(pending) => {
                let placeholder = self.fallback(&email, &member, stamp);
                let resolver = self.clone();
                let late = tokio::spawn(async move {
                    let level = joined(pending.await);
                    resolver.conclude(&email, stamp, &member, level)
                });
                Resolution::new(placeholder, ResolutionKind::Degraded).with_late(late)
            }
        }
    }

    /// Completes a resolution whose member lookup missed its deadline.
    ///
    /// The deadline has already been reported to the caller, so the admin
    /// lookup here waits for as long as it takes.
    async fn finish_late(
        &self,
        email: String,
        stamp: ResolutionStamp,
        member: DomainResult<Option<MemberRecord>>,
    ) -> Resolution {
        let member = match self.classify_member(&email, stamp, member) {
            Ok(member) => member,
            Err(done) => return done,
        };
        let level = self.directory.find_admin_level(&member.id).await;
        debug!(email = %email, %stamp, "late member lookup completed");
        self.conclude(&email, stamp, &member, level)
    }

    /// Splits the member lookup into "continue with this member" or a
    /// finished resolution.
    fn classify_member(
        &self,
        email: &str,
        stamp: ResolutionStamp,
        member: DomainResult<Option<MemberRecord>>,
    ) -> Result<MemberRecord, Resolution> {
        match member {
            Ok(Some(member)) => Ok(member),
            Ok(None) => {
                debug!(email, %stamp, "no member registered for email");
                self.cache.invalidate(email);
                let record = AuthorizationRecord::resolved(email, None, Role::None, stamp, self.now());
                Err(Resolution::new(record, ResolutionKind::MemberMissing))
            }
            Err(error) => {
                warn!(email, %stamp, %error, "member lookup failed, failing closed");
                Err(Resolution::new(
                    self.degraded(email, None, Role::None, stamp),
                    ResolutionKind::Degraded,
                ))
            }
        }
    }

    fn conclude(
        &self,
        email: &str,
        stamp: ResolutionStamp,
        member: &MemberRecord,
        level: DomainResult<Option<AdminLevelRecord>>,
    ) -> Resolution {
        match level {
            Ok(level) => {
                let role = derive_role(member.is_admin, level.map(|record| record.level));
                let record = AuthorizationRecord::resolved(
                    email,
                    Some(member.id.clone()),
                    role,
                    stamp,
                    self.now(),
                );
                self.cache.set(email, &record);
                debug!(email, member_id = %member.id, %role, %stamp, "permissions resolved");
                Resolution::new(record, ResolutionKind::Resolved)
            }
            Err(error) => {
                warn!(
                    email,
                    member_id = %member.id,
                    %stamp,
                    %error,
                    "admin-level lookup failed, falling back to member flag"
                );
                Resolution::new(self.fallback(email, member, stamp), ResolutionKind::Degraded)
            }
        }
    }

    /// Races `future` against the lookup deadline.
    ///
    /// The lookup is spawned so it keeps running when the deadline wins.
    async fn race<T, F>(&self, lookup: &'static str, future: F) -> Raced<T>
    where
        T: Send + 'static,
        F: Future<Output = DomainResult<T>> + Send + 'static,
    {
        let mut handle = tokio::spawn(future);
        match timeout(self.config.lookup_timeout, &mut handle).await {
            Ok(result) => Raced::Ready(joined(result)),
            Err(_) => {
                metrics::counter!("rosterguard_lookup_timeouts_total").increment(1);
                warn!(
                    lookup,
                    timeout_ms = self.config.lookup_timeout.as_millis() as u64,
                    "directory lookup exceeded deadline, continuing in background"
                );
                Raced::Late(handle)
            }
        }
    }

    fn degraded(
        &self,
        email: &str,
        member_id: Option<String>,
        role: Role,
        stamp: ResolutionStamp,
    ) -> AuthorizationRecord {
        AuthorizationRecord::degraded(email, member_id, role, stamp, self.now())
    }

    /// Placeholder for a member whose admin-level lookup gave no answer.
    fn fallback(
        &self,
        email: &str,
        member: &MemberRecord,
        stamp: ResolutionStamp,
    ) -> AuthorizationRecord {
        let role = derive_role(member.is_admin, None);
        self.degraded(email, Some(member.id.clone()), role, stamp)
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.cache.stamps().clock().now()
    }
}
