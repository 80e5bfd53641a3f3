//! Authorization records and the stamps that order them.
//!
//! Records are only built inside the crate (the constructors are
//! `pub(crate)`), and the resolver is the only production caller, so every
//! role in the system comes out of [`derive_role`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

use super::types::Role;

/// Derives a role from the two directory lookups.
///
/// Precedence: an explicit admin-level record wins outright, whatever the
/// member flag says. Without one, the member's `is_admin` flag grants
/// [`Role::Administrator`]. Otherwise [`Role::None`].
pub fn derive_role(member_is_admin: bool, admin_level: Option<Role>) -> Role {
    match admin_level {
        Some(level) => level,
        None if member_is_admin => Role::Administrator,
        None => Role::None,
    }
}

/// Ordering key attached to every [`AuthorizationRecord`].
///
/// Ordered by `issued_at`, then `seq`. A [`StampSource`] never hands out the
/// same stamp twice and never goes backwards, so within a process a later
/// resolution always carries a larger stamp than an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionStamp {
    issued_at: DateTime<Utc>,
    seq: u64,
}

impl ResolutionStamp {
    /// Wall-clock instant at which the resolution started.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Per-source sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl std::fmt::Display for ResolutionStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.issued_at.timestamp_millis(), self.seq)
    }
}

/// Monotonic generator of [`ResolutionStamp`]s.
///
/// Shared between the resolver (which stamps resolutions when they start)
/// and the cache (which stamps invalidations), so a resolution that started
/// before an invalidation can never repopulate the invalidated entry.
#[derive(Debug)]
pub struct StampSource {
    clock: Arc<dyn Clock>,
    last: Mutex<Option<ResolutionStamp>>,
}

impl StampSource {
    /// Creates a stamp source reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }

    /// Returns the clock backing this source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Issues the next stamp.
    pub fn next(&self) -> ResolutionStamp {
        let now = self.clock.now();
        let mut last = self.last.lock();
        let stamp = match *last {
            // Wall clock may step backwards; never let the stamp follow it.
            Some(prev) => ResolutionStamp {
                issued_at: now.max(prev.issued_at),
                seq: prev.seq + 1,
            },
            None => ResolutionStamp {
                issued_at: now,
                seq: 0,
            },
        };
        *last = Some(stamp);
        stamp
    }
}

/// Result of one permission resolution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    email: String,
    member_id: Option<String>,
    role: Role,
    stamp: ResolutionStamp,
    resolved_at: DateTime<Utc>,
    /// Built from incomplete information (timeout or lookup failure).
    #[serde(default)]
    degraded: bool,
}

impl AuthorizationRecord {
    /// Builds a record from a completed lookup.
    pub(crate) fn resolved(
        email: impl Into<String>,
        member_id: Option<String>,
        role: Role,
        stamp: ResolutionStamp,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.into(),
            member_id,
            role,
            stamp,
            resolved_at,
            degraded: false,
        }
    }

    /// Builds the provisional record used when a lookup could not finish.
    ///
    /// `role` is derived from whatever was known when the lookup gave up;
    /// `Role::None` when the member itself is unknown.
    pub(crate) fn degraded(
        email: impl Into<String>,
        member_id: Option<String>,
        role: Role,
        stamp: ResolutionStamp,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.into(),
            member_id,
            role,
            stamp,
            resolved_at,
            degraded: true,
        }
    }

    /// Normalized email this record was resolved for.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Directory id of the member, if one was found.
    pub fn member_id(&self) -> Option<&str> {
        self.member_id.as_deref()
    }

    /// Resolved role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Ordering stamp of the resolution that produced this record.
    pub fn stamp(&self) -> ResolutionStamp {
        self.stamp
    }

    /// Instant the resolution finished.
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// True when the record was built from incomplete information.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// True when both records grant the same thing, ignoring stamps.
    pub fn same_grant(&self, other: &Self) -> bool {
        self.email == other.email && self.role == other.role && self.member_id == other.member_id
    }

    /// Returns true if `self` should replace `other` in state or cache.
    ///
    /// A definitive record always replaces a degraded one and a degraded
    /// record never replaces a definitive one. Between records of the same
    /// kind the newer stamp wins.
    pub fn supersedes(&self, other: &Self) -> bool {
        match (self.degraded, other.degraded) {
            (false, true) => true,
            (true, false) => false,
            _ => self.stamp > other.stamp,
        }
    }
}
