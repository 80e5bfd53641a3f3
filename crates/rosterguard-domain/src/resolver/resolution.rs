//! Outcome of a single resolver call.

use tokio::task::JoinHandle;

use crate::model::AuthorizationRecord;

/// How a [`Resolution`] was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// Served from a usable cache entry; no remote call.
    Cached,
    /// Both lookups completed.
    Resolved,
    /// The directory positively reported no member for the email.
    MemberMissing,
    /// A lookup failed or lost its race against the deadline.
    Degraded,
}

impl ResolutionKind {
    /// True when the record reflects a complete answer from the directory
    /// or the cache.
    pub fn is_definitive(self) -> bool {
        !matches!(self, ResolutionKind::Degraded)
    }
}

/// Handle to the continuation of a resolution whose lookup timed out.
pub type LateResolution = JoinHandle<Resolution>;

/// Result of [`PermissionResolver::resolve`](super::PermissionResolver::resolve).
#[derive(Debug)]
pub struct Resolution {
    record: AuthorizationRecord,
    kind: ResolutionKind,
    late: Option<LateResolution>,
}

impl Resolution {
    pub(crate) fn new(record: AuthorizationRecord, kind: ResolutionKind) -> Self {
        Self {
            record,
            kind,
            late: None,
        }
    }

    pub(crate) fn with_late(mut self, late: LateResolution) -> Self {
        self.late = Some(late);
        self
    }

    /// The resolved (or fallback) record.
    pub fn record(&self) -> &AuthorizationRecord {
        &self.record
    }

    /// How the record was reached.
    pub fn kind(&self) -> ResolutionKind {
        self.kind
    }

    /// True when a timed-out lookup is still running and will complete the
    /// resolution later.
    pub fn has_late(&self) -> bool {
        self.late.is_some()
    }

    /// Takes the continuation of a timed-out lookup, if any.
    ///
    /// The continuation yields the definitive record once the original call
    /// returns; it has already written the cache by then.
    pub fn take_late(&mut self) -> Option<LateResolution> {
        self.late.take()
    }

    /// Consumes the resolution, returning its record.
    pub fn into_record(self) -> AuthorizationRecord {
        self.record
    }
}
