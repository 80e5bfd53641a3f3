//! Traits for the record store consulted by the resolver.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{AdminLevelRecord, MemberRecord};

/// Read access to the member directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Finds the member registered under `email` (normalized).
    async fn find_member_by_email(&self, email: &str) -> DomainResult<Option<MemberRecord>>;

    /// Finds the explicit admin-level record for a member.
    async fn find_admin_level(&self, member_id: &str) -> DomainResult<Option<AdminLevelRecord>>;
}
