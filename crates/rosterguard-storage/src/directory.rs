//! In-memory member directory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use rosterguard_domain::model::normalize_email;
use rosterguard_domain::{AdminLevelRecord, DomainResult, MemberDirectory, MemberRecord, Role};

/// In-memory implementation of [`MemberDirectory`].
///
/// Members are keyed by normalized email, admin levels by member id.
#[derive(Debug, Default)]
pub struct MemoryMemberDirectory {
    members: DashMap<String, MemberRecord>,
    admin_levels: DashMap<String, AdminLevelRecord>,
    lookups: AtomicU64,
}

impl MemoryMemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers (or replaces) a member.
    pub fn upsert_member(&self, email: &str, member_id: &str, is_admin: bool) {
        self.members
            .insert(normalize_email(email), MemberRecord::new(member_id, is_admin));
    }

    /// Removes a member, returning its record.
    pub fn remove_member(&self, email: &str) -> Option<MemberRecord> {
        self.members
            .remove(&normalize_email(email))
            .map(|(_, record)| record)
    }

    pub fn set_admin_level(&self, member_id: &str, level: Role) {
        self.admin_levels
            .insert(member_id.to_string(), AdminLevelRecord::new(level));
    }

    pub fn clear_admin_level(&self, member_id: &str) {
        self.admin_levels.remove(member_id);
    }

    /// Total lookups served, both kinds.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MemberDirectory for MemoryMemberDirectory {
    #[instrument(skip(self))]
    async fn find_member_by_email(&self, email: &str) -> DomainResult<Option<MemberRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .members
            .get(&normalize_email(email))
            .map(|entry| entry.value().clone()))
    }

    #[instrument(skip(self))]
    async fn find_admin_level(&self, member_id: &str) -> DomainResult<Option<AdminLevelRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.admin_levels.get(member_id).map(|entry| *entry.value()))
    }
}
