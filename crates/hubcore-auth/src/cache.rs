use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::capability::Capability;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Per-`(principal, repository)` capability cache with a fixed TTL.
///
/// Access control changes (removing a collaborator, demoting a team) take
/// up to the TTL to propagate to an in-flight session, which is the usual
/// trade-off a hosting service makes to avoid a database round trip on
/// every git operation and API call.
pub struct CapabilityCache {
    entries: DashMap<(Uuid, Uuid), (Capability, Instant)>,
    ttl: Duration,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CapabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, principal_id: Uuid, repository_id: Uuid) -> Option<Capability> {
        let key = (principal_id, repository_id);
        let entry = self.entries.get(&key)?;
        let (capability, inserted_at) = *entry;
        if inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(capability)
    }

    pub fn insert(&self, principal_id: Uuid, repository_id: Uuid, capability: Capability) {
        self.entries
            .insert((principal_id, repository_id), (capability, Instant::now()));
    }

    /// Invalidate every cached capability for a principal across all
    /// repositories — used when a principal's org/team memberships change.
    pub fn invalidate_principal(&self, principal_id: Uuid) {
        self.entries.retain(|(p, _), _| *p != principal_id);
    }

    /// Invalidate every cached capability for a repository — used when a
    /// collaborator grant or visibility changes.
    pub fn invalidate_repository(&self, repository_id: Uuid) {
        self.entries.retain(|(_, r), _| *r != repository_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_and_expires() {
        let cache = CapabilityCache::new(Duration::from_millis(10));
        let p = Uuid::new_v4();
        let r = Uuid::new_v4();
        cache.insert(p, r, Capability::Write);
        assert_eq!(cache.get(p, r), Some(Capability::Write));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(p, r), None);
    }

    #[test]
    fn invalidate_principal_clears_all_repos() {
        let cache = CapabilityCache::default();
        let p = Uuid::new_v4();
        cache.insert(p, Uuid::new_v4(), Capability::Read);
        cache.insert(p, Uuid::new_v4(), Capability::Admin);
        cache.invalidate_principal(p);
        assert_eq!(cache.entries.len(), 0);
    }
}
