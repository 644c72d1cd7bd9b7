//! Read-through cache in front of an [`RbacStore`].
//!
//! Roles, grants and role assignments are cached per key. The provisioning
//! layer must call [`CacheInvalidator::invalidate`] as part of every
//! mutation; eviction is synchronous, so the next check after `invalidate`
//! returns reads the store again. Entries additionally expire after `ttl`.
//!
//! Errors are never cached. Resource parents are not cached: they are
//! immutable once a resource exists and are usually supplied by the caller.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::models::{GrantId, PermissionGrant, Role, RoleName, UserName};
use super::resource::ResourceUid;
use super::store::RbacStore;
use super::types::ResourceType;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::telemetry::CacheMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Invalidation Events
// ═══════════════════════════════════════════════════════════════════════════════

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum InvalidationEvent {
    /// A role was created, updated or deleted (including its grant list)
    Role(RoleName),
    /// A grant was deleted
    Grant(GrantId),
    /// A user's role assignments changed
    Assignments(UserName),
    /// Drop everything
    All,
}

impl InvalidationEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Role(_) => "role",
            Self::Grant(_) => "grant",
            Self::Assignments(_) => "assignments",
            Self::All => "all",
        }
    }
}

/// Something holding cached RBAC state.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, event: &InvalidationEvent);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Table state observed before reading the backing store.
///
/// A value read from the store is only served while the token it was read
/// under is still current, so an invalidation racing a read-through can
/// never leave the old value behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadToken {
    epoch: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    token: ReadToken,
}

/// One keyed table with TTL expiry and a soft size bound.
#[derive(Debug)]
struct CacheTable<K: Eq + Hash, V> {
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    /// Per-key invalidation counters; absent means zero.
    generations: DashMap<K, u64>,
    /// Bumped when the whole table is dropped.
    epoch: AtomicU64,
}

impl<K, V> CacheTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Take before reading the backing store.
    fn token(&self, key: &K) -> ReadToken {
        ReadToken {
            epoch: self.epoch.load(Ordering::SeqCst),
            generation: self.generation(key),
        }
    }

    fn generation(&self, key: &K) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    fn is_current(&self, key: &K, token: ReadToken) -> bool {
        token == self.token(key)
    }

    fn get(&self, key: &K, ttl: Duration) -> Option<V> {
        let cached = self.entries.get(key).map(|entry| {
            (entry.token, entry.inserted_at.elapsed() < ttl, entry.value.clone())
        });

        match cached {
            Some((token, true, value)) if self.is_current(key, token) => {
                CacheMetrics::hit(self.name);
                Some(value)
            }
            _ => {
                CacheMetrics::miss(self.name);
                // Expired or superseded entries are dropped lazily
                let current = self.token(key);
                self.entries.remove_if(key, |_, entry| {
                    entry.inserted_at.elapsed() >= ttl || entry.token != current
                });
                None
            }
        }
    }

    fn insert(&self, key: K, value: V, token: ReadToken, ttl: Duration, max_entries: usize) {
        if !self.is_current(&key, token) {
            trace!(table = self.name, "Invalidated during read, not caching");
            return;
        }
        if self.entries.len() >= max_entries {
            self.entries
                .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            if self.entries.len() >= max_entries {
                trace!(table = self.name, "Cache table full, not caching");
                return;
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                token,
            },
        );
    }

    fn remove(&self, key: &K) {
        *self.generations.entry(key.clone()).or_insert(0) += 1;
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        // Tokens issued before the epoch bump are already stale.
        self.generations.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Caching Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub roles: usize,
    pub grants: usize,
    pub assignments: usize,
}

/// An [`RbacStore`] that serves roles, grants and assignments from memory.
#[derive(Debug)]
pub struct CachingRbacStore<S> {
    inner: S,
    roles: CacheTable<RoleName, Role>,
    grants: CacheTable<GrantId, PermissionGrant>,
    assignments: CacheTable<UserName, BTreeSet<RoleName>>,
    ttl: Duration,
    max_entries: usize,
}

impl<S: RbacStore> CachingRbacStore<S> {
    pub fn new(inner: S, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            roles: CacheTable::new("role"),
            grants: CacheTable::new("grant"),
            assignments: CacheTable::new("assignments"),
            ttl,
            max_entries,
        }
    }

    pub fn from_config(inner: S, config: &CacheConfig) -> Self {
        Self::new(inner, config.ttl, config.max_entries)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            roles: self.roles.len(),
            grants: self.grants.len(),
            assignments: self.assignments.len(),
        }
    }
}

impl<S: RbacStore> RbacStore for CachingRbacStore<S> {
    fn lookup_role_assignments(&self, user: &UserName) -> Result<BTreeSet<RoleName>> {
        if let Some(roles) = self.assignments.get(user, self.ttl) {
            return Ok(roles);
        }
        let token = self.assignments.token(user);
        let roles = self.inner.lookup_role_assignments(user)?;
        self.assignments
            .insert(user.clone(), roles.clone(), token, self.ttl, self.max_entries);
        Ok(roles)
    }

    fn lookup_role(&self, name: &RoleName) -> Result<Role> {
        if let Some(role) = self.roles.get(name, self.ttl) {
            return Ok(role);
        }
        let token = self.roles.token(name);
        let role = self.inner.lookup_role(name)?;
        self.roles
            .insert(name.clone(), role.clone(), token, self.ttl, self.max_entries);
        Ok(role)
    }

    fn lookup_grant(&self, id: &GrantId) -> Result<PermissionGrant> {
        if let Some(grant) = self.grants.get(id, self.ttl) {
            return Ok(grant);
        }
        let token = self.grants.token(id);
        let grant = self.inner.lookup_grant(id)?;
        self.grants
            .insert(id.clone(), grant.clone(), token, self.ttl, self.max_entries);
        Ok(grant)
    }

    fn lookup_resource_parent(
        &self,
        resource_type: ResourceType,
        uid: &ResourceUid,
    ) -> Result<Option<ResourceUid>> {
        self.inner.lookup_resource_parent(resource_type, uid)
    }
}

impl<S: RbacStore> CacheInvalidator for CachingRbacStore<S> {
    fn invalidate(&self, event: &InvalidationEvent) {
        match event {
            InvalidationEvent::Role(name) => self.roles.remove(name),
            InvalidationEvent::Grant(id) => self.grants.remove(id),
            InvalidationEvent::Assignments(user) => self.assignments.remove(user),
            InvalidationEvent::All => {
                self.roles.clear();
                self.grants.clear();
                self.assignments.clear();
            }
        }
        CacheMetrics::invalidation(event.event_type());
        debug!(event = ?event, "RBAC cache invalidated");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rbac::models::UserRoleAssignment;
    use crate::rbac::store::InMemoryRbacStore;
    use crate::rbac::types::PermissionType;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn setup() -> (InMemoryRbacStore, CachingRbacStore<InMemoryRbacStore>) {
        let backing = InMemoryRbacStore::new();
        let cached = CachingRbacStore::new(backing.clone(), Duration::from_secs(60), 100);
        (backing, cached)
    }

    #[test]
    fn test_reads_are_served_from_cache() {
        let (backing, cached) = setup();
        backing.assign_role(UserRoleAssignment::new("u1", "r1"));

        let user = UserName::new("u1");
        assert_eq!(cached.lookup_role_assignments(&user).unwrap().len(), 1);
        assert_eq!(cached.stats().assignments, 1);

        // Mutation without invalidation is not visible yet.
        backing.assign_role(UserRoleAssignment::new("u1", "r2"));
        assert_eq!(cached.lookup_role_assignments(&user).unwrap().len(), 1);

        cached.invalidate(&InvalidationEvent::Assignments(user.clone()));
        assert_eq!(cached.lookup_role_assignments(&user).unwrap().len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let (backing, cached) = setup();
        let name = RoleName::new("late");

        let err = cached.lookup_role(&name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        backing.add_role(Role::new("late", Vec::<GrantId>::new()));
        assert!(cached.lookup_role(&name).is_ok());

        backing.set_unavailable(true);
        let user = UserName::new("u1");
        assert!(cached.lookup_role_assignments(&user).is_err());
        backing.set_unavailable(false);
        assert!(cached.lookup_role_assignments(&user).is_ok());
    }

    #[test]
    fn test_grant_invalidation() {
        let (backing, cached) = setup();
        let grant = PermissionGrant::new(
            ResourceUid::pack("p1").unwrap(),
            ResourceType::Pack,
            [PermissionType::PACK_VIEW],
        )
        .unwrap();
        let id = backing.add_grant(grant).unwrap();

        assert!(cached.lookup_grant(&id).is_ok());
        backing.remove_grant(&id);
        assert!(cached.lookup_grant(&id).is_ok());

        cached.invalidate(&InvalidationEvent::Grant(id.clone()));
        assert!(cached.lookup_grant(&id).is_err());
    }

    /// Pauses the first role lookup after it has read the backing store.
    struct PausingStore {
        inner: InMemoryRbacStore,
        armed: AtomicBool,
        read_done: Arc<Barrier>,
        resume: Arc<Barrier>,
    }

    impl RbacStore for PausingStore {
        fn lookup_role_assignments(&self, user: &UserName) -> Result<BTreeSet<RoleName>> {
            self.inner.lookup_role_assignments(user)
        }

        fn lookup_role(&self, name: &RoleName) -> Result<Role> {
            let role = self.inner.lookup_role(name);
            if self.armed.swap(false, Ordering::SeqCst) {
                self.read_done.wait();
                self.resume.wait();
            }
            role
        }

        fn lookup_grant(&self, id: &GrantId) -> Result<PermissionGrant> {
            self.inner.lookup_grant(id)
        }

        fn lookup_resource_parent(
            &self,
            resource_type: ResourceType,
            uid: &ResourceUid,
        ) -> Result<Option<ResourceUid>> {
            self.inner.lookup_resource_parent(resource_type, uid)
        }
    }

    #[test]
    fn test_invalidation_during_read_through_is_not_lost() {
        let backing = InMemoryRbacStore::new();
        let grant = backing
            .add_grant(
                PermissionGrant::new(
                    ResourceUid::pack("p1").unwrap(),
                    ResourceType::Pack,
                    [PermissionType::RULE_VIEW],
                )
                .unwrap(),
            )
            .unwrap();
        backing.add_role(Role::new("viewer", [grant]));

        let read_done = Arc::new(Barrier::new(2));
        let resume = Arc::new(Barrier::new(2));
        let cached = CachingRbacStore::new(
            PausingStore {
                inner: backing.clone(),
                armed: AtomicBool::new(true),
                read_done: Arc::clone(&read_done),
                resume: Arc::clone(&resume),
            },
            Duration::from_secs(60),
            100,
        );
        let name = RoleName::new("viewer");

        thread::scope(|s| {
            let in_flight = s.spawn(|| cached.lookup_role(&name).unwrap());

            read_done.wait();
            backing.add_role(Role::new("viewer", Vec::<GrantId>::new()));
            cached.invalidate(&InvalidationEvent::Role(name.clone()));
            resume.wait();

            // The paused lookup still answers with what it read.
            assert_eq!(in_flight.join().unwrap().permission_grants.len(), 1);
        });

        assert!(cached.lookup_role(&name).unwrap().permission_grants.is_empty());
    }

    #[test]
    fn test_invalidate_all_during_read_through_is_not_lost() {
        let backing = InMemoryRbacStore::new();
        backing.add_role(Role::new("viewer", [GrantId::new("g1")]));

        let read_done = Arc::new(Barrier::new(2));
        let resume = Arc::new(Barrier::new(2));
        let cached = CachingRbacStore::new(
            PausingStore {
                inner: backing.clone(),
                armed: AtomicBool::new(true),
                read_done: Arc::clone(&read_done),
                resume: Arc::clone(&resume),
            },
            Duration::from_secs(60),
            100,
        );
        let name = RoleName::new("viewer");

        thread::scope(|s| {
            let in_flight = s.spawn(|| cached.lookup_role(&name).unwrap());

            read_done.wait();
            backing.add_role(Role::new("viewer", Vec::<GrantId>::new()));
            cached.invalidate(&InvalidationEvent::All);
            resume.wait();

            in_flight.join().unwrap();
        });

        assert!(cached.lookup_role(&name).unwrap().permission_grants.is_empty());
        assert_eq!(cached.stats().roles, 1);
    }

    #[test]
    fn test_invalidate_all() {
        let (backing, cached) = setup();
        backing.add_role(Role::new("r1", Vec::<GrantId>::new()));
        backing.assign_role(UserRoleAssignment::new("u1", "r1"));

        cached.lookup_role(&RoleName::new("r1")).unwrap();
        cached.lookup_role_assignments(&UserName::new("u1")).unwrap();
        assert_ne!(cached.stats(), CacheStats::default());

        cached.invalidate(&InvalidationEvent::All);
        assert_eq!(cached.stats(), CacheStats::default());
    }

    #[test]
    fn test_ttl_expiry() {
        let backing = InMemoryRbacStore::new();
        let cached = CachingRbacStore::new(backing.clone(), Duration::ZERO, 100);
        backing.assign_role(UserRoleAssignment::new("u1", "r1"));

        let user = UserName::new("u1");
        cached.lookup_role_assignments(&user).unwrap();
        backing.assign_role(UserRoleAssignment::new("u1", "r2"));
        assert_eq!(cached.lookup_role_assignments(&user).unwrap().len(), 2);
    }

    #[test]
    fn test_max_entries_bound() {
        let backing = InMemoryRbacStore::new();
        let cached = CachingRbacStore::new(backing, Duration::from_secs(60), 2);

        for i in 0..5 {
            cached
                .lookup_role_assignments(&UserName::new(format!("user{i}")))
                .unwrap();
        }
        assert_eq!(cached.stats().assignments, 2);
    }

    #[test]
    fn test_event_serde() {
        let json = serde_json::to_string(&InvalidationEvent::Role(RoleName::new("r1"))).unwrap();
        assert_eq!(json, r#"{"type":"role","id":"r1"}"#);
        let back: InvalidationEvent = serde_json::from_str(r#"{"type":"all"}"#).unwrap();
        assert_eq!(back, InvalidationEvent::All);
    }
}
