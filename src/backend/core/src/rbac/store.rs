//! Read access to roles, grants, assignments and the resource hierarchy.
//!
//! The resolver only ever reads through [`RbacStore`]. Persistence is owned
//! by whoever implements the trait; [`InMemoryRbacStore`] is the reference
//! implementation used for embedding and tests.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::models::{GrantId, PermissionGrant, Role, RoleName, UserName, UserRoleAssignment};
use super::resource::{RbacResource, ResourceUid};
use super::types::{ResourceType, SystemRole};
use crate::error::{ErrorCode, RbacError, Result};

/// Lookups the resolver needs from the persistence layer.
///
/// Implementations report a missing role, grant or resource as a NotFound
/// error and an unreachable backend as `StoreUnavailable`. They must never
/// answer with a default value instead.
pub trait RbacStore: Send + Sync {
    /// Names of every role assigned to `user`. Unknown users have none.
    fn lookup_role_assignments(&self, user: &UserName) -> Result<BTreeSet<RoleName>>;

    /// Get a role by name.
    fn lookup_role(&self, name: &RoleName) -> Result<Role>;

    /// Get a permission grant by id.
    fn lookup_grant(&self, id: &GrantId) -> Result<PermissionGrant>;

    /// UID of the structural parent of a resource, `None` for top-level types.
    fn lookup_resource_parent(
        &self,
        resource_type: ResourceType,
        uid: &ResourceUid,
    ) -> Result<Option<ResourceUid>>;

    /// Whether `user` holds the given built-in role.
    fn is_system_role(&self, user: &UserName, role: SystemRole) -> Result<bool> {
        Ok(self
            .lookup_role_assignments(user)?
            .contains(&RoleName::from(role)))
    }
}

impl<S: RbacStore + ?Sized> RbacStore for Arc<S> {
    fn lookup_role_assignments(&self, user: &UserName) -> Result<BTreeSet<RoleName>> {
        (**self).lookup_role_assignments(user)
    }

    fn lookup_role(&self, name: &RoleName) -> Result<Role> {
        (**self).lookup_role(name)
    }

    fn lookup_grant(&self, id: &GrantId) -> Result<PermissionGrant> {
        (**self).lookup_grant(id)
    }

    fn lookup_resource_parent(
        &self,
        resource_type: ResourceType,
        uid: &ResourceUid,
    ) -> Result<Option<ResourceUid>> {
        (**self).lookup_resource_parent(resource_type, uid)
    }

    fn is_system_role(&self, user: &UserName, role: SystemRole) -> Result<bool> {
        (**self).is_system_role(user, role)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════════════════

/// A DashMap-backed store.
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRbacStore {
    roles: Arc<DashMap<RoleName, Role>>,
    grants: Arc<DashMap<GrantId, PermissionGrant>>,
    assignments: Arc<DashMap<UserName, BTreeSet<RoleName>>>,
    /// Known resources and their parent UID.
    resources: Arc<DashMap<ResourceUid, Option<ResourceUid>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the built-in role records present.
    pub fn with_system_roles() -> Self {
        let store = Self::new();
        for role in SystemRole::all() {
            store.add_role(Role::system(role));
        }
        store
    }

    /// Make every lookup fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RbacError::store_unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Population
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a role.
    pub fn add_role(&self, role: Role) {
        debug!(role = %role.name, grants = role.permission_grants.len(), "Adding role");
        self.roles.insert(role.name.clone(), role);
    }

    /// Insert a grant. Grants are immutable, so an existing id is rejected.
    pub fn add_grant(&self, grant: PermissionGrant) -> Result<GrantId> {
        let id = grant.id().clone();
        if self.grants.contains_key(&id) {
            return Err(RbacError::invalid_argument(format!(
                "Permission grant {} already exists",
                id
            )));
        }
        self.grants.insert(id.clone(), grant);
        Ok(id)
    }

    /// Remove a grant. Roles still referencing it will fail lookups with
    /// `GrantNotFound` until they are updated.
    pub fn remove_grant(&self, id: &GrantId) -> bool {
        self.grants.remove(id).is_some()
    }

    /// Assign a role to a user. Repeated assignments have no further effect.
    pub fn assign_role(&self, assignment: UserRoleAssignment) {
        self.assignments
            .entry(assignment.user)
            .or_default()
            .insert(assignment.role);
    }

    /// Remove a role assignment.
    pub fn unassign_role(&self, user: &UserName, role: &RoleName) -> bool {
        self.assignments
            .get_mut(user)
            .map(|mut roles| roles.remove(role))
            .unwrap_or(false)
    }

    /// Make a resource known to the hierarchy lookups.
    pub fn register_resource(&self, resource: &dyn RbacResource) {
        self.resources.insert(resource.uid(), resource.parent_uid());
    }
}

impl RbacStore for InMemoryRbacStore {
    fn lookup_role_assignments(&self, user: &UserName) -> Result<BTreeSet<RoleName>> {
        self.check_available()?;
        Ok(self
            .assignments
            .get(user)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }

    fn lookup_role(&self, name: &RoleName) -> Result<Role> {
        self.check_available()?;
        self.roles
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| RbacError::role_not_found(name.as_str()))
    }

    fn lookup_grant(&self, id: &GrantId) -> Result<PermissionGrant> {
        self.check_available()?;
        self.grants
            .get(id)
            .map(|g| g.clone())
            .ok_or_else(|| RbacError::grant_not_found(id.as_str()))
    }

    fn lookup_resource_parent(
        &self,
        resource_type: ResourceType,
        uid: &ResourceUid,
    ) -> Result<Option<ResourceUid>> {
        self.check_available()?;
        if uid.resource_type() != resource_type {
            return Err(RbacError::new(
                ErrorCode::ResourceTypeMismatch,
                format!("Resource uid '{}' does not refer to a {}", uid, resource_type),
            ));
        }
        self.resources
            .get(uid)
            .map(|parent| parent.clone())
            .ok_or_else(|| RbacError::resource_not_found(uid.as_str()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rbac::resource::{Pack, SensorType};
    use crate::rbac::types::PermissionType;

    #[test]
    fn test_assignments_are_idempotent() {
        let store = InMemoryRbacStore::new();
        store.assign_role(UserRoleAssignment::new("alice", "r1"));
        store.assign_role(UserRoleAssignment::new("alice", "r1"));
        store.assign_role(UserRoleAssignment::new("alice", "r2"));

        let roles = store.lookup_role_assignments(&UserName::new("alice")).unwrap();
        assert_eq!(roles.len(), 2);

        assert!(store.unassign_role(&UserName::new("alice"), &RoleName::new("r1")));
        assert!(!store.unassign_role(&UserName::new("alice"), &RoleName::new("r1")));
        assert!(!store.unassign_role(&UserName::new("nobody"), &RoleName::new("r1")));
    }

    #[test]
    fn test_unknown_user_has_no_roles() {
        let store = InMemoryRbacStore::new();
        assert!(store
            .lookup_role_assignments(&UserName::new("ghost"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let store = InMemoryRbacStore::new();
        let err = store.lookup_role(&RoleName::new("missing")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleNotFound);

        let err = store.lookup_grant(&GrantId::new("missing")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GrantNotFound);

        let err = store
            .lookup_resource_parent(ResourceType::Pack, &ResourceUid::pack("missing").unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_grant_rejected() {
        let store = InMemoryRbacStore::new();
        let grant = PermissionGrant::new(
            ResourceUid::pack("p1").unwrap(),
            ResourceType::Pack,
            [PermissionType::PACK_VIEW],
        )
        .unwrap();
        store.add_grant(grant.clone()).unwrap();
        assert!(store.add_grant(grant).is_err());
    }

    #[test]
    fn test_resource_parent_lookup() {
        let store = InMemoryRbacStore::new();
        let pack = Pack::new("p1").unwrap();
        let sensor = SensorType::new("p1", "s1").unwrap();
        store.register_resource(&pack);
        store.register_resource(&sensor);

        assert_eq!(
            store
                .lookup_resource_parent(ResourceType::Sensor, &sensor.uid())
                .unwrap(),
            Some(pack.uid())
        );
        assert_eq!(
            store.lookup_resource_parent(ResourceType::Pack, &pack.uid()).unwrap(),
            None
        );
    }

    #[test]
    fn test_system_role_membership() {
        let store = InMemoryRbacStore::with_system_roles();
        store.assign_role(UserRoleAssignment::new("root", SystemRole::Admin));

        let root = UserName::new("root");
        assert!(store.is_system_role(&root, SystemRole::Admin).unwrap());
        assert!(!store.is_system_role(&root, SystemRole::Observer).unwrap());
        assert!(store.lookup_role(&RoleName::from(SystemRole::Observer)).unwrap().system);
    }

    #[test]
    fn test_unavailable_store() {
        let store = InMemoryRbacStore::new();
        store.set_unavailable(true);
        let err = store.lookup_role_assignments(&UserName::new("a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.is_retryable());

        store.set_unavailable(false);
        assert!(store.lookup_role_assignments(&UserName::new("a")).is_ok());
    }
}
