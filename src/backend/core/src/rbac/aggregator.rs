//! Resolves a principal's roles and the union of the grants they carry.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use super::models::{GrantId, PermissionGrant, RoleName, UserName};
use super::store::RbacStore;
use crate::error::Result;

/// Every grant reachable from a principal's roles, deduplicated by grant id.
///
/// Backed by ordered collections so iteration order is deterministic.
#[derive(Debug, Clone, Default)]
pub struct EffectiveGrants {
    roles: BTreeSet<RoleName>,
    grants: BTreeMap<GrantId, PermissionGrant>,
}

impl EffectiveGrants {
    /// Custom (non-system) roles that contributed grants.
    pub fn roles(&self) -> &BTreeSet<RoleName> {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn contains(&self, id: &GrantId) -> bool {
        self.grants.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.values()
    }
}

impl<'a> IntoIterator for &'a EffectiveGrants {
    type Item = &'a PermissionGrant;
    type IntoIter = std::collections::btree_map::Values<'a, GrantId, PermissionGrant>;

    fn into_iter(self) -> Self::IntoIter {
        self.grants.values()
    }
}

/// Walks assignment -> role -> grant edges through a store.
pub struct RoleAggregator<'s, S: RbacStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: RbacStore + ?Sized> RoleAggregator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Union of the grants attached to every role assigned to `user`.
    ///
    /// Built-in roles are skipped: their behaviour is hard-coded and their
    /// records are never required to exist. A dangling role or grant
    /// reference fails the whole lookup.
    pub fn effective_grants(&self, user: &UserName) -> Result<EffectiveGrants> {
        let assigned = self.store.lookup_role_assignments(user)?;
        self.grants_for_roles(user, &assigned)
    }

    /// Same as [`effective_grants`](Self::effective_grants), for an
    /// assignment set the caller already read.
    pub fn grants_for_roles(
        &self,
        user: &UserName,
        assigned: &BTreeSet<RoleName>,
    ) -> Result<EffectiveGrants> {
        let mut effective = EffectiveGrants::default();

        for role_name in assigned {
            if let Some(system_role) = role_name.system_role() {
                trace!(user = %user, role = %system_role, "Skipping built-in role");
                continue;
            }

            let role = self.store.lookup_role(role_name)?;
            for grant_id in &role.permission_grants {
                if effective.grants.contains_key(grant_id) {
                    continue;
                }
                let grant = self.store.lookup_grant(grant_id)?;
                effective.grants.insert(grant_id.clone(), grant);
            }
            effective.roles.insert(role_name.clone());
        }

        debug!(
            user = %user,
            roles = effective.roles.len(),
            grants = effective.grants.len(),
            "Resolved effective grants"
        );
        Ok(effective)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::models::{Role, UserRoleAssignment};
    use crate::rbac::resource::ResourceUid;
    use crate::rbac::store::InMemoryRbacStore;
    use crate::rbac::types::{PermissionType, ResourceType, SystemRole};

    fn grant(store: &InMemoryRbacStore, pack: &str, perm: PermissionType) -> GrantId {
        store
            .add_grant(
                PermissionGrant::new(ResourceUid::pack(pack).unwrap(), ResourceType::Pack, [perm]).unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_no_assignments_yields_empty_set() {
        let store = InMemoryRbacStore::new();
        let grants = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("nobody"))
            .unwrap();
        assert!(grants.is_empty());
        assert!(grants.roles().is_empty());
    }

    #[test]
    fn test_union_is_deduplicated_by_grant_id() {
        let store = InMemoryRbacStore::new();
        let shared = grant(&store, "p1", PermissionType::ACTION_VIEW);
        let only_r2 = grant(&store, "p2", PermissionType::RULE_VIEW);

        store.add_role(Role::new("r1", [shared.clone()]));
        store.add_role(Role::new("r2", [shared.clone(), only_r2.clone()]));
        store.assign_role(UserRoleAssignment::new("u1", "r1"));
        store.assign_role(UserRoleAssignment::new("u1", "r2"));

        let grants = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("u1"))
            .unwrap();
        assert_eq!(grants.len(), 2);
        assert!(grants.contains(&shared));
        assert!(grants.contains(&only_r2));
        assert_eq!(grants.roles().len(), 2);
    }

    #[test]
    fn test_role_without_grants() {
        let store = InMemoryRbacStore::new();
        store.add_role(Role::new("custom_role_1", Vec::<GrantId>::new()));
        store.assign_role(UserRoleAssignment::new("u1", "custom_role_1"));

        let grants = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("u1"))
            .unwrap();
        assert!(grants.is_empty());
        assert_eq!(grants.roles().len(), 1);
    }

    #[test]
    fn test_system_roles_need_no_records() {
        let store = InMemoryRbacStore::new();
        store.assign_role(UserRoleAssignment::new("watcher", SystemRole::Observer));

        let grants = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("watcher"))
            .unwrap();
        assert!(grants.is_empty());
    }

    #[test]
    fn test_dangling_references_fail() {
        let store = InMemoryRbacStore::new();
        store.assign_role(UserRoleAssignment::new("u1", "ghost_role"));
        let err = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("u1"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleNotFound);

        store.add_role(Role::new("ghost_role", [GrantId::new("ghost_grant")]));
        let err = RoleAggregator::new(&store)
            .effective_grants(&UserName::new("u1"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GrantNotFound);
    }
}
