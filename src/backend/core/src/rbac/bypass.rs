//! Hard-coded shortcuts for the built-in roles.
//!
//! | Role     | Shortcut                                       |
//! |----------|------------------------------------------------|
//! | admin    | Allow every permission on every resource       |
//! | observer | Allow every VIEW permission on every resource  |
//!
//! Neither role depends on grant records, so the admin path cannot be locked
//! out by a broken grant set.

use std::collections::BTreeSet;

use super::models::{RoleName, UserName};
use super::store::RbacStore;
use super::types::{PermissionType, SystemRole};
use crate::error::Result;

/// Outcome of the bypass check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassDecision {
    /// Allowed by a built-in role; grants are not consulted.
    Allow(SystemRole),
    /// No opinion. Explicit grants decide.
    NotApplicable,
}

impl BypassDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Apply the built-in role rules to a user's current assignments.
pub fn bypass_decision<S: RbacStore + ?Sized>(
    store: &S,
    user: &UserName,
    permission_type: PermissionType,
) -> Result<BypassDecision> {
    let assigned = store.lookup_role_assignments(user)?;
    Ok(bypass_for_roles(&assigned, permission_type))
}

/// Apply the built-in role rules, in order: admin first, then observer for
/// VIEW requests.
pub fn bypass_for_roles(
    assigned: &BTreeSet<RoleName>,
    permission_type: PermissionType,
) -> BypassDecision {
    if assigned.contains(&RoleName::from(SystemRole::Admin)) {
        return BypassDecision::Allow(SystemRole::Admin);
    }

    if permission_type.is_view() && assigned.contains(&RoleName::from(SystemRole::Observer)) {
        return BypassDecision::Allow(SystemRole::Observer);
    }

    BypassDecision::NotApplicable
}
