//! Decides whether a single permission grant satisfies a request.
//!
//! A grant satisfies a request for `permission_type` on a resource when
//! either:
//!
//! - **exact resource**: the grant is scoped to the resource itself, or
//! - **parent scope**: the grant is scoped to the pack owning the resource.
//!
//! and the grant carries the requested permission type literally, or the ALL
//! tag of the same resource type. Nothing else matches: there is no
//! grandparent traversal, no cross-type inheritance, and a grant for one
//! action never implies another (holding VIEW does not satisfy a request for
//! ALL).

use std::fmt;

use super::models::PermissionGrant;
use super::resource::ResourceUid;
use super::types::{PermissionType, ResourceType};

/// How a grant matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantMatch {
    /// Scoped to the requested resource.
    ExactResource,
    /// Scoped to the pack owning the requested resource.
    ParentScope,
}

impl fmt::Display for GrantMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactResource => f.write_str("exact_resource"),
            Self::ParentScope => f.write_str("parent_scope"),
        }
    }
}

/// The resolved request a grant is matched against.
///
/// The parent UID has already been determined (from the resource itself or
/// from the store), so matching is pure.
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget<'a> {
    pub resource_type: ResourceType,
    pub uid: &'a ResourceUid,
    pub parent_uid: Option<&'a ResourceUid>,
    pub permission_type: PermissionType,
}

/// Whether the grant's capability set contains the requested tag, either
/// literally or through the ALL tag of the same resource type.
pub fn carries_permission(grant: &PermissionGrant, permission_type: PermissionType) -> bool {
    let permission_types = grant.permission_types();
    permission_types.contains(&permission_type)
        || permission_types.contains(&permission_type.all_permission())
}

/// Match a single grant. Returns how it matched, or `None`.
pub fn match_grant(grant: &PermissionGrant, target: &MatchTarget<'_>) -> Option<GrantMatch> {
    if !carries_permission(grant, target.permission_type) {
        return None;
    }

    if grant.resource_type() == target.resource_type && grant.resource_uid() == target.uid {
        return Some(GrantMatch::ExactResource);
    }

    if grant.resource_type() == ResourceType::Pack
        && target.resource_type.is_pack_child()
        && target.parent_uid == Some(grant.resource_uid())
    {
        return Some(GrantMatch::ParentScope);
    }

    None
}

/// Boolean form of [`match_grant`].
pub fn grant_satisfies(grant: &PermissionGrant, target: &MatchTarget<'_>) -> bool {
    match_grant(grant, target).is_some()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
