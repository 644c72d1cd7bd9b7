//! RBAC data models: principals, roles, permission grants and role assignments.
//!
//! All records here are read-only from the resolver's point of view. They are
//! created by the administration layer and looked up through
//! [`RbacStore`](super::store::RbacStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::resource::ResourceUid;
use super::types::{PermissionType, ResourceType, SystemRole};
use crate::error::{ErrorCode, RbacError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique, immutable principal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserName(pub String);

impl UserName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique role name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The built-in role this name is reserved for, if any.
    pub fn system_role(&self) -> Option<SystemRole> {
        SystemRole::from_name(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<SystemRole> for RoleName {
    fn from(role: SystemRole) -> Self {
        Self(role.name().to_string())
    }
}

/// Unique permission grant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantId(pub String);

impl GrantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GrantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// A principal. Identity only; permissions come from role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: UserName,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: UserName::new(name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Grant
// ═══════════════════════════════════════════════════════════════════════════════

/// A set of permission types granted at the scope of one resource.
///
/// Grants are immutable: there are no setters, and the scope is validated
/// once at construction. Deserialisation goes through the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PermissionGrantRecord")]
pub struct PermissionGrant {
    id: GrantId,
    resource_uid: ResourceUid,
    resource_type: ResourceType,
    permission_types: BTreeSet<PermissionType>,
    created_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Create a grant with a fresh identifier.
    pub fn new(
        resource_uid: ResourceUid,
        resource_type: ResourceType,
        permission_types: impl IntoIterator<Item = PermissionType>,
    ) -> Result<Self> {
        Self::with_id(GrantId::generate(), resource_uid, resource_type, permission_types)
    }

    /// Create a grant with a caller-chosen identifier.
    ///
    /// The UID must encode `resource_type`. Every permission type must belong
    /// to `resource_type`; pack-scoped grants may also carry permission types
    /// of pack-owned resource types, which then cascade to the pack's children.
    pub fn with_id(
        id: GrantId,
        resource_uid: ResourceUid,
        resource_type: ResourceType,
        permission_types: impl IntoIterator<Item = PermissionType>,
    ) -> Result<Self> {
        if resource_uid.resource_type() != resource_type {
            return Err(RbacError::new(
                ErrorCode::ResourceTypeMismatch,
                format!(
                    "Grant scope '{}' does not refer to a {}",
                    resource_uid, resource_type
                ),
            ));
        }

        let permission_types: BTreeSet<PermissionType> = permission_types.into_iter().collect();
        for permission_type in &permission_types {
            let target = permission_type.resource_type();
            let allowed = target == resource_type
                || (resource_type == ResourceType::Pack && target.is_pack_child());
            if !allowed {
                return Err(RbacError::new(
                    ErrorCode::ResourceTypeMismatch,
                    format!(
                        "Permission type {} cannot be granted on a {}",
                        permission_type, resource_type
                    ),
                ));
            }
        }

        Ok(Self {
            id,
            resource_uid,
            resource_type,
            permission_types,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &GrantId {
        &self.id
    }

    pub fn resource_uid(&self) -> &ResourceUid {
        &self.resource_uid
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn permission_types(&self) -> &BTreeSet<PermissionType> {
        &self.permission_types
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Deserialize)]
struct PermissionGrantRecord {
    id: GrantId,
    resource_uid: ResourceUid,
    resource_type: ResourceType,
    permission_types: Vec<PermissionType>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PermissionGrantRecord> for PermissionGrant {
    type Error = RbacError;

    fn try_from(record: PermissionGrantRecord) -> Result<Self> {
        let mut grant = Self::with_id(
            record.id,
            record.resource_uid,
            record.resource_type,
            record.permission_types,
        )?;
        grant.created_at = record.created_at;
        Ok(grant)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named bundle of permission grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name.
    pub name: RoleName,
    /// Description of the role's purpose.
    #[serde(default)]
    pub description: String,
    /// Grants carried by this role. Order is irrelevant.
    #[serde(default)]
    pub permission_grants: BTreeSet<GrantId>,
    /// Whether this is a built-in system role.
    #[serde(default)]
    pub system: bool,
    /// When the role was created.
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a custom role.
    pub fn new(
        name: impl Into<String>,
        permission_grants: impl IntoIterator<Item = GrantId>,
    ) -> Self {
        Self {
            name: RoleName::new(name),
            description: String::new(),
            permission_grants: permission_grants.into_iter().collect(),
            system: false,
            created_at: Utc::now(),
        }
    }

    /// Build the record for a built-in role. It never carries grants.
    pub fn system(role: SystemRole) -> Self {
        Self {
            name: role.into(),
            description: role.description().to_string(),
            permission_grants: BTreeSet::new(),
            system: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Assignment
// ═══════════════════════════════════════════════════════════════════════════════

/// Edge between a principal and a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleAssignment {
    pub user: UserName,
    pub role: RoleName,
    pub created_at: DateTime<Utc>,
}

impl UserRoleAssignment {
    pub fn new(user: impl Into<UserName>, role: impl Into<RoleName>) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
            created_at: Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
