//! Closed RBAC vocabularies: resource types, permission actions, permission
//! types and built-in system roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorCode, RbacError};

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Every kind of resource permissions can be granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceType {
    Pack,
    Sensor,
    Action,
    Rule,
}

impl ResourceType {
    /// Canonical tag, also used as the UID prefix.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pack => "pack",
            Self::Sensor => "sensor_type",
            Self::Action => "action",
            Self::Rule => "rule",
        }
    }

    /// Whether resources of this type are owned by a pack.
    pub const fn is_pack_child(&self) -> bool {
        matches!(self, Self::Sensor | Self::Action | Self::Rule)
    }

    pub fn all() -> [ResourceType; 4] {
        [Self::Pack, Self::Sensor, Self::Action, Self::Rule]
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| {
            RbacError::new(
                ErrorCode::UnknownResourceType,
                format!("Unknown resource type: {}", s),
            )
        })
    }
}

impl TryFrom<String> for ResourceType {
    type Error = RbacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Action
// ═══════════════════════════════════════════════════════════════════════════════

/// The verb half of a permission type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionAction {
    View,
    Create,
    Modify,
    Delete,
    Execute,
    /// Superset marker for every other action on the same resource type.
    All,
}

impl PermissionAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Execute => "execute",
            Self::All => "all",
        }
    }

    pub fn all() -> [PermissionAction; 6] {
        [
            Self::View,
            Self::Create,
            Self::Modify,
            Self::Delete,
            Self::Execute,
            Self::All,
        ]
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::all().into_iter().find(|a| a.as_str() == tag)
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionAction {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| {
            RbacError::new(
                ErrorCode::UnknownPermissionType,
                format!("Unknown permission action: {}", s),
            )
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Type
// ═══════════════════════════════════════════════════════════════════════════════

/// A capability tag: an action on a resource type.
///
/// The string form is `<resource type>_<action>`, e.g. `sensor_type_view`
/// or `action_execute`. A permission type only means something relative to
/// the resource type it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionType {
    resource_type: ResourceType,
    action: PermissionAction,
}

impl PermissionType {
    pub const PACK_VIEW: Self = Self::new(ResourceType::Pack, PermissionAction::View);
    pub const PACK_CREATE: Self = Self::new(ResourceType::Pack, PermissionAction::Create);
    pub const PACK_MODIFY: Self = Self::new(ResourceType::Pack, PermissionAction::Modify);
    pub const PACK_DELETE: Self = Self::new(ResourceType::Pack, PermissionAction::Delete);
    pub const PACK_ALL: Self = Self::new(ResourceType::Pack, PermissionAction::All);

    pub const SENSOR_VIEW: Self = Self::new(ResourceType::Sensor, PermissionAction::View);
    pub const SENSOR_MODIFY: Self = Self::new(ResourceType::Sensor, PermissionAction::Modify);
    pub const SENSOR_EXECUTE: Self = Self::new(ResourceType::Sensor, PermissionAction::Execute);
    pub const SENSOR_ALL: Self = Self::new(ResourceType::Sensor, PermissionAction::All);

    pub const ACTION_VIEW: Self = Self::new(ResourceType::Action, PermissionAction::View);
    pub const ACTION_CREATE: Self = Self::new(ResourceType::Action, PermissionAction::Create);
    pub const ACTION_MODIFY: Self = Self::new(ResourceType::Action, PermissionAction::Modify);
    pub const ACTION_DELETE: Self = Self::new(ResourceType::Action, PermissionAction::Delete);
    pub const ACTION_EXECUTE: Self = Self::new(ResourceType::Action, PermissionAction::Execute);
    pub const ACTION_ALL: Self = Self::new(ResourceType::Action, PermissionAction::All);

    pub const RULE_VIEW: Self = Self::new(ResourceType::Rule, PermissionAction::View);
    pub const RULE_CREATE: Self = Self::new(ResourceType::Rule, PermissionAction::Create);
    pub const RULE_MODIFY: Self = Self::new(ResourceType::Rule, PermissionAction::Modify);
    pub const RULE_DELETE: Self = Self::new(ResourceType::Rule, PermissionAction::Delete);
    pub const RULE_ALL: Self = Self::new(ResourceType::Rule, PermissionAction::All);

    pub const fn new(resource_type: ResourceType, action: PermissionAction) -> Self {
        Self {
            resource_type,
            action,
        }
    }

    pub const fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub const fn action(&self) -> PermissionAction {
        self.action
    }

    pub const fn is_all(&self) -> bool {
        matches!(self.action, PermissionAction::All)
    }

    pub const fn is_view(&self) -> bool {
        matches!(self.action, PermissionAction::View)
    }

    /// The ALL tag for the same resource type.
    pub const fn all_permission(&self) -> Self {
        Self::new(self.resource_type, PermissionAction::All)
    }

    /// Every permission type defined for `resource_type`.
    pub fn for_resource_type(resource_type: ResourceType) -> Vec<PermissionType> {
        PermissionAction::all()
            .into_iter()
            .map(|action| Self::new(resource_type, action))
            .collect()
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.resource_type, self.action)
    }
}

impl FromStr for PermissionType {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Resource tags may themselves contain '_' (sensor_type), actions never do.
        let parsed = s.rsplit_once('_').and_then(|(resource, action)| {
            Some(Self::new(
                ResourceType::from_tag(resource)?,
                PermissionAction::from_tag(action)?,
            ))
        });
        parsed.ok_or_else(|| {
            RbacError::new(
                ErrorCode::UnknownPermissionType,
                format!("Unknown permission type: {}", s),
            )
        })
    }
}

impl TryFrom<String> for PermissionType {
    type Error = RbacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PermissionType> for String {
    fn from(value: PermissionType) -> Self {
        value.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// System Roles
// ═══════════════════════════════════════════════════════════════════════════════

/// Built-in roles whose semantics are hard-coded rather than derived from
/// permission grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    /// Every permission on every resource.
    Admin,
    /// Every VIEW permission on every resource.
    Observer,
}

impl SystemRole {
    /// Reserved role name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Observer => "observer",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full access to every resource",
            Self::Observer => "Read-only access to every resource",
        }
    }

    pub fn all() -> [SystemRole; 2] {
        [Self::Admin, Self::Observer]
    }

    /// Look up a system role by its reserved name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for SystemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
