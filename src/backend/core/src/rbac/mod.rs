//! Role-Based Access Control (RBAC) decisions for packs and their content.
//!
//! This module provides:
//! - **Types**: resource types, permission types (`<resource>_<action>` tags), system roles
//! - **Resources**: UIDs and the pack -> {sensor, action, rule} hierarchy
//! - **Models**: users, roles, permission grants, role assignments
//! - **Store**: the read interface to persisted RBAC state, plus an in-memory store
//! - **Resolvers**: the decision core and per-resource-type resolvers
//! - **Cache**: an invalidation-aware read-through cache for the store
//!
//! # Usage
//!
//! ```rust
//! use packguard_core::rbac::{
//!     InMemoryRbacStore, PermissionGrant, PermissionType, PermissionsResolver,
//!     RbacResolver, ResourceType, ResourceUid, Role, SensorType, UserName,
//!     UserRoleAssignment,
//! };
//!
//! let store = InMemoryRbacStore::new();
//! let grant = PermissionGrant::new(
//!     ResourceUid::pack("examples")?,
//!     ResourceType::Pack,
//!     [PermissionType::SENSOR_VIEW],
//! )?;
//! let grant_id = store.add_grant(grant)?;
//! store.add_role(Role::new("sensor_viewer", [grant_id]));
//! store.assign_role(UserRoleAssignment::new("alice", "sensor_viewer"));
//!
//! let resolver = RbacResolver::new(store);
//! let allowed = resolver.user_has_resource_permission(
//!     &UserName::new("alice"),
//!     &SensorType::new("examples", "file_watch")?,
//!     PermissionType::SENSOR_VIEW,
//! )?;
//! assert!(allowed);
//! # Ok::<(), packguard_core::RbacError>(())
//! ```

pub mod aggregator;
pub mod bypass;
pub mod cache;
pub mod matcher;
pub mod models;
pub mod resolver;
pub mod resource;
pub mod store;
pub mod types;

pub use aggregator::{EffectiveGrants, RoleAggregator};
pub use bypass::{bypass_decision, bypass_for_roles, BypassDecision};
pub use cache::{CacheInvalidator, CacheStats, CachingRbacStore, InvalidationEvent};
pub use matcher::{carries_permission, grant_satisfies, match_grant, GrantMatch, MatchTarget};
pub use models::{
    GrantId, PermissionGrant, Role, RoleName, User, UserName, UserRoleAssignment,
};
pub use resolver::{
    build_resolver, resolver_for_resource_type, ActionPermissionsResolver, DecisionReason,
    NoopPermissionsResolver, PackPermissionsResolver, PermissionDecision, PermissionsResolver,
    RbacResolver, ResolverHandle, RulePermissionsResolver, SensorPermissionsResolver,
    TypedPermissionsResolver,
};
pub use resource::{
    Action, Pack, RbacResource, ResourceRef, ResourceUid, Rule, SensorType, TypedResource,
    UID_SEPARATOR,
};
pub use store::{InMemoryRbacStore, RbacStore};
pub use types::{PermissionAction, PermissionType, ResourceType, SystemRole};
