#![allow(clippy::result_large_err)]
//! # PackGuard Core
//!
//! Authorization decisions for pack-based automation content.
//!
//! Given a user, a resource and a permission type, the resolver answers
//! whether the request is allowed.
//!
//! ## Architecture
//!
//! - **System role bypass**: `admin` may do anything, `observer` may view anything
//! - **Role aggregation**: the union of grants carried by a user's roles
//! - **Grant matching**: exact-resource grants and pack-scoped grants that
//!   cascade to the pack's sensors, actions and rules
//! - **Store**: a read-only interface to persisted RBAC state, optionally
//!   behind an invalidation-aware cache
//! - **Telemetry**: structured logging and decision metrics

pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorKind, ErrorSeverity, RbacError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CacheConfig, Config, RbacConfig};
    pub use crate::error::{ErrorCode, ErrorKind, RbacError, Result};
    pub use crate::rbac::{
        build_resolver, resolver_for_resource_type, Action, GrantId, InMemoryRbacStore,
        InvalidationEvent, NoopPermissionsResolver, Pack, PermissionDecision, PermissionGrant,
        PermissionType, PermissionsResolver, RbacResolver, RbacResource, RbacStore,
        ResolverHandle, ResourceRef, ResourceType, ResourceUid, Role, RoleName, Rule,
        SensorType, SystemRole, UserName, UserRoleAssignment,
    };
}
