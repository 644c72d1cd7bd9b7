//! Permission resolvers.
//!
//! [`RbacResolver`] is the decision core shared by every resource type:
//!
//! 1. validate that the permission type belongs to the resource's type
//! 2. apply the built-in role shortcuts ([`bypass_for_roles`])
//! 3. determine the resource's owning pack, if it has one
//! 4. collect the principal's effective grants ([`RoleAggregator`])
//! 5. allow if any grant matches ([`match_grant`]), deny otherwise
//!
//! Errors are never turned into a decision. A caller that wants fail-closed
//! behaviour maps `Err` to a denial itself, and can tell "denied by policy"
//! apart from "could not evaluate" through [`RbacError::kind`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

use super::aggregator::RoleAggregator;
use super::bypass::{bypass_for_roles, BypassDecision};
use super::cache::{CacheInvalidator, CachingRbacStore, InvalidationEvent};
use super::matcher::{match_grant, GrantMatch, MatchTarget};
use super::models::{GrantId, UserName};
use super::resource::{
    check_owning_pack, Action, Pack, RbacResource, ResourceRef, ResourceUid, Rule, SensorType,
    TypedResource,
};
use super::store::RbacStore;
use super::types::{PermissionType, ResourceType, SystemRole};
use crate::config::RbacConfig;
use crate::error::{ErrorCode, ErrorDetails, RbacError, Result};
use crate::telemetry::DecisionMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver Interface
// ═══════════════════════════════════════════════════════════════════════════════

/// Answers "may this user do this to this resource?".
pub trait PermissionsResolver: Send + Sync {
    /// Check a single permission on a resource.
    fn user_has_resource_permission(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_type: PermissionType,
    ) -> Result<bool>;

    /// Check a permission on a resource identified by type and UID.
    fn has_permission(
        &self,
        principal_id: &str,
        resource: &ResourceRef,
        permission_type: PermissionType,
    ) -> Result<bool> {
        self.user_has_resource_permission(&UserName::new(principal_id), resource, permission_type)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a request was allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    AdminBypass,
    ObserverBypass,
    /// An explicit grant held through one of the user's roles.
    Grant { grant_id: GrantId, matched: GrantMatch },
}

/// Result of a permission evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow(DecisionReason),
    /// No bypass applied and no grant matched.
    Deny,
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    /// Short label of the rule that decided: admin, observer, grant or no_grant.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow(DecisionReason::AdminBypass) => "admin",
            Self::Allow(DecisionReason::ObserverBypass) => "observer",
            Self::Allow(DecisionReason::Grant { .. }) => "grant",
            Self::Deny => "no_grant",
        }
    }
}

impl fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow(DecisionReason::Grant { grant_id, matched }) => {
                write!(f, "allow (grant {} via {})", grant_id, matched)
            }
            Self::Allow(_) => write!(f, "allow ({})", self.label()),
            Self::Deny => f.write_str("deny"),
        }
    }
}

impl From<SystemRole> for DecisionReason {
    fn from(role: SystemRole) -> Self {
        match role {
            SystemRole::Admin => Self::AdminBypass,
            SystemRole::Observer => Self::ObserverBypass,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision Core
// ═══════════════════════════════════════════════════════════════════════════════

/// The strict decision core. Holds no state of its own besides the store.
#[derive(Debug, Clone)]
pub struct RbacResolver<S> {
    store: S,
}

impl<S: RbacStore> RbacResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Evaluate a request and report why it was allowed.
    pub fn decide(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_type: PermissionType,
    ) -> Result<PermissionDecision> {
        let timer = DecisionMetrics::start();
        let resource_type = resource.resource_type();
        let uid = resource.uid();
        let span = debug_span!(
            "rbac_decision",
            user = %user,
            resource = %uid,
            permission_type = %permission_type
        );
        let _entered = span.enter();

        let result = self.evaluate(user, resource, &uid, permission_type);
        match &result {
            Ok(decision) => {
                debug!(decision = %decision, "Permission evaluated");
                DecisionMetrics::record(
                    resource_type,
                    decision.is_allowed(),
                    decision.label(),
                    timer.elapsed(),
                );
            }
            Err(e) => {
                e.log();
                DecisionMetrics::record_error(resource_type, e.kind());
            }
        }
        result
    }

    fn evaluate(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        uid: &ResourceUid,
        permission_type: PermissionType,
    ) -> Result<PermissionDecision> {
        let resource_type = resource.resource_type();
        validate_request(resource_type, uid, permission_type)?;

        // One read of the assignments serves both the bypass and the grants.
        let assigned = self.store.lookup_role_assignments(user)?;
        if let BypassDecision::Allow(role) = bypass_for_roles(&assigned, permission_type) {
            return Ok(PermissionDecision::Allow(role.into()));
        }

        let parent_uid = self.resolve_parent(resource, uid)?;
        let grants = RoleAggregator::new(&self.store).grants_for_roles(user, &assigned)?;

        let target = MatchTarget {
            resource_type,
            uid,
            parent_uid: parent_uid.as_ref(),
            permission_type,
        };
        for grant in &grants {
            if let Some(matched) = match_grant(grant, &target) {
                return Ok(PermissionDecision::Allow(DecisionReason::Grant {
                    grant_id: grant.id().clone(),
                    matched,
                }));
            }
        }

        Ok(PermissionDecision::Deny)
    }

    /// The owning pack of a pack child: taken from the resource when it
    /// knows it, otherwise looked up in the store. Either way it must be the
    /// pack named by the child's UID.
    fn resolve_parent(
        &self,
        resource: &dyn RbacResource,
        uid: &ResourceUid,
    ) -> Result<Option<ResourceUid>> {
        let resource_type = resource.resource_type();
        if !resource_type.is_pack_child() {
            return Ok(None);
        }

        let parent = match resource.parent_uid() {
            Some(parent) => parent,
            None => self
                .store
                .lookup_resource_parent(resource_type, uid)?
                .ok_or_else(|| {
                    RbacError::new(
                        ErrorCode::OrphanResource,
                        format!("Resource {} has no owning pack", uid),
                    )
                    .with_details(ErrorDetails::new().with_entity("resource", uid.as_str()))
                })?,
        };

        check_owning_pack(uid, &parent)?;
        Ok(Some(parent))
    }

    /// True only if every permission type is allowed.
    pub fn check_all(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_types: &[PermissionType],
    ) -> Result<bool> {
        for permission_type in permission_types {
            if self.decide(user, resource, *permission_type)?.is_denied() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True if at least one permission type is allowed.
    pub fn check_any(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_types: &[PermissionType],
    ) -> Result<bool> {
        for permission_type in permission_types {
            if self.decide(user, resource, *permission_type)?.is_allowed() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<S: RbacStore> PermissionsResolver for RbacResolver<S> {
    fn user_has_resource_permission(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_type: PermissionType,
    ) -> Result<bool> {
        Ok(self.decide(user, resource, permission_type)?.is_allowed())
    }
}

fn validate_request(
    resource_type: ResourceType,
    uid: &ResourceUid,
    permission_type: PermissionType,
) -> Result<()> {
    if permission_type.resource_type() != resource_type {
        return Err(RbacError::new(
            ErrorCode::ResourceTypeMismatch,
            format!(
                "Permission type {} does not apply to resource type {}",
                permission_type, resource_type
            ),
        ));
    }
    if uid.resource_type() != resource_type {
        return Err(RbacError::new(
            ErrorCode::ResourceTypeMismatch,
            format!("Resource uid '{}' does not refer to a {}", uid, resource_type),
        ));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Per-Type Resolvers
// ═══════════════════════════════════════════════════════════════════════════════

/// The decision core restricted to one resource type.
pub struct TypedPermissionsResolver<S, R> {
    core: RbacResolver<S>,
    _resource: PhantomData<fn() -> R>,
}

pub type PackPermissionsResolver<S> = TypedPermissionsResolver<S, Pack>;
pub type SensorPermissionsResolver<S> = TypedPermissionsResolver<S, SensorType>;
pub type ActionPermissionsResolver<S> = TypedPermissionsResolver<S, Action>;
pub type RulePermissionsResolver<S> = TypedPermissionsResolver<S, Rule>;

impl<S: RbacStore, R: TypedResource> TypedPermissionsResolver<S, R> {
    pub fn new(store: S) -> Self {
        Self {
            core: RbacResolver::new(store),
            _resource: PhantomData,
        }
    }

    /// The resource type this resolver accepts.
    pub fn resource_type(&self) -> ResourceType {
        R::RESOURCE_TYPE
    }

    pub fn core(&self) -> &RbacResolver<S> {
        &self.core
    }
}

impl<S: RbacStore, R: TypedResource> PermissionsResolver for TypedPermissionsResolver<S, R> {
    fn user_has_resource_permission(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_type: PermissionType,
    ) -> Result<bool> {
        if resource.resource_type() != R::RESOURCE_TYPE {
            return Err(RbacError::new(
                ErrorCode::ResourceTypeMismatch,
                format!(
                    "{} resolver cannot evaluate a {}",
                    R::RESOURCE_TYPE,
                    resource.resource_type()
                ),
            ));
        }
        self.core
            .user_has_resource_permission(user, resource, permission_type)
    }
}

impl<S, R> fmt::Debug for TypedPermissionsResolver<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedPermissionsResolver")
            .field("resource_type", &std::any::type_name::<R>())
            .finish()
    }
}

/// Resolver specialised for `resource_type`.
pub fn resolver_for_resource_type<S>(
    resource_type: ResourceType,
    store: S,
) -> Box<dyn PermissionsResolver>
where
    S: RbacStore + 'static,
{
    match resource_type {
        ResourceType::Pack => Box::new(PackPermissionsResolver::new(store)),
        ResourceType::Sensor => Box::new(SensorPermissionsResolver::new(store)),
        ResourceType::Action => Box::new(ActionPermissionsResolver::new(store)),
        ResourceType::Rule => Box::new(RulePermissionsResolver::new(store)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Disabled RBAC
// ═══════════════════════════════════════════════════════════════════════════════

/// Allows everything. Used when RBAC is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPermissionsResolver;

impl PermissionsResolver for NoopPermissionsResolver {
    fn user_has_resource_permission(
        &self,
        _user: &UserName,
        _resource: &dyn RbacResource,
        _permission_type: PermissionType,
    ) -> Result<bool> {
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Construction From Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// A configured resolver plus the hook to invalidate its cache.
#[derive(Clone)]
pub struct ResolverHandle {
    resolver: Arc<dyn PermissionsResolver>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
    enforcing: bool,
}

impl ResolverHandle {
    /// Whether checks are actually evaluated (RBAC enabled).
    pub fn is_enforcing(&self) -> bool {
        self.enforcing
    }

    pub fn is_cached(&self) -> bool {
        self.invalidator.is_some()
    }

    /// Forward a store mutation to the cache, if there is one.
    pub fn invalidate(&self, event: &InvalidationEvent) {
        if let Some(invalidator) = &self.invalidator {
            invalidator.invalidate(event);
        }
    }

    pub fn resolver(&self) -> Arc<dyn PermissionsResolver> {
        Arc::clone(&self.resolver)
    }
}

impl fmt::Debug for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverHandle")
            .field("enforcing", &self.enforcing)
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl PermissionsResolver for ResolverHandle {
    fn user_has_resource_permission(
        &self,
        user: &UserName,
        resource: &dyn RbacResource,
        permission_type: PermissionType,
    ) -> Result<bool> {
        self.resolver
            .user_has_resource_permission(user, resource, permission_type)
    }
}

/// Build the resolver described by `config`.
///
/// Disabled RBAC yields [`NoopPermissionsResolver`]; otherwise the strict
/// core, reading through a [`CachingRbacStore`] when the cache is enabled.
pub fn build_resolver<S>(config: &RbacConfig, store: S) -> ResolverHandle
where
    S: RbacStore + 'static,
{
    if !config.enable {
        warn!("RBAC is disabled, every permission check will be allowed");
        return ResolverHandle {
            resolver: Arc::new(NoopPermissionsResolver),
            invalidator: None,
            enforcing: false,
        };
    }

    if config.cache.enabled {
        let cached = Arc::new(CachingRbacStore::from_config(store, &config.cache));
        debug!(
            ttl = ?config.cache.ttl,
            max_entries = config.cache.max_entries,
            "RBAC resolver built with cache"
        );
        return ResolverHandle {
            resolver: Arc::new(RbacResolver::new(Arc::clone(&cached))),
            invalidator: Some(cached),
            enforcing: true,
        };
    }

    ResolverHandle {
        resolver: Arc::new(RbacResolver::new(store)),
        invalidator: None,
        enforcing: true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
