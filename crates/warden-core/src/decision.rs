// Warden
// Copyright (C) 2026 Warden Contributors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Access decision pipeline
//!
//! Composes authentication, permission requirements, resource-level checks, ownership,
//! and caller-supplied predicates into a single pass/fail decision with fixed, fail-fast
//! stage ordering. Denials are operational telemetry; they never touch the audit store
//! reserved for administrative mutations.

use crate::cache::PermissionCache;
use crate::error::AuthzResult;
use crate::identity::Identity;
use crate::permissions::AccessLevel;
use crate::resolver::EffectivePermissions;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Request-scoped context carried into a decision
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Verified identity, if the external token verifier produced one
    pub identity: Option<Identity>,

    /// Client IP, for telemetry
    pub client_ip: Option<String>,

    /// Request ID, for correlation
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Context with no verified identity
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a verified identity
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            client_ip: None,
            request_id: None,
        }
    }

    /// Attach a client IP
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Attach a request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The authenticated user id, if identity is present and the token has not expired
    pub fn user_id(&self) -> Option<&str> {
        match &self.identity {
            Some(identity) if !identity.is_expired() => Some(identity.user_id.as_str()),
            _ => None,
        }
    }
}

/// Declarative permission requirement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Requirement {
    /// The user must hold this permission
    Permission(String),

    /// The user must hold at least one of these permissions
    AnyOf(Vec<String>),

    /// The user must hold every one of these permissions
    AllOf(Vec<String>),
}

impl Requirement {
    fn is_satisfied_by(&self, resolved: &EffectivePermissions) -> bool {
        match self {
            Requirement::Permission(p) => resolved.contains(p),
            Requirement::AnyOf(list) => resolved.contains_any(list.iter().map(String::as_str)),
            Requirement::AllOf(list) => resolved.contains_all(list.iter().map(String::as_str)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Permission(p) => write!(f, "{}", p),
            Requirement::AnyOf(list) => write!(f, "any-of [{}]", list.join(", ")),
            Requirement::AllOf(list) => write!(f, "all-of [{}]", list.join(", ")),
        }
    }
}

/// Caller-supplied predicate evaluated as the final pipeline stage
pub type CustomCheck = Arc<dyn Fn(&RequestContext, &EffectivePermissions) -> bool + Send + Sync>;

/// Composed protection for an operation
///
/// Stages are evaluated in a fixed order regardless of builder call order: identity,
/// permission requirement, resource level, ownership, custom predicates. The first
/// failing stage short-circuits; later stages are not evaluated.
#[derive(Clone, Default)]
pub struct Protection {
    permission: Option<Requirement>,
    resource_level: Option<(String, AccessLevel)>,
    resource_owner: Option<String>,
    custom: Vec<(String, CustomCheck)>,
}

impl Protection {
    /// Protection that only demands a verified identity
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Require a single permission
    pub fn require_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(Requirement::Permission(permission.into()));
        self
    }

    /// Require at least one of the given permissions
    pub fn require_any(mut self, permissions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.permission = Some(Requirement::AnyOf(permissions.into_iter().map(Into::into).collect()));
        self
    }

    /// Require every one of the given permissions
    pub fn require_all(mut self, permissions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.permission = Some(Requirement::AllOf(permissions.into_iter().map(Into::into).collect()));
        self
    }

    /// Require a minimum ordered access level on a resource
    pub fn require_level(mut self, resource: impl Into<String>, minimum: AccessLevel) -> Self {
        self.resource_level = Some((resource.into(), minimum));
        self
    }

    /// Require the requester to own the resource (admin role bypasses)
    pub fn require_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    /// Add a named caller-supplied predicate
    pub fn check(mut self, name: impl Into<String>, f: impl Fn(&RequestContext, &EffectivePermissions) -> bool + Send + Sync + 'static) -> Self {
        self.custom.push((name.into(), Arc::new(f)));
        self
    }

    fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(req) = &self.permission {
            parts.push(req.to_string());
        }
        if let Some((resource, minimum)) = &self.resource_level {
            parts.push(format!("{} >= {}", resource, minimum.as_action()));
        }
        if self.resource_owner.is_some() {
            parts.push("ownership".to_string());
        }
        for (name, _) in &self.custom {
            parts.push(format!("check:{}", name));
        }

        if parts.is_empty() { "authenticated".to_string() } else { parts.join(" + ") }
    }
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protection")
            .field("permission", &self.permission)
            .field("resource_level", &self.resource_level)
            .field("resource_owner", &self.resource_owner)
            .field("custom", &self.custom.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish()
    }
}

impl From<Requirement> for Protection {
    fn from(requirement: Requirement) -> Self {
        Self {
            permission: Some(requirement),
            ..Self::default()
        }
    }
}

/// Structured denial reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// No verified identity was present (or the token behind it expired)
    AuthenticationRequired,

    /// The resolved permission set does not satisfy the requirement
    InsufficientPermissions,

    /// The ownership check failed and no admin bypass applied
    ResourceNotOwned,

    /// A caller-supplied predicate rejected the request
    CheckFailed {
        /// Name of the failing check, for operator logs
        check: String,
    },
}

impl DenyReason {
    /// Coarse message safe to surface to an end user
    ///
    /// Post-authentication denials share one message so callers cannot probe which
    /// stage failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            DenyReason::AuthenticationRequired => "authentication required",
            _ => "access denied",
        }
    }
}

/// Outcome of an access decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Access granted; carries the resolved permission set for downstream use
    Allow(EffectivePermissions),

    /// Access denied
    Deny(DenyReason),
}

impl Decision {
    /// Whether access was granted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// The resolved permission set, when allowed
    pub fn permissions(&self) -> Option<&EffectivePermissions> {
        match self {
            Decision::Allow(resolved) => Some(resolved),
            Decision::Deny(_) => None,
        }
    }
}

/// Access decision pipeline
#[derive(Debug, Clone)]
pub struct DecisionPipeline {
    cache: Arc<PermissionCache>,
    admin_role: String,
    log_denials: bool,
    slow_threshold: Duration,
}

impl DecisionPipeline {
    /// Create a pipeline over a permission cache
    pub fn new(cache: Arc<PermissionCache>, admin_role: impl Into<String>) -> Self {
        Self {
            cache,
            admin_role: admin_role.into(),
            log_denials: true,
            slow_threshold: Duration::from_millis(5),
        }
    }

    /// Control denial telemetry
    pub fn with_denial_logging(mut self, enabled: bool) -> Self {
        self.log_denials = enabled;
        self
    }

    /// Set the slow-decision warning threshold
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Evaluate a protection against a request context
    ///
    /// Stage 1 runs before any cache or store access: an absent identity denies
    /// immediately without revealing anything about later stages.
    pub async fn decide(&self, ctx: &RequestContext, protection: &Protection) -> AuthzResult<Decision> {
        let start = Instant::now();

        let Some(user_id) = ctx.user_id() else {
            return Ok(self.deny(ctx, protection, DenyReason::AuthenticationRequired));
        };
        let user_id = user_id.to_string();

        let resolved = self.cache.get_or_resolve(&user_id).await?;

        if let Some(requirement) = &protection.permission {
            if !requirement.is_satisfied_by(&resolved) {
                return Ok(self.deny(ctx, protection, DenyReason::InsufficientPermissions));
            }
        }

        if let Some((resource, minimum)) = &protection.resource_level {
            if !resolved.satisfies_level(resource, *minimum) {
                return Ok(self.deny(ctx, protection, DenyReason::InsufficientPermissions));
            }
        }

        if let Some(owner) = &protection.resource_owner {
            let is_owner = owner == &user_id;
            let is_admin = resolved.has_role(&self.admin_role);

            if !is_owner && !is_admin {
                return Ok(self.deny(ctx, protection, DenyReason::ResourceNotOwned));
            }
        }

        for (name, check) in &protection.custom {
            if !check(ctx, &resolved) {
                return Ok(self.deny(ctx, protection, DenyReason::CheckFailed { check: name.clone() }));
            }
        }

        let elapsed = start.elapsed();
        if elapsed > self.slow_threshold {
            warn!(
                user_id = %user_id,
                requirement = %protection.summary(),
                duration_ms = %elapsed.as_millis(),
                "Slow access decision"
            );
        }

        debug!(
            user_id = %user_id,
            requirement = %protection.summary(),
            "Access granted"
        );

        Ok(Decision::Allow(resolved))
    }

    fn deny(&self, ctx: &RequestContext, protection: &Protection, reason: DenyReason) -> Decision {
        if self.log_denials {
            warn!(
                user_id = %ctx.user_id().unwrap_or("anonymous"),
                requirement = %protection.summary(),
                reason = ?reason,
                client_ip = ?ctx.client_ip,
                request_id = ?ctx.request_id,
                timestamp = %Utc::now(),
                "Access denied"
            );
        }

        Decision::Deny(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionCatalog, default_permissions};
    use crate::resolver::PermissionResolver;
    use crate::roles::{Role, RoleAssignment, default_roles};
    use crate::store::{AuthzStore, MemoryStore};
    use chrono::Duration as ChronoDuration;

    async fn pipeline() -> (Arc<MemoryStore>, DecisionPipeline) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(PermissionCatalog::new());

        for permission in default_permissions() {
            catalog.register(permission).unwrap();
        }
        for role in default_roles("admin") {
            store.insert_role(role).await.unwrap();
        }
        store
            .insert_role(Role::new("sales_manager", "Sales Manager", 10).grant("orders:write").grant("customers:read"))
            .await
            .unwrap();
        store.insert_role(Role::new("employee", "Employee", 20).grant("orders:read")).await.unwrap();
        store.add_hierarchy_edge("sales_manager", "employee").await.unwrap();

        let resolver = PermissionResolver::new(store.clone(), catalog);
        let cache = Arc::new(PermissionCache::new(resolver, Duration::from_secs(60)));

        (store, DecisionPipeline::new(cache, "admin").with_denial_logging(false))
    }

    fn ctx(user_id: &str) -> RequestContext {
        RequestContext::authenticated(Identity::new(user_id))
    }

    #[tokio::test]
    async fn test_anonymous_denied_before_any_lookup() {
        let (_store, pipeline) = pipeline().await;

        let decision = pipeline.decide(&RequestContext::anonymous(), &Protection::authenticated().require_permission("orders:read")).await.unwrap();

        assert_eq!(decision, Decision::Deny(DenyReason::AuthenticationRequired));
        // Stage 1 short-circuited: no resolution happened.
        assert_eq!(pipeline.cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_expired_token_treated_as_unauthenticated() {
        let (_store, pipeline) = pipeline().await;

        let identity = Identity::with_expiry("u1", Utc::now() - ChronoDuration::minutes(1));
        let decision = pipeline.decide(&RequestContext::authenticated(identity), &Protection::authenticated()).await.unwrap();

        assert_eq!(decision, Decision::Deny(DenyReason::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_single_permission_requirement() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        let allowed = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_permission("orders:read")).await.unwrap();
        assert!(allowed.is_allowed());

        let denied = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_permission("users:manage")).await.unwrap();
        assert_eq!(denied, Decision::Deny(DenyReason::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_any_of_and_all_of() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        let any = pipeline
            .decide(&ctx("u1"), &Protection::authenticated().require_any(["users:manage", "orders:read"]))
            .await
            .unwrap();
        assert!(any.is_allowed());

        // Inherited through the hierarchy: employee also holds orders:write.
        let all = pipeline
            .decide(&ctx("u1"), &Protection::authenticated().require_all(["orders:read", "orders:write"]))
            .await
            .unwrap();
        assert!(all.is_allowed());

        let all_denied = pipeline
            .decide(&ctx("u1"), &Protection::authenticated().require_all(["orders:read", "users:manage"]))
            .await
            .unwrap();
        assert_eq!(all_denied, Decision::Deny(DenyReason::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_resource_level_requirement() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        let write = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_level("orders", AccessLevel::Write)).await.unwrap();
        assert!(write.is_allowed());

        let manage = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_level("orders", AccessLevel::Manage)).await.unwrap();
        assert_eq!(manage, Decision::Deny(DenyReason::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_ownership_and_admin_bypass() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();
        store.upsert_role_assignment(RoleAssignment::new("root", "admin", "system")).await.unwrap();

        let own = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_owner("u1")).await.unwrap();
        assert!(own.is_allowed());

        let not_own = pipeline.decide(&ctx("u1"), &Protection::authenticated().require_owner("someone_else")).await.unwrap();
        assert_eq!(not_own, Decision::Deny(DenyReason::ResourceNotOwned));

        // Holders of the designated top-level role bypass ownership.
        let bypass = pipeline.decide(&ctx("root"), &Protection::authenticated().require_owner("someone_else")).await.unwrap();
        assert!(bypass.is_allowed());
    }

    #[tokio::test]
    async fn test_custom_check_runs_last() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        let protection = Protection::authenticated()
            .require_permission("orders:read")
            .check("weekday_only", |_, _| false);

        let decision = pipeline.decide(&ctx("u1"), &protection).await.unwrap();
        assert_eq!(
            decision,
            Decision::Deny(DenyReason::CheckFailed {
                check: "weekday_only".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_fail_fast_ordering() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        // Permission stage fails first; the ownership stage (which would also fail)
        // is never reported.
        let protection = Protection::authenticated().require_permission("users:manage").require_owner("someone_else");

        let decision = pipeline.decide(&ctx("u1"), &protection).await.unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_deny_reasons_share_public_message() {
        assert_eq!(DenyReason::InsufficientPermissions.public_message(), DenyReason::ResourceNotOwned.public_message());
        assert_ne!(DenyReason::AuthenticationRequired.public_message(), DenyReason::InsufficientPermissions.public_message());
    }

    #[tokio::test]
    async fn test_allow_carries_resolved_set() {
        let (store, pipeline) = pipeline().await;
        store.upsert_role_assignment(RoleAssignment::new("u1", "employee", "admin")).await.unwrap();

        let decision = pipeline.decide(&ctx("u1"), &Protection::authenticated()).await.unwrap();
        let resolved = decision.permissions().unwrap();

        assert!(resolved.contains("orders:read"));
        assert_eq!(resolved.user_id, "u1");
    }
}
