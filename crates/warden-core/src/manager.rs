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

//! Administrative mutation path
//!
//! Every change to a user's authorization state goes through here, in a fixed order:
//! validate, commit to the store, audit, invalidate the cache. Mutations for the same
//! user serialize on a per-user lock so the audit log and cache can never observe a
//! half-applied change; mutations for different users proceed in parallel.

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::cache::PermissionCache;
use crate::error::{AuthzError, AuthzResult};
use crate::overrides::PermissionOverride;
use crate::permissions::PermissionCatalog;
use crate::roles::{Role, RoleAssignment};
use crate::store::AuthzStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Administrative access manager
///
/// Owns the write path: role assignment and revocation, per-user overrides, role
/// definitions, and the hierarchy. The read path (resolver, cache, pipeline) never
/// mutates anything.
#[derive(Debug)]
pub struct AccessManager {
    store: Arc<dyn AuthzStore>,
    catalog: Arc<PermissionCatalog>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditLog>,

    /// Serializes mutations per target user
    user_locks: DashMap<String, Arc<Mutex<()>>>,

    /// Serializes role-definition and hierarchy mutations
    graph_lock: Mutex<()>,
}

impl AccessManager {
    /// Create a manager over the shared store, catalog, cache, and audit log
    pub fn new(store: Arc<dyn AuthzStore>, catalog: Arc<PermissionCatalog>, cache: Arc<PermissionCache>, audit: Arc<AuditLog>) -> Self {
        Self {
            store,
            catalog,
            cache,
            audit,
            user_locks: DashMap::new(),
            graph_lock: Mutex::new(()),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn validate_expiry(expires_at: Option<DateTime<Utc>>) -> AuthzResult<()> {
        match expires_at {
            Some(expires_at) if expires_at <= Utc::now() => Err(AuthzError::InvalidExpiry { expires_at }),
            _ => Ok(()),
        }
    }

    /// Assign a role to a user
    ///
    /// Idempotent: assigning an already-effective role with the same expiry changes
    /// nothing and writes no audit entry. A past expiry is rejected up front rather
    /// than silently creating a dead assignment.
    pub async fn assign_role(&self, actor: &str, user_id: &str, role_id: &str, expires_at: Option<DateTime<Utc>>) -> AuthzResult<()> {
        Self::validate_expiry(expires_at)?;

        let role = self.store.role(role_id).await?.ok_or_else(|| AuthzError::RoleNotFound { role_id: role_id.to_string() })?;
        if !role.active {
            return Err(AuthzError::RoleNotFound { role_id: role_id.to_string() });
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.role_assignment(user_id, role_id).await? {
            if existing.is_effective() && existing.expires_at == expires_at {
                return Ok(());
            }
        }

        let mut assignment = RoleAssignment::new(user_id, role_id, actor);
        if let Some(expires_at) = expires_at {
            assignment = assignment.with_expiry(expires_at);
        }

        self.store.upsert_role_assignment(assignment.clone()).await?;

        self.audit
            .record(
                AuditEntry::new(AuditAction::AssignRole, actor, user_id)
                    .with_role(role_id)
                    .with_new_value(serde_json::to_value(&assignment).unwrap_or_default()),
            )
            .await?;

        self.cache.invalidate(user_id);

        info!(actor = %actor, user_id = %user_id, role_id = %role_id, expires_at = ?expires_at, "Role assigned");
        Ok(())
    }

    /// Revoke a user's role
    ///
    /// Fails if the user holds no effective assignment of the role.
    pub async fn revoke_role(&self, actor: &str, user_id: &str, role_id: &str) -> AuthzResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(prior) = self.store.deactivate_role_assignment(user_id, role_id).await? else {
            return Err(AuthzError::RoleNotFound { role_id: role_id.to_string() });
        };

        self.audit
            .record(
                AuditEntry::new(AuditAction::RevokeRole, actor, user_id)
                    .with_role(role_id)
                    .with_old_value(serde_json::to_value(&prior).unwrap_or_default()),
            )
            .await?;

        self.cache.invalidate(user_id);

        info!(actor = %actor, user_id = %user_id, role_id = %role_id, "Role revoked");
        Ok(())
    }

    /// Grant or deny a permission for one user, superseding role-derived state
    pub async fn grant_override(
        &self,
        actor: &str,
        user_id: &str,
        permission: &str,
        granted: bool,
        expires_at: Option<DateTime<Utc>>,
        reason: &str,
    ) -> AuthzResult<()> {
        Self::validate_expiry(expires_at)?;

        if !self.catalog.is_grantable(permission) {
            return Err(AuthzError::PermissionNotFound {
                permission: permission.to_string(),
            });
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let prior = self.store.override_for(user_id, permission).await?;

        let mut ov = PermissionOverride::new(user_id, permission, granted, actor).with_reason(reason);
        if let Some(expires_at) = expires_at {
            ov = ov.with_expiry(expires_at);
        }

        self.store.upsert_override(ov.clone()).await?;

        let mut entry = AuditEntry::new(AuditAction::GrantOverride, actor, user_id)
            .with_permission(permission)
            .with_new_value(serde_json::to_value(&ov).unwrap_or_default());
        if let Some(prior) = prior {
            entry = entry.with_old_value(serde_json::to_value(&prior).unwrap_or_default());
        }
        self.audit.record(entry).await?;

        self.cache.invalidate(user_id);

        info!(actor = %actor, user_id = %user_id, permission = %permission, granted = %granted, "Override applied");
        Ok(())
    }

    /// Remove a user's override for a permission
    ///
    /// Fails if no effective override for the pair exists.
    pub async fn revoke_override(&self, actor: &str, user_id: &str, permission: &str) -> AuthzResult<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let Some(removed) = self.store.remove_override(user_id, permission).await? else {
            return Err(AuthzError::PermissionNotFound {
                permission: permission.to_string(),
            });
        };

        self.audit
            .record(
                AuditEntry::new(AuditAction::RevokeOverride, actor, user_id)
                    .with_permission(permission)
                    .with_old_value(serde_json::to_value(&removed).unwrap_or_default()),
            )
            .await?;

        self.cache.invalidate(user_id);

        info!(actor = %actor, user_id = %user_id, permission = %permission, "Override removed");
        Ok(())
    }

    /// Create a new role definition
    ///
    /// Every grant row must reference a registered, grantable permission. Role creation
    /// is not one of the audited mutation kinds; it changes no user's effective state
    /// until the role is assigned.
    pub async fn create_role(&self, actor: &str, role: Role) -> AuthzResult<()> {
        for grant in &role.grants {
            if !self.catalog.is_grantable(&grant.permission) {
                return Err(AuthzError::PermissionNotFound {
                    permission: grant.permission.clone(),
                });
            }
        }

        let _guard = self.graph_lock.lock().await;
        self.store.insert_role(role.clone()).await?;

        info!(actor = %actor, role_id = %role.id, grants = %role.grants.len(), "Role created");
        Ok(())
    }

    /// Remove a role definition and its hierarchy edges
    ///
    /// System roles are protected. Users still assigned the role lose its grants on
    /// their next resolution.
    pub async fn remove_role(&self, actor: &str, role_id: &str) -> AuthzResult<()> {
        let _guard = self.graph_lock.lock().await;
        self.store.remove_role(role_id).await?;

        self.cache.invalidate_all();

        warn!(actor = %actor, role_id = %role_id, "Role removed");
        Ok(())
    }

    /// Add a `parent → child` inheritance edge
    ///
    /// The store validates both roles and rejects any edge that would close a cycle.
    /// The affected-user set is unbounded, so the whole cache is invalidated.
    pub async fn add_hierarchy_edge(&self, actor: &str, parent: &str, child: &str) -> AuthzResult<()> {
        let _guard = self.graph_lock.lock().await;
        self.store.add_hierarchy_edge(parent, child).await?;

        self.cache.invalidate_all();

        info!(actor = %actor, parent = %parent, child = %child, "Hierarchy edge added");
        Ok(())
    }

    /// Soft-deactivate a permission across the whole system
    pub async fn deactivate_permission(&self, actor: &str, permission: &str) -> AuthzResult<()> {
        self.catalog.deactivate(permission)?;

        self.cache.invalidate_all();

        warn!(actor = %actor, permission = %permission, "Permission deactivated");
        Ok(())
    }

    /// The audit log behind this manager
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::default_permissions;
    use crate::resolver::PermissionResolver;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    async fn manager() -> (Arc<MemoryStore>, AccessManager) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(PermissionCatalog::new());

        for permission in default_permissions() {
            catalog.register(permission).unwrap();
        }

        store.insert_role(Role::new("employee", "Employee", 20).grant("orders:read")).await.unwrap();
        store.insert_role(Role::new("sales_manager", "Sales Manager", 10).grant("orders:write")).await.unwrap();
        store.insert_role(Role::system_role("admin", "Administrator", 0).grant("users:manage")).await.unwrap();

        let resolver = PermissionResolver::new(store.clone(), catalog.clone());
        let cache = Arc::new(PermissionCache::new(resolver, StdDuration::from_secs(60)));
        let audit = Arc::new(AuditLog::new(store.clone(), 1000));

        (store.clone(), AccessManager::new(store, catalog, cache, audit))
    }

    #[tokio::test]
    async fn test_assign_role_records_audit_and_invalidates() {
        let (store, manager) = manager().await;

        manager.cache.get_or_resolve("u1").await.unwrap();
        manager.assign_role("admin", "u1", "employee", None).await.unwrap();

        let resolved = manager.cache.get_or_resolve("u1").await.unwrap();
        assert!(resolved.contains("orders:read"));

        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::AssignRole);
        assert_eq!(audit[0].role_id.as_deref(), Some("employee"));
        assert!(audit[0].new_value.is_some());
    }

    #[tokio::test]
    async fn test_assign_role_idempotent() {
        let (store, manager) = manager().await;

        manager.assign_role("admin", "u1", "employee", None).await.unwrap();
        manager.assign_role("admin", "u1", "employee", None).await.unwrap();

        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_assign_unknown_role_rejected() {
        let (_store, manager) = manager().await;

        let result = manager.assign_role("admin", "u1", "ghost", None).await;
        assert!(matches!(result, Err(AuthzError::RoleNotFound { .. })));
    }

    #[tokio::test]
    async fn test_assign_with_past_expiry_rejected() {
        let (store, manager) = manager().await;

        let result = manager.assign_role("admin", "u1", "employee", Some(Utc::now() - Duration::hours(1))).await;
        assert!(matches!(result, Err(AuthzError::InvalidExpiry { .. })));
        assert!(store.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_role_takes_effect_immediately() {
        let (store, manager) = manager().await;

        manager.assign_role("admin", "u1", "employee", None).await.unwrap();
        assert!(manager.cache.get_or_resolve("u1").await.unwrap().contains("orders:read"));

        manager.revoke_role("admin", "u1", "employee").await.unwrap();
        assert!(!manager.cache.get_or_resolve("u1").await.unwrap().contains("orders:read"));

        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].action, AuditAction::RevokeRole);
        assert!(audit[1].old_value.is_some());
    }

    #[tokio::test]
    async fn test_revoke_unassigned_role_rejected() {
        let (store, manager) = manager().await;

        let result = manager.revoke_role("admin", "u1", "employee").await;
        assert!(matches!(result, Err(AuthzError::RoleNotFound { .. })));
        assert!(store.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_missing_override_rejected() {
        let (_store, manager) = manager().await;

        let result = manager.revoke_override("admin", "u1", "orders:read").await;
        assert!(matches!(result, Err(AuthzError::PermissionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_override_lifecycle() {
        let (store, manager) = manager().await;
        manager.assign_role("admin", "u1", "employee", None).await.unwrap();

        manager.grant_override("admin", "u1", "orders:read", false, None, "incident lockdown").await.unwrap();
        assert!(!manager.cache.get_or_resolve("u1").await.unwrap().contains("orders:read"));

        manager.revoke_override("admin", "u1", "orders:read").await.unwrap();
        assert!(manager.cache.get_or_resolve("u1").await.unwrap().contains("orders:read"));

        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[1].action, AuditAction::GrantOverride);
        assert_eq!(audit[2].action, AuditAction::RevokeOverride);
        assert_eq!(audit[2].permission.as_deref(), Some("orders:read"));
    }

    #[tokio::test]
    async fn test_override_requires_grantable_permission() {
        let (_store, manager) = manager().await;

        let unknown = manager.grant_override("admin", "u1", "widgets:frobnicate", true, None, "").await;
        assert!(matches!(unknown, Err(AuthzError::PermissionNotFound { .. })));

        manager.deactivate_permission("admin", "orders:read").await.unwrap();
        let deactivated = manager.grant_override("admin", "u1", "orders:read", true, None, "").await;
        assert!(matches!(deactivated, Err(AuthzError::PermissionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_role_validates_grants() {
        let (_store, manager) = manager().await;

        let bad = manager.create_role("admin", Role::new("support", "Support", 25).grant("widgets:frobnicate")).await;
        assert!(matches!(bad, Err(AuthzError::PermissionNotFound { .. })));

        manager
            .create_role("admin", Role::new("support", "Support", 25).grant("customers:read"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_system_role_forbidden() {
        let (_store, manager) = manager().await;

        let result = manager.remove_role("admin", "admin").await;
        assert!(matches!(result, Err(AuthzError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_hierarchy_edge_invalidates_everyone() {
        let (_store, manager) = manager().await;
        manager.assign_role("admin", "u1", "employee", None).await.unwrap();

        let before = manager.cache.get_or_resolve("u1").await.unwrap();
        assert!(!before.contains("orders:write"));

        // employee inherits sales_manager's grants through the new edge.
        manager.add_hierarchy_edge("admin", "sales_manager", "employee").await.unwrap();

        let after = manager.cache.get_or_resolve("u1").await.unwrap();
        assert!(after.contains("orders:write"));
    }

    #[tokio::test]
    async fn test_cycle_edge_rejected() {
        let (_store, manager) = manager().await;

        manager.add_hierarchy_edge("admin", "sales_manager", "employee").await.unwrap();
        let result = manager.add_hierarchy_edge("admin", "employee", "sales_manager").await;

        assert!(matches!(result, Err(AuthzError::CycleDetected { .. })));
    }
}
