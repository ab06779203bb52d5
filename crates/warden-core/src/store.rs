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

//! Persistence boundary
//!
//! The authorization core treats storage as a small query interface, not a schema.
//! Enforcement happens once, in this core; any storage-level access policy is a coarse
//! backstop, never the primary decision point. `MemoryStore` is the reference
//! implementation and the default backing for tests and embedded use.

use crate::audit::AuditEntry;
use crate::error::{AuthzError, AuthzResult};
use crate::overrides::PermissionOverride;
use crate::roles::{HierarchyEdge, Role, RoleAssignment, RoleGrant, RoleGraph};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Storage interface consumed by the resolver and the administrative mutation path
#[async_trait]
pub trait AuthzStore: Send + Sync + fmt::Debug {
    /// Active (non-expired, non-deactivated) role assignments for a user
    async fn active_role_assignments(&self, user_id: &str) -> AuthzResult<Vec<RoleAssignment>>;

    /// Permission rows owned by a role; empty for unknown or inactive roles
    async fn role_permissions(&self, role_id: &str) -> AuthzResult<Vec<RoleGrant>>;

    /// All hierarchy edges
    async fn hierarchy_edges(&self) -> AuthzResult<Vec<HierarchyEdge>>;

    /// Non-expired overrides for a user
    async fn active_overrides(&self, user_id: &str) -> AuthzResult<Vec<PermissionOverride>>;

    /// Append an immutable audit entry
    async fn append_audit_entry(&self, entry: AuditEntry) -> AuthzResult<()>;

    /// Look up a role definition
    async fn role(&self, role_id: &str) -> AuthzResult<Option<Role>>;

    /// All role definitions
    async fn roles(&self) -> AuthzResult<Vec<Role>>;

    /// Insert a new role definition
    async fn insert_role(&self, role: Role) -> AuthzResult<()>;

    /// Insert a validated hierarchy edge
    async fn add_hierarchy_edge(&self, parent: &str, child: &str) -> AuthzResult<()>;

    /// Remove a role and its hierarchy edges; system roles cannot be removed
    async fn remove_role(&self, role_id: &str) -> AuthzResult<()>;

    /// The current assignment of a role to a user, effective or not
    async fn role_assignment(&self, user_id: &str, role_id: &str) -> AuthzResult<Option<RoleAssignment>>;

    /// Insert or replace a role assignment
    async fn upsert_role_assignment(&self, assignment: RoleAssignment) -> AuthzResult<()>;

    /// Deactivate a user's assignment of a role; returns the prior assignment if one
    /// was effective
    async fn deactivate_role_assignment(&self, user_id: &str, role_id: &str) -> AuthzResult<Option<RoleAssignment>>;

    /// The current override for a `(user, permission)` pair, effective or not
    async fn override_for(&self, user_id: &str, permission: &str) -> AuthzResult<Option<PermissionOverride>>;

    /// Insert or replace an override
    async fn upsert_override(&self, ov: PermissionOverride) -> AuthzResult<()>;

    /// Remove a user's override for a permission; returns the removed override if one
    /// was effective
    async fn remove_override(&self, user_id: &str, permission: &str) -> AuthzResult<Option<PermissionOverride>>;

    /// Drop assignments past their expiry; returns how many were removed
    async fn remove_expired_assignments(&self) -> AuthzResult<u64>;
}

/// In-memory reference store
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<RoleGraph>,
    assignments: RwLock<HashMap<String, Vec<RoleAssignment>>>,
    overrides: RwLock<HashMap<String, Vec<PermissionOverride>>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// All audit entries ever appended, oldest first
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl AuthzStore for MemoryStore {
    async fn active_role_assignments(&self, user_id: &str) -> AuthzResult<Vec<RoleAssignment>> {
        let assignments = self.assignments.read().await;

        Ok(assignments
            .get(user_id)
            .map(|list| list.iter().filter(|a| a.is_effective()).cloned().collect())
            .unwrap_or_default())
    }

    async fn role_permissions(&self, role_id: &str) -> AuthzResult<Vec<RoleGrant>> {
        let graph = self.graph.read().await;

        Ok(graph.role(role_id).filter(|role| role.active).map(|role| role.grants.clone()).unwrap_or_default())
    }

    async fn hierarchy_edges(&self) -> AuthzResult<Vec<HierarchyEdge>> {
        let graph = self.graph.read().await;
        Ok(graph.edges().to_vec())
    }

    async fn active_overrides(&self, user_id: &str) -> AuthzResult<Vec<PermissionOverride>> {
        let overrides = self.overrides.read().await;

        Ok(overrides
            .get(user_id)
            .map(|list| list.iter().filter(|o| o.is_effective()).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_audit_entry(&self, entry: AuditEntry) -> AuthzResult<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn role(&self, role_id: &str) -> AuthzResult<Option<Role>> {
        let graph = self.graph.read().await;
        Ok(graph.role(role_id).cloned())
    }

    async fn roles(&self) -> AuthzResult<Vec<Role>> {
        let graph = self.graph.read().await;
        Ok(graph.roles().cloned().collect())
    }

    async fn insert_role(&self, role: Role) -> AuthzResult<()> {
        let mut graph = self.graph.write().await;

        if graph.role(&role.id).is_some() {
            return Err(AuthzError::Conflict {
                message: format!("Role '{}' already exists", role.id),
            });
        }

        graph.insert_role(role);
        Ok(())
    }

    async fn add_hierarchy_edge(&self, parent: &str, child: &str) -> AuthzResult<()> {
        let mut graph = self.graph.write().await;
        graph.add_edge(parent, child)
    }

    async fn remove_role(&self, role_id: &str) -> AuthzResult<()> {
        let mut graph = self.graph.write().await;
        graph.remove_role(role_id)
    }

    async fn role_assignment(&self, user_id: &str, role_id: &str) -> AuthzResult<Option<RoleAssignment>> {
        let assignments = self.assignments.read().await;

        Ok(assignments.get(user_id).and_then(|list| list.iter().find(|a| a.role_id == role_id)).cloned())
    }

    async fn upsert_role_assignment(&self, assignment: RoleAssignment) -> AuthzResult<()> {
        let mut assignments = self.assignments.write().await;
        let list = assignments.entry(assignment.user_id.clone()).or_default();

        list.retain(|a| a.role_id != assignment.role_id);
        list.push(assignment);
        Ok(())
    }

    async fn deactivate_role_assignment(&self, user_id: &str, role_id: &str) -> AuthzResult<Option<RoleAssignment>> {
        let mut assignments = self.assignments.write().await;

        let Some(list) = assignments.get_mut(user_id) else {
            return Ok(None);
        };

        match list.iter_mut().find(|a| a.role_id == role_id && a.is_effective()) {
            Some(assignment) => {
                let prior = assignment.clone();
                assignment.active = false;
                Ok(Some(prior))
            }
            None => Ok(None),
        }
    }

    async fn override_for(&self, user_id: &str, permission: &str) -> AuthzResult<Option<PermissionOverride>> {
        let overrides = self.overrides.read().await;

        Ok(overrides.get(user_id).and_then(|list| list.iter().find(|o| o.permission == permission)).cloned())
    }

    async fn upsert_override(&self, ov: PermissionOverride) -> AuthzResult<()> {
        let mut overrides = self.overrides.write().await;
        let list = overrides.entry(ov.user_id.clone()).or_default();

        list.retain(|o| o.permission != ov.permission);
        list.push(ov);
        Ok(())
    }

    async fn remove_override(&self, user_id: &str, permission: &str) -> AuthzResult<Option<PermissionOverride>> {
        let mut overrides = self.overrides.write().await;

        let Some(list) = overrides.get_mut(user_id) else {
            return Ok(None);
        };

        let removed = list.iter().position(|o| o.permission == permission && o.is_effective()).map(|idx| list.remove(idx));

        Ok(removed)
    }

    async fn remove_expired_assignments(&self) -> AuthzResult<u64> {
        let mut assignments = self.assignments.write().await;
        let mut removed = 0;

        for list in assignments.values_mut() {
            let before = list.len();
            list.retain(|a| !a.is_expired());
            removed += (before - list.len()) as u64;
        }

        assignments.retain(|_, list| !list.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_active_assignments_exclude_expired() {
        let store = MemoryStore::new();

        store.upsert_role_assignment(RoleAssignment::new("user123", "employee", "admin")).await.unwrap();
        store
            .upsert_role_assignment(RoleAssignment::new("user123", "contractor", "admin").with_expiry(Utc::now() - Duration::hours(1)))
            .await
            .unwrap();

        let active = store.active_role_assignments("user123").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].role_id, "employee");
    }

    #[tokio::test]
    async fn test_role_permissions_empty_for_inactive_role() {
        let store = MemoryStore::new();

        let mut role = Role::new("employee", "Employee", 20).grant("orders:read");
        role.active = false;
        store.insert_role(role).await.unwrap();

        let grants = store.role_permissions("employee").await.unwrap();
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_role_rejected() {
        let store = MemoryStore::new();

        store.insert_role(Role::new("employee", "Employee", 20)).await.unwrap();
        let result = store.insert_role(Role::new("employee", "Employee", 20)).await;

        assert!(matches!(result, Err(AuthzError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_deactivate_assignment_keeps_row() {
        let store = MemoryStore::new();
        store.upsert_role_assignment(RoleAssignment::new("user123", "employee", "admin")).await.unwrap();

        let prior = store.deactivate_role_assignment("user123", "employee").await.unwrap();
        assert!(prior.is_some());

        // Row still present, no longer effective.
        let row = store.role_assignment("user123", "employee").await.unwrap().unwrap();
        assert!(!row.active);
        assert!(store.active_role_assignments("user123").await.unwrap().is_empty());

        // Second deactivation is a no-op.
        assert!(store.deactivate_role_assignment("user123", "employee").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_override_upsert_replaces() {
        let store = MemoryStore::new();

        store.upsert_override(PermissionOverride::new("user123", "orders:write", true, "admin")).await.unwrap();
        store.upsert_override(PermissionOverride::new("user123", "orders:write", false, "admin")).await.unwrap();

        let active = store.active_overrides("user123").await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(!active[0].granted);
    }

    #[tokio::test]
    async fn test_remove_expired_assignments() {
        let store = MemoryStore::new();

        store
            .upsert_role_assignment(RoleAssignment::new("user123", "contractor", "admin").with_expiry(Utc::now() - Duration::hours(1)))
            .await
            .unwrap();
        store.upsert_role_assignment(RoleAssignment::new("user123", "employee", "admin")).await.unwrap();

        let removed = store.remove_expired_assignments().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.role_assignment("user123", "employee").await.unwrap().is_some());
        assert!(store.role_assignment("user123", "contractor").await.unwrap().is_none());
    }
}
