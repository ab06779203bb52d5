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

//! Permission resolution: the algorithmic heart of the authorization core
//!
//! Resolution is a pure read path. It fetches the user's active assignments, expands the
//! role set through the hierarchy, unions per-role contributions, and applies overrides
//! last as the final authority. Caching and invalidation live elsewhere; correctness must
//! hold identically with the cache disabled.

use crate::error::AuthzResult;
use crate::permissions::{AccessLevel, PermissionCatalog, satisfies_level};
use crate::roles::ancestor_closure;
use crate::store::AuthzStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A user's resolved authorization state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectivePermissions {
    /// User the set was computed for
    pub user_id: String,

    /// Granted permission keys
    pub permissions: BTreeSet<String>,

    /// Full role closure the set was derived from (directly held plus inherited)
    pub roles: BTreeSet<String>,

    /// When the set was computed
    pub computed_at: DateTime<Utc>,
}

impl EffectivePermissions {
    /// The empty set: deny-by-default
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions: BTreeSet::new(),
            roles: BTreeSet::new(),
            computed_at: Utc::now(),
        }
    }

    /// Whether a specific permission is held
    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Whether at least one of the given permissions is held
    pub fn contains_any<'a>(&self, permissions: impl IntoIterator<Item = &'a str>) -> bool {
        permissions.into_iter().any(|p| self.contains(p))
    }

    /// Whether every one of the given permissions is held
    pub fn contains_all<'a>(&self, permissions: impl IntoIterator<Item = &'a str>) -> bool {
        permissions.into_iter().all(|p| self.contains(p))
    }

    /// Whether the set grants `resource` at or above `minimum` (ordered actions only)
    pub fn satisfies_level(&self, resource: &str, minimum: AccessLevel) -> bool {
        self.permissions.iter().any(|p| satisfies_level(p, resource, minimum))
    }

    /// Whether the role closure contains a role
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.contains(role_id)
    }
}

/// Pure permission resolver
///
/// `(user roles, role→permission map, hierarchy, overrides) → effective permission set`.
/// Deterministic and side-effect-free; all blocking happens at the store boundary.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AuthzStore>,
    catalog: Arc<PermissionCatalog>,
}

impl PermissionResolver {
    /// Create a resolver over a store and catalog
    pub fn new(store: Arc<dyn AuthzStore>, catalog: Arc<PermissionCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Resolve a user's effective permission set
    pub async fn resolve(&self, user_id: &str) -> AuthzResult<EffectivePermissions> {
        let assignments = self.store.active_role_assignments(user_id).await?;

        // The store contract already excludes expired assignments; filter again so a
        // loose store implementation cannot resurrect a stale grant.
        let direct_roles: Vec<String> = assignments.iter().filter(|a| a.is_effective()).map(|a| a.role_id.clone()).collect();

        let mut permissions = BTreeSet::new();
        let mut roles = BTreeSet::new();

        if !direct_roles.is_empty() {
            let edges = self.store.hierarchy_edges().await?;
            roles = ancestor_closure(&direct_roles, &edges)?;

            for role_id in &roles {
                let grants = self.store.role_permissions(role_id).await?;

                // A role's own denial masks only that role's own grant of the
                // permission; other roles' contributions are unaffected.
                let denied: HashSet<&str> = grants.iter().filter(|g| !g.granted).map(|g| g.permission.as_str()).collect();

                for grant in grants.iter().filter(|g| g.granted) {
                    if denied.contains(grant.permission.as_str()) {
                        continue;
                    }
                    // Deactivated permissions contribute nothing.
                    if !self.catalog.is_active(&grant.permission) {
                        continue;
                    }
                    permissions.insert(grant.permission.clone());
                }
            }
        }

        // Overrides are the final authority, applied even for users with no roles.
        for ov in self.store.active_overrides(user_id).await? {
            if !ov.is_effective() {
                continue;
            }
            if ov.granted {
                permissions.insert(ov.permission.clone());
            } else {
                permissions.remove(&ov.permission);
            }
        }

        debug!(
            user_id = %user_id,
            role_count = %roles.len(),
            permission_count = %permissions.len(),
            "Permission set resolved"
        );

        Ok(EffectivePermissions {
            user_id: user_id.to_string(),
            permissions,
            roles,
            computed_at: Utc::now(),
        })
    }
}
