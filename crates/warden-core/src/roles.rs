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

//! Role definitions, assignments, and the role hierarchy graph

use crate::error::{AuthzError, AuthzResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A `(permission, granted)` row owned by a role
///
/// `granted = false` is an explicit denial. A denial only masks the owning role's own
/// grant of that permission; it does not veto grants contributed by other roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleGrant {
    /// Permission key (`resource:action`)
    pub permission: String,

    /// Whether the permission is granted or explicitly denied
    pub granted: bool,
}

impl RoleGrant {
    /// Create a grant row
    pub fn grant(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            granted: true,
        }
    }

    /// Create an explicit-denial row
    pub fn deny(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            granted: false,
        }
    }
}

/// Role definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Unique role identifier
    pub id: String,

    /// Human-readable role name
    pub name: String,

    /// Role description
    pub description: String,

    /// Authority level, lower is more authoritative; display and ordering only,
    /// never consulted during resolution
    pub level: u8,

    /// Permission rows owned by this role
    pub grants: Vec<RoleGrant>,

    /// Whether this is a system-defined role (cannot be deleted or modified)
    pub is_system_role: bool,

    /// Whether this role is active
    pub active: bool,

    /// Role creation timestamp
    pub created_at: DateTime<Utc>,

    /// Role last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: u8) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            level,
            grants: Vec::new(),
            is_system_role: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a system role
    pub fn system_role(id: impl Into<String>, name: impl Into<String>, level: u8) -> Self {
        let mut role = Self::new(id, name, level);
        role.is_system_role = true;
        role
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a grant row
    pub fn grant(mut self, permission: impl Into<String>) -> Self {
        self.add_row(RoleGrant::grant(permission));
        self
    }

    /// Add an explicit-denial row
    pub fn deny(mut self, permission: impl Into<String>) -> Self {
        self.add_row(RoleGrant::deny(permission));
        self
    }

    fn add_row(&mut self, row: RoleGrant) {
        // Last write wins for a repeated permission key.
        self.grants.retain(|g| g.permission != row.permission);
        self.grants.push(row);
        self.updated_at = Utc::now();
    }
}

/// Directed hierarchy edge: the child inherits the parent's granted permissions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HierarchyEdge {
    /// Higher-authority role
    pub parent: String,

    /// Role that inherits the parent's grants
    pub child: String,
}

/// User role assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleAssignment {
    /// User ID
    pub user_id: String,

    /// Role ID
    pub role_id: String,

    /// Assignment timestamp
    pub assigned_at: DateTime<Utc>,

    /// Assignment expiration (optional)
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the assignment is active
    pub active: bool,

    /// Who assigned this role
    pub assigned_by: String,
}

impl RoleAssignment {
    /// Create a new active assignment
    pub fn new(user_id: impl Into<String>, role_id: impl Into<String>, assigned_by: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
            assigned_at: Utc::now(),
            expires_at: None,
            active: true,
            assigned_by: assigned_by.into(),
        }
    }

    /// Bound the assignment by an expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the assignment is past its expiry
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at { Utc::now() > expires_at } else { false }
    }

    /// Whether the assignment currently contributes to resolution
    ///
    /// An assignment past its expiry is treated as inactive without needing deletion.
    pub fn is_effective(&self) -> bool {
        self.active && !self.is_expired()
    }
}

/// Whether `to` is reachable from `from` by following parent→child edges
pub fn reaches(edges: &[HierarchyEdge], from: &str, to: &str) -> bool {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        children.entry(edge.parent.as_str()).or_default().push(edge.child.as_str());
    }

    let mut stack = vec![from];
    let mut visited = HashSet::new();

    while let Some(role) = stack.pop() {
        if role == to {
            return true;
        }
        if !visited.insert(role) {
            continue;
        }
        if let Some(next) = children.get(role) {
            stack.extend(next.iter().copied());
        }
    }

    false
}

/// Expand directly-held roles to their full ancestor closure
///
/// The child inherits the parent's grants, so expansion walks child→parent. The closure
/// includes the starting roles. Cycles must be impossible here because edge insertion
/// validates the DAG; encountering one anyway is a data-integrity fault and fails the
/// request instead of looping.
pub fn ancestor_closure(start: &[String], edges: &[HierarchyEdge]) -> AuthzResult<BTreeSet<String>> {
    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        parents.entry(edge.child.as_str()).or_default().push(edge.parent.as_str());
    }

    let mut closure = BTreeSet::new();
    let mut on_path = HashSet::new();

    for role in start {
        visit(role, &parents, &mut on_path, &mut closure)?;
    }

    Ok(closure)
}

fn visit(role: &str, parents: &HashMap<&str, Vec<&str>>, on_path: &mut HashSet<String>, closure: &mut BTreeSet<String>) -> AuthzResult<()> {
    if closure.contains(role) {
        return Ok(());
    }

    if !on_path.insert(role.to_string()) {
        return Err(AuthzError::Integrity {
            message: format!("Cycle detected in role hierarchy at role '{}'", role),
        });
    }

    if let Some(next) = parents.get(role) {
        for parent in next {
            visit(parent, parents, on_path, closure)?;
        }
    }

    on_path.remove(role);
    closure.insert(role.to_string());
    Ok(())
}

/// Role hierarchy graph with DAG enforcement
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<String, Role>,
    edges: Vec<HierarchyEdge>,
}

impl RoleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role
    pub fn insert_role(&mut self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    /// Get a role by ID
    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.get(role_id)
    }

    /// All roles
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// All hierarchy edges
    pub fn edges(&self) -> &[HierarchyEdge] {
        &self.edges
    }

    /// Remove a role; system roles cannot be removed
    pub fn remove_role(&mut self, role_id: &str) -> AuthzResult<()> {
        match self.roles.get(role_id) {
            Some(role) if role.is_system_role => Err(AuthzError::Forbidden {
                message: format!("Cannot remove system role '{}'", role_id),
            }),
            Some(_) => {
                self.roles.remove(role_id);
                self.edges.retain(|e| e.parent != role_id && e.child != role_id);
                Ok(())
            }
            None => Err(AuthzError::RoleNotFound { role_id: role_id.to_string() }),
        }
    }

    /// Add a hierarchy edge, rejecting unknown roles and cycles
    ///
    /// The edge `parent → child` closes a loop exactly when `parent` is already
    /// reachable from `child`, so that reachability is checked before insertion.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> AuthzResult<()> {
        if !self.roles.contains_key(parent) {
            return Err(AuthzError::RoleNotFound { role_id: parent.to_string() });
        }
        if !self.roles.contains_key(child) {
            return Err(AuthzError::RoleNotFound { role_id: child.to_string() });
        }

        if parent == child || reaches(&self.edges, child, parent) {
            return Err(AuthzError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let edge = HierarchyEdge {
            parent: parent.to_string(),
            child: child.to_string(),
        };

        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }

        Ok(())
    }
}

/// Built-in system roles
pub fn default_roles(admin_role: &str) -> Vec<Role> {
    vec![
        Role::system_role(admin_role, "Administrator", 0)
            .with_description("Full administrative authority")
            .grant("orders:manage")
            .grant("customers:manage")
            .grant("reports:manage")
            .grant("reports:export")
            .grant("users:manage")
            .grant("roles:manage"),
        Role::system_role("operator", "Operator", 10)
            .with_description("Day-to-day operational access")
            .grant("orders:write")
            .grant("orders:schedule")
            .grant("customers:write")
            .grant("reports:read")
            .grant("reports:export"),
        Role::system_role("member", "Member", 20)
            .with_description("Standard member access")
            .grant("orders:read")
            .grant("customers:read"),
        Role::system_role("readonly", "Read Only", 30)
            .with_description("Read-only access to business resources")
            .grant("orders:read")
            .grant("customers:read")
            .grant("reports:read"),
    ]
}
