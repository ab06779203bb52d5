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

//! Permission definitions and the static permission catalog

use crate::error::{AuthzError, AuthzResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered access level for a resource
///
/// Level comparison only applies to the ordered actions; verb-style actions
/// (`export`, `schedule`, ...) are exact-match only and carry no level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    None,
    Read,
    Write,
    Manage,
}

impl AccessLevel {
    /// Map an action string to its level, if it is one of the ordered actions
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "read" => Some(AccessLevel::Read),
            "write" => Some(AccessLevel::Write),
            "manage" => Some(AccessLevel::Manage),
            _ => None,
        }
    }

    /// The action string for this level
    pub fn as_action(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Manage => "manage",
        }
    }
}

/// Permission definition: a `resource:action` capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    /// Resource category (e.g. "orders", "customers")
    pub resource: String,

    /// Action identifier (e.g. "read", "write", "manage", "export")
    pub action: String,

    /// Human-readable description
    pub description: String,

    /// Whether this permission is still grantable
    ///
    /// Deactivated permissions cease to be grantable and contribute nothing to
    /// resolution, but historical grants referencing them remain for audit fidelity.
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            description: String::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The `resource:action` key identifying this permission
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }

    /// The ordered level of this permission's action, if it has one
    pub fn level(&self) -> Option<AccessLevel> {
        AccessLevel::from_action(&self.action)
    }
}

/// Split a `resource:action` key into its parts
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (resource, action) = key.split_once(':')?;
    if resource.is_empty() || action.is_empty() { None } else { Some((resource, action)) }
}

/// Whether a permission key grants `resource` at or above `minimum`
///
/// Only ordered actions participate: `manage` implies `write` implies `read` for level
/// checks, while verb actions never satisfy a level requirement.
pub fn satisfies_level(key: &str, resource: &str, minimum: AccessLevel) -> bool {
    match split_key(key) {
        Some((res, action)) if res == resource => AccessLevel::from_action(action).map(|level| level >= minimum).unwrap_or(false),
        _ => false,
    }
}

/// Static registry of permission identifiers
///
/// Permissions are immutable once registered; the only lifecycle transition is
/// soft-deactivation.
#[derive(Debug, Default)]
pub struct PermissionCatalog {
    permissions: RwLock<HashMap<String, Permission>>,
}

impl PermissionCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            permissions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new permission
    pub fn register(&self, permission: Permission) -> AuthzResult<()> {
        let mut permissions = self.permissions.write();
        let key = permission.key();

        if permissions.contains_key(&key) {
            return Err(AuthzError::Conflict {
                message: format!("Permission '{}' already registered", key),
            });
        }

        permissions.insert(key, permission);
        Ok(())
    }

    /// Soft-deactivate a permission
    ///
    /// The permission stops being grantable and no longer contributes to resolution;
    /// historical grants referencing it are left untouched.
    pub fn deactivate(&self, key: &str) -> AuthzResult<()> {
        let mut permissions = self.permissions.write();

        match permissions.get_mut(key) {
            Some(permission) => {
                permission.active = false;
                Ok(())
            }
            None => Err(AuthzError::PermissionNotFound { permission: key.to_string() }),
        }
    }

    /// Get a permission by key
    pub fn get(&self, key: &str) -> Option<Permission> {
        self.permissions.read().get(key).cloned()
    }

    /// Whether a permission exists and is still active
    pub fn is_active(&self, key: &str) -> bool {
        self.permissions.read().get(key).map(|p| p.active).unwrap_or(false)
    }

    /// Whether a permission may currently be granted
    pub fn is_grantable(&self, key: &str) -> bool {
        self.is_active(key)
    }

    /// All registered permissions
    pub fn all(&self) -> Vec<Permission> {
        self.permissions.read().values().cloned().collect()
    }

    /// Number of registered permissions
    pub fn len(&self) -> usize {
        self.permissions.read().len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.permissions.read().is_empty()
    }
}

/// Built-in permission catalog seed
pub fn default_permissions() -> Vec<Permission> {
    let mut permissions = Vec::new();

    for resource in ["orders", "customers", "reports", "users", "roles"] {
        permissions.push(Permission::new(resource, "read").with_description(format!("Read access to {}", resource)));
        permissions.push(Permission::new(resource, "write").with_description(format!("Write access to {}", resource)));
        permissions.push(Permission::new(resource, "manage").with_description(format!("Full management of {}", resource)));
    }

    permissions.push(Permission::new("reports", "export").with_description("Export report data"));
    permissions.push(Permission::new("orders", "schedule").with_description("Schedule order fulfilment"));

    permissions
}
