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

//! Per-user permission overrides
//!
//! An override is an exception layered on top of role-derived permissions for exactly
//! one user. Overrides are applied last during resolution and always win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user permission override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionOverride {
    /// User the override applies to
    pub user_id: String,

    /// Permission key (`resource:action`)
    pub permission: String,

    /// Whether the permission is granted or denied, superseding role-derived state
    pub granted: bool,

    /// Override expiration (optional)
    pub expires_at: Option<DateTime<Utc>>,

    /// Free-text reason recorded at creation
    pub reason: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Who created the override
    pub created_by: String,
}

impl PermissionOverride {
    /// Create a new override
    pub fn new(user_id: impl Into<String>, permission: impl Into<String>, granted: bool, created_by: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permission: permission.into(),
            granted,
            expires_at: None,
            reason: String::new(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// Bound the override by an expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Record the reason for the override
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Whether the override is past its expiry
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at { Utc::now() > expires_at } else { false }
    }

    /// Whether the override currently participates in resolution
    pub fn is_effective(&self) -> bool {
        !self.is_expired()
    }
}
