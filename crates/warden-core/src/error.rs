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

//! Error taxonomy for the authorization core

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Authorization error types
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Authentication required: no verified identity present")]
    AuthenticationRequired,

    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions { message: String },

    #[error("Resource not owned: {message}")]
    ResourceNotOwned { message: String },

    #[error("Role not found: {role_id}")]
    RoleNotFound { role_id: String },

    #[error("Permission not found: {permission}")]
    PermissionNotFound { permission: String },

    #[error("Cycle detected: edge {parent} -> {child} would create a cycle in the role hierarchy")]
    CycleDetected { parent: String, child: String },

    #[error("Invalid expiry: {expires_at} is in the past")]
    InvalidExpiry { expires_at: DateTime<Utc> },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Integrity error: {message}")]
    Integrity { message: String },

    #[error("Store error: {message}")]
    Store { message: String },
}

impl AuthzError {
    /// Whether this error is an expected request-level denial rather than a system fault.
    ///
    /// Denials terminate the current authorization decision but are routine; callers map
    /// them to a transport response and move on.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthzError::AuthenticationRequired | AuthzError::InsufficientPermissions { .. } | AuthzError::ResourceNotOwned { .. }
        )
    }

    /// Whether this error indicates a broken invariant that should trigger operational alerting.
    ///
    /// Read-side cycle detection means write-side hierarchy validation failed; this is a bug,
    /// never a normal denial, and must not be silently swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthzError::Integrity { .. })
    }

    /// Stable machine-readable identifier for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::AuthenticationRequired => "authentication_required",
            AuthzError::InsufficientPermissions { .. } => "insufficient_permissions",
            AuthzError::ResourceNotOwned { .. } => "resource_not_owned",
            AuthzError::RoleNotFound { .. } => "role_not_found",
            AuthzError::PermissionNotFound { .. } => "permission_not_found",
            AuthzError::CycleDetected { .. } => "cycle_detected",
            AuthzError::InvalidExpiry { .. } => "invalid_expiry",
            AuthzError::Conflict { .. } => "conflict",
            AuthzError::Forbidden { .. } => "forbidden",
            AuthzError::Integrity { .. } => "integrity_error",
            AuthzError::Store { .. } => "store_error",
        }
    }

    /// Coarse message safe to surface to an end user.
    ///
    /// Full detail stays in operator logs; denials must not let an unauthorized caller
    /// enumerate the permission model (e.g. distinguish a missing role from a denied one).
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthzError::AuthenticationRequired => "authentication required",
            AuthzError::InsufficientPermissions { .. }
            | AuthzError::ResourceNotOwned { .. }
            | AuthzError::RoleNotFound { .. }
            | AuthzError::PermissionNotFound { .. }
            | AuthzError::Forbidden { .. } => "access denied",
            AuthzError::CycleDetected { .. } | AuthzError::InvalidExpiry { .. } | AuthzError::Conflict { .. } => "invalid request",
            AuthzError::Integrity { .. } | AuthzError::Store { .. } => "internal error",
        }
    }
}

/// Result type for authorization operations
pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_classification() {
        assert!(AuthzError::AuthenticationRequired.is_denial());
        assert!(
            AuthzError::InsufficientPermissions {
                message: "missing orders:write".to_string()
            }
            .is_denial()
        );
        assert!(!AuthzError::RoleNotFound { role_id: "ghost".to_string() }.is_denial());
    }

    #[test]
    fn test_integrity_is_fatal() {
        let err = AuthzError::Integrity {
            message: "cycle at role employee".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_denial());
    }

    #[test]
    fn test_public_message_does_not_leak_detail() {
        let missing_role = AuthzError::RoleNotFound { role_id: "sales_manager".to_string() };
        let denied = AuthzError::InsufficientPermissions {
            message: "missing orders:write".to_string(),
        };

        // An end user cannot tell a missing role apart from a plain denial.
        assert_eq!(missing_role.public_message(), denied.public_message());
        assert!(!missing_role.public_message().contains("sales_manager"));
    }
}
