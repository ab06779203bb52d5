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

//! Verified identity and the token verifier boundary
//!
//! Token cryptography lives outside this core. A verifier hands us a user id and the
//! token's expiry fact, nothing more; roles and permissions are always resolved against
//! stored state, never read out of token claims.

use crate::error::AuthzResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A verified user identity produced by the external token verifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// User ID (token subject)
    pub user_id: String,

    /// Expiry of the token that established this identity, if any
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Create an identity with no token expiry
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token_expires_at: None,
        }
    }

    /// Create an identity bounded by a token expiry
    pub fn with_expiry(user_id: impl Into<String>, token_expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            token_expires_at: Some(token_expires_at),
        }
    }

    /// Whether the token that established this identity has expired
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.token_expires_at { Utc::now() > expires_at } else { false }
    }
}

/// External token verifier boundary
///
/// Implemented outside this crate (JWT, opaque tokens, sessions). The core takes the
/// produced identity as a precondition and does not re-implement token cryptography.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a token and return the identity it carries
    async fn verify_token(&self, token: &str) -> AuthzResult<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_identity_without_expiry_never_expires() {
        let identity = Identity::new("user123");
        assert!(!identity.is_expired());
    }

    #[test]
    fn test_identity_expiry() {
        let live = Identity::with_expiry("user123", Utc::now() + Duration::hours(1));
        let stale = Identity::with_expiry("user123", Utc::now() - Duration::hours(1));

        assert!(!live.is_expired());
        assert!(stale.is_expired());
    }
}
