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

//! Configuration for the authorization core

use std::env;
use std::time::Duration;

/// Configuration for the Warden authorization system
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Time-to-live for cached permission sets
    pub cache_ttl: Duration,

    /// Role whose holders bypass ownership checks
    pub admin_role: String,

    /// Emit telemetry log lines for denied access decisions
    pub log_denials: bool,

    /// Number of audit entries retained in the in-memory query window
    pub audit_retention: usize,

    /// Decisions slower than this are logged as warnings
    pub slow_decision_threshold: Duration,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            admin_role: "admin".to_string(),
            log_denials: true,
            audit_retention: 10_000,
            slow_decision_threshold: Duration::from_millis(5),
        }
    }
}

impl WardenConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_ttl: env::var("WARDEN_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),

            admin_role: env::var("WARDEN_ADMIN_ROLE").unwrap_or(defaults.admin_role),

            log_denials: env::var("WARDEN_LOG_DENIALS").map(|v| v.parse().unwrap_or(true)).unwrap_or(defaults.log_denials),

            audit_retention: env::var("WARDEN_AUDIT_RETENTION").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.audit_retention),

            slow_decision_threshold: env::var("WARDEN_SLOW_DECISION_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.slow_decision_threshold),
        }
    }
}
