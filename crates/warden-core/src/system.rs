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

//! Complete authorization system wiring
//!
//! `Warden` assembles the catalog, resolver, cache, audit log, manager, and decision
//! pipeline over one store and exposes them as a single facade. Embedders that need
//! finer control can wire the components by hand; this is the recommended default.

use crate::audit::AuditLog;
use crate::cache::{CacheStats, PermissionCache};
use crate::config::WardenConfig;
use crate::decision::{Decision, DecisionPipeline, Protection, RequestContext};
use crate::error::AuthzResult;
use crate::manager::AccessManager;
use crate::permissions::{PermissionCatalog, default_permissions};
use crate::resolver::{EffectivePermissions, PermissionResolver};
use crate::roles::default_roles;
use crate::store::{AuthzStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Health snapshot for monitoring
#[derive(Debug, Clone)]
pub struct WardenHealth {
    /// Cache counters
    pub cache: CacheStats,

    /// Number of registered permissions
    pub registered_permissions: usize,

    /// Number of defined roles
    pub role_count: usize,

    /// Entries currently held in the audit query window
    pub audit_window_entries: usize,

    /// When the snapshot was taken
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// The assembled authorization system
#[derive(Debug)]
pub struct Warden {
    config: WardenConfig,
    store: Arc<dyn AuthzStore>,
    catalog: Arc<PermissionCatalog>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditLog>,
    manager: Arc<AccessManager>,
    pipeline: DecisionPipeline,
}

impl Warden {
    /// Assemble the system over an existing store
    ///
    /// The store's catalog and roles are taken as-is; nothing is seeded.
    pub fn new(config: WardenConfig, store: Arc<dyn AuthzStore>, catalog: Arc<PermissionCatalog>) -> Self {
        let resolver = PermissionResolver::new(store.clone(), catalog.clone());
        let cache = Arc::new(PermissionCache::new(resolver, config.cache_ttl));
        let audit = Arc::new(AuditLog::new(store.clone(), config.audit_retention));
        let manager = Arc::new(AccessManager::new(store.clone(), catalog.clone(), cache.clone(), audit.clone()));

        let pipeline = DecisionPipeline::new(cache.clone(), config.admin_role.clone())
            .with_denial_logging(config.log_denials)
            .with_slow_threshold(config.slow_decision_threshold);

        info!(
            cache_ttl = ?config.cache_ttl,
            admin_role = %config.admin_role,
            "Authorization system initialized"
        );

        Self {
            config,
            store,
            catalog,
            cache,
            audit,
            manager,
            pipeline,
        }
    }

    /// Assemble the system over a fresh in-memory store seeded with the built-in
    /// permission catalog and system roles
    pub async fn with_defaults(config: WardenConfig) -> AuthzResult<Self> {
        let store: Arc<dyn AuthzStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(PermissionCatalog::new());

        for permission in default_permissions() {
            catalog.register(permission)?;
        }
        for role in default_roles(&config.admin_role) {
            store.insert_role(role).await?;
        }

        debug!(permissions = %catalog.len(), "Seeded default catalog and system roles");
        Ok(Self::new(config, store, catalog))
    }

    /// Evaluate an access decision
    pub async fn decide(&self, ctx: &RequestContext, protection: &Protection) -> AuthzResult<Decision> {
        self.pipeline.decide(ctx, protection).await
    }

    /// Resolve a user's effective permission set, via the cache
    pub async fn effective_permissions(&self, user_id: &str) -> AuthzResult<EffectivePermissions> {
        self.cache.get_or_resolve(user_id).await
    }

    /// The administrative mutation path
    pub fn manager(&self) -> &AccessManager {
        &self.manager
    }

    /// The decision pipeline
    pub fn pipeline(&self) -> &DecisionPipeline {
        &self.pipeline
    }

    /// The permission catalog
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// The audit log
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The permission cache
    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn AuthzStore> {
        &self.store
    }

    /// The active configuration
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Current health snapshot
    pub async fn health(&self) -> AuthzResult<WardenHealth> {
        Ok(WardenHealth {
            cache: self.cache.stats(),
            registered_permissions: self.catalog.len(),
            role_count: self.store.roles().await?.len(),
            audit_window_entries: self.audit.statistics().await.total_entries,
            checked_at: chrono::Utc::now(),
        })
    }

    /// Start background maintenance: periodic cache cleanup and a sweep that drops
    /// role assignments past their expiry
    ///
    /// Both tasks run until aborted; dropping the handles leaks the tasks, so keep
    /// them for shutdown.
    pub fn start_maintenance_tasks(&self, sweep_interval: Duration) -> Vec<JoinHandle<()>> {
        let cleanup = PermissionCache::start_cleanup_task(self.cache.clone(), self.config.cache_ttl);

        let store = self.store.clone();
        let cache = self.cache.clone();
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);

            loop {
                ticker.tick().await;

                match store.remove_expired_assignments().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        // Expired assignments already resolved as ineffective; the
                        // sweep is garbage collection, but cached sets may still
                        // name the swept roles in their closure.
                        cache.invalidate_all();
                        info!(removed = %removed, "Swept expired role assignments");
                    }
                    Err(err) => {
                        warn!(error = %err, "Expired-assignment sweep failed");
                    }
                }
            }
        });

        vec![cleanup, sweep]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::permissions::AccessLevel;

    #[tokio::test]
    async fn test_with_defaults_seeds_catalog_and_roles() {
        let warden = Warden::with_defaults(WardenConfig::default()).await.unwrap();

        assert!(warden.catalog().is_active("orders:write"));
        assert!(warden.store().role("admin").await.unwrap().is_some());
        assert!(warden.store().role("readonly").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_end_to_end_decision() {
        let warden = Warden::with_defaults(WardenConfig::default()).await.unwrap();
        warden.manager().assign_role("system", "u1", "operator", None).await.unwrap();

        let ctx = RequestContext::authenticated(Identity::new("u1"));

        let allowed = warden.decide(&ctx, &Protection::authenticated().require_level("orders", AccessLevel::Write)).await.unwrap();
        assert!(allowed.is_allowed());

        let denied = warden.decide(&ctx, &Protection::authenticated().require_permission("users:manage")).await.unwrap();
        assert!(!denied.is_allowed());
    }

    #[tokio::test]
    async fn test_health_snapshot() {
        let warden = Warden::with_defaults(WardenConfig::default()).await.unwrap();

        warden.effective_permissions("u1").await.unwrap();
        warden.manager().assign_role("system", "u1", "member", None).await.unwrap();

        let health = warden.health().await.unwrap();
        assert!(health.registered_permissions > 0);
        assert_eq!(health.role_count, 4);
        assert_eq!(health.audit_window_entries, 1);
        assert!(health.cache.misses >= 1);
    }

    #[tokio::test]
    async fn test_custom_admin_role_bypasses_ownership() {
        let config = WardenConfig {
            admin_role: "superuser".to_string(),
            ..WardenConfig::default()
        };

        let warden = Warden::with_defaults(config).await.unwrap();
        warden.manager().assign_role("system", "root", "superuser", None).await.unwrap();

        let ctx = RequestContext::authenticated(Identity::new("root"));
        let decision = warden.decide(&ctx, &Protection::authenticated().require_owner("someone_else")).await.unwrap();

        assert!(decision.is_allowed());
    }
}
