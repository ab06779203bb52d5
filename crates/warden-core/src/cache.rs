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

//! Time-bounded memoization of resolved permission sets
//!
//! The cache is an optimization only; correctness holds identically with pure resolver
//! calls. Concurrent lookups for the same uncached user collapse into one in-flight
//! resolution (single-flight). Invalidation bumps a per-user monotonic version so a
//! resolution that raced the mutation cannot install its stale result.

use crate::error::AuthzResult;
use crate::resolver::{EffectivePermissions, PermissionResolver};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: EffectivePermissions,
    version: u64,
    epoch: u64,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache counters for monitoring
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,

    /// Total cache misses
    pub misses: u64,

    /// Total evictions (expiry or invalidation)
    pub evictions: u64,

    /// Current number of cached users
    pub current_size: usize,
}

impl CacheStats {
    /// Hit ratio over all lookups
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 { 0.0 } else { self.hits as f64 / (self.hits + self.misses) as f64 }
    }
}

/// Per-user permission cache with single-flight resolution
#[derive(Debug)]
pub struct PermissionCache {
    resolver: PermissionResolver,
    ttl: Duration,

    entries: DashMap<String, CacheEntry>,
    versions: DashMap<String, u64>,
    flights: DashMap<String, Arc<Mutex<()>>>,

    /// Bumped by hierarchy-wide or catalog-wide mutations, which invalidate every user
    epoch: AtomicU64,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PermissionCache {
    /// Create a cache over a resolver with a fixed TTL
    pub fn new(resolver: PermissionResolver, ttl: Duration) -> Self {
        Self {
            resolver,
            ttl,
            entries: DashMap::new(),
            versions: DashMap::new(),
            flights: DashMap::new(),
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached set for a user, resolving on miss
    ///
    /// The first caller for an uncached user computes; concurrent callers for the same
    /// user wait on the in-flight computation instead of issuing redundant store reads.
    /// Different users proceed in parallel without contention.
    pub async fn get_or_resolve(&self, user_id: &str) -> AuthzResult<EffectivePermissions> {
        if let Some(value) = self.lookup(user_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(user_id = %user_id, "Permission cache hit");
            return Ok(value);
        }

        let flight = self.flights.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = flight.lock().await;

        // A concurrent caller may have populated the entry while we waited.
        if let Some(value) = self.lookup(user_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(user_id = %user_id, "Permission cache hit after flight wait");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let version = self.version(user_id);
        let epoch = self.epoch.load(Ordering::Acquire);

        let value = self.resolver.resolve(user_id).await?;

        // Install only if no invalidation raced the resolution; the result is still
        // returned to the caller either way.
        if self.version(user_id) == version && self.epoch.load(Ordering::Acquire) == epoch {
            self.entries.insert(
                user_id.to_string(),
                CacheEntry {
                    value: value.clone(),
                    version,
                    epoch,
                    expires_at: Instant::now() + self.ttl,
                },
            );
            debug!(user_id = %user_id, ttl = ?self.ttl, "Permission set cached");
        } else {
            debug!(user_id = %user_id, "Skipped caching: invalidated during resolution");
        }

        drop(_guard);
        self.flights.remove_if(user_id, |_, lock| Arc::strong_count(lock) <= 1);

        Ok(value)
    }

    fn lookup(&self, user_id: &str) -> Option<EffectivePermissions> {
        let entry = self.entries.get(user_id)?;

        let stale = entry.is_expired() || entry.version != self.version(user_id) || entry.epoch != self.epoch.load(Ordering::Acquire);

        if stale {
            drop(entry);
            self.entries.remove(user_id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(entry.value.clone())
    }

    fn version(&self, user_id: &str) -> u64 {
        self.versions.get(user_id).map(|v| *v).unwrap_or(0)
    }

    /// Invalidate a single user's entry
    ///
    /// Must run synchronously inside the mutating call so no stale grant or denial
    /// survives past the mutation that is supposed to fix it.
    pub fn invalidate(&self, user_id: &str) {
        *self.versions.entry(user_id.to_string()).or_insert(0) += 1;

        if self.entries.remove(user_id).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        debug!(user_id = %user_id, "Permission cache invalidated");
    }

    /// Invalidate every user's entry
    ///
    /// Used for hierarchy and catalog mutations, whose affected-user set is unbounded.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.evictions.fetch_add(self.entries.len() as u64, Ordering::Relaxed);
        self.entries.clear();

        debug!("Permission cache fully invalidated");
    }

    /// Drop entries past their TTL
    pub fn cleanup_expired(&self) {
        let mut evicted = 0u64;

        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted = %evicted, "Cleaned up expired cache entries");
        }
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_size: self.entries.len(),
        }
    }

    /// Start the periodic cleanup task
    pub fn start_cleanup_task(cache: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                cache.cleanup_expired();

                let stats = cache.stats();
                debug!(
                    hits = %stats.hits,
                    misses = %stats.misses,
                    hit_ratio = %format!("{:.2}", stats.hit_ratio()),
                    size = %stats.current_size,
                    evictions = %stats.evictions,
                    "Permission cache statistics"
                );
            }
        })
    }
}
