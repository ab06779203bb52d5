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

//! Append-only audit log of administrative authorization mutations
//!
//! Only role assignment, revocation, and override changes land here. Access-denied
//! telemetry is operational logging and deliberately kept out of this store.

use crate::error::AuthzResult;
use crate::store::AuthzStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Administrative mutation kinds recorded in the audit log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AssignRole,
    RevokeRole,
    GrantOverride,
    RevokeOverride,
}

/// Immutable audit record; written once, never updated or deleted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: String,

    /// Mutation kind
    pub action: AuditAction,

    /// Who performed the mutation
    pub actor: String,

    /// User whose authorization state changed
    pub target_user: String,

    /// Role involved, for role mutations
    pub role_id: Option<String>,

    /// Permission involved, for override mutations
    pub permission: Option<String>,

    /// State before the mutation
    pub old_value: Option<serde_json::Value>,

    /// State after the mutation
    pub new_value: Option<serde_json::Value>,

    /// Mutation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(action: AuditAction, actor: impl Into<String>, target_user: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            actor: actor.into(),
            target_user: target_user.into(),
            role_id: None,
            permission: None,
            old_value: None,
            new_value: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the role involved
    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    /// Set the permission involved
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Record the state before the mutation
    pub fn with_old_value(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    /// Record the state after the mutation
    pub fn with_new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }
}

/// Aggregate audit counters
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    /// Total entries in the query window
    pub total_entries: usize,

    /// Entries per mutation kind
    pub entries_by_action: HashMap<AuditAction, usize>,
}

/// Audit log: appends to the authoritative store and keeps a bounded in-memory window
/// for operator queries
#[derive(Debug)]
pub struct AuditLog {
    store: Arc<dyn AuthzStore>,
    recent: RwLock<VecDeque<AuditEntry>>,
    max_recent: usize,
}

impl AuditLog {
    /// Create a new audit log over a store
    pub fn new(store: Arc<dyn AuthzStore>, max_recent: usize) -> Self {
        Self {
            store,
            recent: RwLock::new(VecDeque::new()),
            max_recent,
        }
    }

    /// Append an entry
    ///
    /// The store append is authoritative; the in-memory window is a trimmed copy for
    /// queries. There is no update or delete path.
    pub async fn record(&self, entry: AuditEntry) -> AuthzResult<()> {
        self.store.append_audit_entry(entry.clone()).await?;

        info!(
            action = ?entry.action,
            actor = %entry.actor,
            target_user = %entry.target_user,
            role_id = ?entry.role_id,
            permission = ?entry.permission,
            "Audit entry recorded"
        );

        let mut recent = self.recent.write().await;
        recent.push_back(entry);
        while recent.len() > self.max_recent {
            recent.pop_front();
        }

        Ok(())
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: Option<usize>) -> Vec<AuditEntry> {
        let recent = self.recent.read().await;
        let iter = recent.iter().rev().cloned();

        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Entries where the user is actor or target, newest first
    pub async fn entries_for_user(&self, user_id: &str, limit: Option<usize>) -> Vec<AuditEntry> {
        let recent = self.recent.read().await;
        let iter = recent.iter().rev().filter(|e| e.actor == user_id || e.target_user == user_id).cloned();

        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Entries of a specific mutation kind, newest first
    pub async fn entries_by_action(&self, action: AuditAction, limit: Option<usize>) -> Vec<AuditEntry> {
        let recent = self.recent.read().await;
        let iter = recent.iter().rev().filter(|e| e.action == action).cloned();

        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Entries within a time range, newest first
    pub async fn entries_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>, limit: Option<usize>) -> Vec<AuditEntry> {
        let recent = self.recent.read().await;
        let iter = recent.iter().rev().filter(|e| e.timestamp >= start && e.timestamp <= end).cloned();

        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    /// Aggregate counters over the query window
    pub async fn statistics(&self) -> AuditStatistics {
        let recent = self.recent.read().await;

        let mut stats = AuditStatistics {
            total_entries: recent.len(),
            ..Default::default()
        };

        for entry in recent.iter() {
            *stats.entries_by_action.entry(entry.action).or_insert(0) += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn test_log(max_recent: usize) -> AuditLog {
        AuditLog::new(Arc::new(MemoryStore::new()), max_recent)
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let log = test_log(100);

        log.record(AuditEntry::new(AuditAction::AssignRole, "admin", "user123").with_role("employee")).await.unwrap();
        log.record(
            AuditEntry::new(AuditAction::GrantOverride, "admin", "user123")
                .with_permission("orders:write")
                .with_new_value(json!({ "granted": false })),
        )
        .await
        .unwrap();

        let all = log.recent(None).await;
        assert_eq!(all.len(), 2);
        // Newest first.
        assert_eq!(all[0].action, AuditAction::GrantOverride);

        let assigns = log.entries_by_action(AuditAction::AssignRole, None).await;
        assert_eq!(assigns.len(), 1);
        assert_eq!(assigns[0].role_id.as_deref(), Some("employee"));
    }

    #[tokio::test]
    async fn test_user_filter_matches_actor_and_target() {
        let log = test_log(100);

        log.record(AuditEntry::new(AuditAction::AssignRole, "admin", "user123").with_role("employee")).await.unwrap();
        log.record(AuditEntry::new(AuditAction::AssignRole, "user123", "other").with_role("readonly")).await.unwrap();
        log.record(AuditEntry::new(AuditAction::AssignRole, "admin", "other").with_role("readonly")).await.unwrap();

        let entries = log.entries_for_user("user123", None).await;
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_window_trimming() {
        let log = test_log(2);

        for i in 0..5 {
            log.record(AuditEntry::new(AuditAction::RevokeRole, "admin", format!("user{}", i))).await.unwrap();
        }

        let entries = log.recent(None).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target_user, "user4");
    }

    #[tokio::test]
    async fn test_statistics() {
        let log = test_log(100);

        log.record(AuditEntry::new(AuditAction::AssignRole, "admin", "u1")).await.unwrap();
        log.record(AuditEntry::new(AuditAction::AssignRole, "admin", "u2")).await.unwrap();
        log.record(AuditEntry::new(AuditAction::RevokeOverride, "admin", "u1")).await.unwrap();

        let stats = log.statistics().await;
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.entries_by_action.get(&AuditAction::AssignRole), Some(&2));
    }
}
