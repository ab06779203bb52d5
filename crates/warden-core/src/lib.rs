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

//! Warden: role-based authorization core
//!
//! Decides "may user U perform action A" from four inputs: a static permission catalog,
//! a role hierarchy with inheritance, per-user role assignments, and per-user overrides
//! that always win. The result is deny-by-default and fully deterministic for a fixed
//! store state.
//!
//! Token verification, transport, and storage schemas live outside this crate. Bring an
//! [`identity::TokenVerifier`] and optionally an [`store::AuthzStore`] implementation;
//! everything else wires together through [`system::Warden`].
//!
//! # Example
//!
//! ```no_run
//! use warden_core::{AccessLevel, Identity, Protection, RequestContext, Warden, WardenConfig};
//!
//! # async fn example() -> warden_core::AuthzResult<()> {
//! let warden = Warden::with_defaults(WardenConfig::default()).await?;
//! warden.manager().assign_role("system", "user123", "operator", None).await?;
//!
//! let ctx = RequestContext::authenticated(Identity::new("user123"));
//! let decision = warden
//!     .decide(&ctx, &Protection::authenticated().require_level("orders", AccessLevel::Write))
//!     .await?;
//!
//! assert!(decision.is_allowed());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod decision;
pub mod error;
pub mod identity;
pub mod manager;
pub mod overrides;
pub mod permissions;
pub mod resolver;
pub mod roles;
pub mod store;
pub mod system;

pub use audit::{AuditAction, AuditEntry, AuditLog, AuditStatistics};
pub use cache::{CacheStats, PermissionCache};
pub use config::WardenConfig;
pub use decision::{Decision, DecisionPipeline, DenyReason, Protection, Requirement, RequestContext};
pub use error::{AuthzError, AuthzResult};
pub use identity::{Identity, TokenVerifier};
pub use manager::AccessManager;
pub use overrides::PermissionOverride;
pub use permissions::{AccessLevel, Permission, PermissionCatalog, default_permissions};
pub use resolver::{EffectivePermissions, PermissionResolver};
pub use roles::{HierarchyEdge, Role, RoleAssignment, RoleGrant, RoleGraph, default_roles};
pub use store::{AuthzStore, MemoryStore};
pub use system::{Warden, WardenHealth};
