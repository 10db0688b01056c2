#![allow(clippy::result_large_err)]
//! # Canopy Core
//!
//! Entity-hierarchy-aware permission decisions.
//!
//! ## Architecture
//!
//! - **Hierarchy**: a frozen tree of user, context and product entity types,
//!   validated as it is declared, with precomputed ancestor and descendant views
//! - **Policy**: per-entity-type access entries keyed by context type and role
//! - **Engine**: single and batch decisions with per-action grant attribution
//!   and a system-admin bypass
//! - **Config**: declarative TOML definition of the hierarchy and policies
//! - **Telemetry**: structured logging and decision metrics

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod rbac;
pub mod telemetry;

pub use error::{CanopyError, ErrorCode, ErrorDetails, ErrorResponse, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{CanopyError, ErrorCode, Result};
    pub use crate::hierarchy::{
        validate_public_product_types, ContextOptions, EntityDefinition, EntityHierarchy,
        HierarchyBuilder, HierarchyError, ProductOptions,
    };
    pub use crate::rbac::{
        can_create_entity, configure, decide, decide_batch, decide_one, enforce, AccessPolicyTable,
        AccessResult, Action, ActionAttribution, ActionPermissions, BatchDecision, ContextIds,
        DecisionOptions, EntityKind, EntityName, Grant, Membership, PermissionDecision,
        PolicyError, Resolution, Role, RoleRegistry, Subject, SubjectError, SystemRole,
    };
}
