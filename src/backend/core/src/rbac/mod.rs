//! Hierarchy-aware role-based access control.
//!
//! This module provides:
//! - **Models**: entity names, roles, actions, memberships and subjects
//! - **Roles**: the application role registry and the system roles
//! - **Policy**: the per-entity-type access policy table and its configuration
//! - **Engine**: single and batch permission decisions with grant attribution
//! - **Create**: create checks for entities that do not exist yet
//!
//! # Usage
//!
//! ```rust,ignore
//! use canopy_core::rbac::{configure, decide, DecisionOptions, Membership, Subject};
//!
//! let table = configure(hierarchy, |subject, contexts| { /* grants */ })?;
//!
//! let memberships = vec![Membership::new("organization", "org1", "member")];
//! let subject = Subject::new("attachment", "a1").with_context("organization", "org1");
//! let resolution = decide(&table, &memberships, &subject, DecisionOptions::new())?;
//! ```

pub mod create;
pub mod engine;
pub mod facade;
pub mod models;
pub mod policy;
pub mod roles;

pub use create::can_create_entity;
pub use engine::{
    decide_batch, decide_one, subject_key, AccessResult, ActionAttribution, BatchDecision,
    DecisionOptions, DecisionSubject, Grant, PermissionDecision, SubjectError, SubjectKey,
    SYSTEM_CONTEXT, SYSTEM_CONTEXT_ID,
};
pub use facade::{decide, enforce, Resolution, Subjects};
pub use models::{
    Action, ActionMap, ActionPermissions, ContextIds, EntityKind, EntityName, Membership, Role,
    Subject, UserId,
};
pub use policy::{
    configure, permissions_for, AccessPolicyEntry, AccessPolicyTable, ContextGrants,
    ContextSetter, PolicyError, PolicySubject,
};
pub use roles::{RoleError, RoleRegistry, SystemRole};
