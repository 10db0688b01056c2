//! Access policy table: which roles in which contexts may do what to each entity type.
//!
//! The table is produced once at startup by [`configure`], which calls a host
//! callback for every permissionable entity type. The callback declares grants
//! through a fluent [`ContextGrants`] handle:
//!
//! ```rust,ignore
//! let table = configure(hierarchy, |subject, contexts| match subject.name.as_str() {
//!     "attachment" => {
//!         contexts
//!             .on("organization")
//!             .grant("admin", ActionPermissions::all())
//!             .grant("member", ActionPermissions::only(&[Action::Read]));
//!     }
//!     _ => {}
//! })?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::models::{ActionPermissions, EntityKind, EntityName, Role};
use crate::hierarchy::EntityHierarchy;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised while configuring the access policy table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Policy for `{subject}` references unknown context `{context}`")]
    UnknownContext { subject: EntityName, context: EntityName },

    #[error("Policy for `{subject}` references `{context}`, which is not a context entity")]
    NotAContext { subject: EntityName, context: EntityName },

    #[error("Policy for `{subject}`: role `{role}` is not defined on context `{context}`")]
    UnknownRole {
        subject: EntityName,
        context: EntityName,
        role: Role,
    },

    #[error("Policy for `{subject}` sets `{context}`/`{role}` more than once")]
    DuplicateEntry {
        subject: EntityName,
        context: EntityName,
        role: Role,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries & table
// ═══════════════════════════════════════════════════════════════════════════════

/// What one role in one context type may do to a subject type.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccessPolicyEntry {
    pub context_type: EntityName,
    pub role: Role,
    pub permissions: ActionPermissions,
}

/// Policy entries per subject entity type, plus the hierarchy they were built against.
///
/// Built once and passed by reference into every decision; never mutated.
#[derive(Debug, Clone)]
pub struct AccessPolicyTable {
    hierarchy: Arc<EntityHierarchy>,
    entries: HashMap<EntityName, Vec<AccessPolicyEntry>>,
}

impl AccessPolicyTable {
    pub fn hierarchy(&self) -> &EntityHierarchy {
        &self.hierarchy
    }

    /// Entries configured for `subject_type`; empty when nothing was set.
    pub fn policies_for(&self, subject_type: &str) -> &[AccessPolicyEntry] {
        self.entries
            .get(subject_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of entries across all subject types.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Look up the permissions for an exact `(context_type, role)` pair.
pub fn permissions_for<'a>(
    entries: &'a [AccessPolicyEntry],
    context_type: &str,
    role: &str,
) -> Option<&'a ActionPermissions> {
    entries
        .iter()
        .find(|e| e.context_type == context_type && e.role.as_str() == role)
        .map(|e| &e.permissions)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// The subject type a configuration callback is currently being asked about.
#[derive(Debug, Clone, Copy)]
pub struct PolicySubject<'a> {
    pub name: &'a EntityName,
    pub kind: EntityKind,
}

/// Collects grants for one subject type. The first invalid grant is kept and
/// reported by [`configure`]; later calls after an error are ignored.
#[derive(Debug)]
pub struct ContextGrants<'h> {
    hierarchy: &'h EntityHierarchy,
    subject: EntityName,
    entries: Vec<AccessPolicyEntry>,
    error: Option<PolicyError>,
}

impl<'h> ContextGrants<'h> {
    fn new(hierarchy: &'h EntityHierarchy, subject: EntityName) -> Self {
        Self {
            hierarchy,
            subject,
            entries: Vec::new(),
            error: None,
        }
    }

    /// Select the context type whose roles the following grants apply to.
    pub fn on(&mut self, context_type: impl Into<EntityName>) -> ContextSetter<'_, 'h> {
        ContextSetter {
            grants: self,
            context: context_type.into(),
        }
    }

    fn push(&mut self, context: &EntityName, role: Role, permissions: ActionPermissions) {
        if self.error.is_some() {
            return;
        }
        match self.check(context, &role) {
            Ok(()) => self.entries.push(AccessPolicyEntry {
                context_type: context.clone(),
                role,
                permissions,
            }),
            Err(e) => self.error = Some(e),
        }
    }

    fn check(&self, context: &EntityName, role: &Role) -> Result<(), PolicyError> {
        match self.hierarchy.kind_of(context.as_str()) {
            None => {
                return Err(PolicyError::UnknownContext {
                    subject: self.subject.clone(),
                    context: context.clone(),
                })
            }
            Some(EntityKind::Context) => {}
            Some(_) => {
                return Err(PolicyError::NotAContext {
                    subject: self.subject.clone(),
                    context: context.clone(),
                })
            }
        }

        if !self.hierarchy.roles_of(context.as_str()).contains(role) {
            return Err(PolicyError::UnknownRole {
                subject: self.subject.clone(),
                context: context.clone(),
                role: role.clone(),
            });
        }

        if permissions_for(&self.entries, context.as_str(), role.as_str()).is_some() {
            return Err(PolicyError::DuplicateEntry {
                subject: self.subject.clone(),
                context: context.clone(),
                role: role.clone(),
            });
        }

        Ok(())
    }
}

/// Fluent setter for one context type; each [`grant`](Self::grant) appends an entry.
pub struct ContextSetter<'g, 'h> {
    grants: &'g mut ContextGrants<'h>,
    context: EntityName,
}

impl ContextSetter<'_, '_> {
    pub fn grant(self, role: impl Into<Role>, permissions: ActionPermissions) -> Self {
        self.grants.push(&self.context, role.into(), permissions);
        self
    }
}

/// Build the access policy table by invoking `callback` once per permissionable type.
///
/// Types for which the callback sets nothing get no entries, so every action
/// is denied for them unless the system-admin bypass applies.
pub fn configure<F>(hierarchy: Arc<EntityHierarchy>, mut callback: F) -> Result<AccessPolicyTable, PolicyError>
where
    F: FnMut(PolicySubject<'_>, &mut ContextGrants<'_>),
{
    let mut entries = HashMap::new();

    for name in hierarchy.permissionable_types() {
        let kind = match hierarchy.kind_of(name.as_str()) {
            Some(kind) => kind,
            None => continue,
        };
        let mut grants = ContextGrants::new(&hierarchy, name.clone());
        callback(PolicySubject { name, kind }, &mut grants);

        if let Some(err) = grants.error {
            return Err(err);
        }
        if !grants.entries.is_empty() {
            debug!(subject = %name, entries = grants.entries.len(), "Configured policy");
            entries.insert(name.clone(), grants.entries);
        }
    }

    let table = AccessPolicyTable { hierarchy, entries };
    info!(
        subjects = table.entries.len(),
        entries = table.len(),
        "Access policy table built"
    );
    Ok(table)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
