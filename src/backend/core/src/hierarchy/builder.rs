//! Fail-fast builder for [`EntityHierarchy`].
//!
//! Entities are declared dependency-first: a parent must exist before any
//! child names it. Each declaration runs independent checks against the
//! definitions accumulated so far and returns the first violation, so a
//! hierarchy that builds is traversable without further validation.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{EntityDefinition, EntityHierarchy, HierarchyError, ROOT_CONTEXT, USER_ENTITY};
use crate::rbac::models::{EntityKind, EntityName, Role};
use crate::rbac::roles::RoleRegistry;

/// Options for [`HierarchyBuilder::context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub parent: Option<EntityName>,
    pub roles: Vec<Role>,
}

impl ContextOptions {
    /// A root context with the given roles.
    pub fn new<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Self {
            parent: None,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn under(mut self, parent: impl Into<EntityName>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Options for [`HierarchyBuilder::product`].
#[derive(Debug, Clone, Default)]
pub struct ProductOptions {
    pub parent: Option<EntityName>,
}

impl ProductOptions {
    pub fn under(parent: impl Into<EntityName>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }

    /// A product with no parent context; must be allowlisted as public.
    pub fn global() -> Self {
        Self { parent: None }
    }
}

/// Accumulates entity declarations and validates each one as it arrives.
#[derive(Debug)]
pub struct HierarchyBuilder {
    roles: RoleRegistry,
    graph: DiGraph<EntityDefinition, ()>,
    index: HashMap<EntityName, NodeIndex>,
    user: Option<NodeIndex>,
}

impl HierarchyBuilder {
    pub fn new(roles: RoleRegistry) -> Self {
        Self {
            roles,
            graph: DiGraph::new(),
            index: HashMap::new(),
            user: None,
        }
    }

    /// Register the singular user entity.
    pub fn user(&mut self) -> Result<&mut Self, HierarchyError> {
        if self.user.is_some() {
            return Err(HierarchyError::UserAlreadyDefined);
        }
        let idx = self.insert(EntityDefinition {
            name: EntityName::new(USER_ENTITY),
            kind: EntityKind::User,
            parent: None,
            roles: Vec::new(),
        });
        self.user = Some(idx);
        Ok(self)
    }

    /// Register a context entity.
    pub fn context(
        &mut self,
        name: impl Into<EntityName>,
        options: ContextOptions,
    ) -> Result<&mut Self, HierarchyError> {
        let name = name.into();
        self.check_name(&name)?;
        self.check_parent(&name, options.parent.as_ref())?;
        check_roles(&self.roles, &name, &options.roles)?;

        self.insert(EntityDefinition {
            name,
            kind: EntityKind::Context,
            parent: options.parent,
            roles: options.roles,
        });
        Ok(self)
    }

    /// Register a product entity.
    pub fn product(
        &mut self,
        name: impl Into<EntityName>,
        options: ProductOptions,
    ) -> Result<&mut Self, HierarchyError> {
        let name = name.into();
        self.check_name(&name)?;
        self.check_parent(&name, options.parent.as_ref())?;

        self.insert(EntityDefinition {
            name,
            kind: EntityKind::Product,
            parent: options.parent,
            roles: Vec::new(),
        });
        Ok(self)
    }

    /// Freeze the declarations into an [`EntityHierarchy`].
    pub fn build(self) -> Result<EntityHierarchy, HierarchyError> {
        let user = self.user.ok_or(HierarchyError::MissingUser)?;

        let has_root = self
            .index
            .get(ROOT_CONTEXT)
            .is_some_and(|&idx| self.graph[idx].kind == EntityKind::Context);
        if !has_root {
            return Err(HierarchyError::MissingRootContext);
        }

        Ok(EntityHierarchy::freeze(self.graph, self.index, self.roles, user))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checks
    // ─────────────────────────────────────────────────────────────────────────

    fn check_name(&self, name: &EntityName) -> Result<(), HierarchyError> {
        if name == USER_ENTITY {
            return Err(HierarchyError::ReservedName(name.clone()));
        }
        if self.index.contains_key(name) {
            return Err(HierarchyError::DuplicateEntity(name.clone()));
        }
        Ok(())
    }

    fn check_parent(
        &self,
        entity: &EntityName,
        parent: Option<&EntityName>,
    ) -> Result<(), HierarchyError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        let idx = self
            .index
            .get(parent)
            .ok_or_else(|| HierarchyError::UnknownParent {
                entity: entity.clone(),
                parent: parent.clone(),
            })?;
        if self.graph[*idx].kind != EntityKind::Context {
            return Err(HierarchyError::ParentNotContext {
                entity: entity.clone(),
                parent: parent.clone(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, definition: EntityDefinition) -> NodeIndex {
        debug!(entity = %definition.name, kind = %definition.kind, "Declaring entity");
        let name = definition.name.clone();
        let parent = definition.parent.clone();
        let idx = self.graph.add_node(definition);
        if let Some(parent_idx) = parent.and_then(|p| self.index.get(&p).copied()) {
            self.graph.add_edge(parent_idx, idx, ());
        }
        self.index.insert(name, idx);
        idx
    }
}

fn check_roles(
    registry: &RoleRegistry,
    entity: &EntityName,
    roles: &[Role],
) -> Result<(), HierarchyError> {
    if roles.is_empty() {
        return Err(HierarchyError::EmptyRoles(entity.clone()));
    }
    let mut seen = HashSet::new();
    for role in roles {
        if !registry.contains(role.as_str()) {
            return Err(HierarchyError::UnknownRole {
                entity: entity.clone(),
                role: role.clone(),
            });
        }
        if !seen.insert(role.as_str()) {
            return Err(HierarchyError::DuplicateRole {
                entity: entity.clone(),
                role: role.clone(),
            });
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
