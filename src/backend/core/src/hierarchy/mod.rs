//! The entity hierarchy: a validated, immutable graph of entity types.
//!
//! This module handles:
//! - Declaring entity types through a fail-fast [`HierarchyBuilder`]
//! - Freezing them into an [`EntityHierarchy`] with precomputed ancestor,
//!   child and descendant views
//! - Cross-checking parentless product types against a public allowlist
//!
//! Every entity is a node in a petgraph `DiGraph` with edges running from
//! parent to child. The node index doubles as the arena id for the flat
//! per-entity caches, so a query is one hash lookup plus one slice index.

mod builder;
mod public;

pub use builder::{ContextOptions, HierarchyBuilder, ProductOptions};
pub use public::validate_public_product_types;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::info;

use crate::rbac::models::{EntityKind, EntityName, Role};
use crate::rbac::roles::RoleRegistry;

/// Name reserved for the single user entity.
pub const USER_ENTITY: &str = "user";

/// Name of the context every hierarchy must be rooted in.
pub const ROOT_CONTEXT: &str = "organization";

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Structural errors raised while declaring or building a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("user() already called")]
    UserAlreadyDefined,

    #[error("Entity name `{0}` is reserved for the user entity")]
    ReservedName(EntityName),

    #[error("Entity `{0}` is already defined")]
    DuplicateEntity(EntityName),

    #[error("Entity `{entity}` references unknown parent `{parent}`")]
    UnknownParent { entity: EntityName, parent: EntityName },

    #[error("Entity `{entity}`: parent `{parent}` must be a context entity")]
    ParentNotContext { entity: EntityName, parent: EntityName },

    #[error("Context `{0}` must declare at least one role")]
    EmptyRoles(EntityName),

    #[error("Context `{entity}` uses role `{role}` which is not in the role registry")]
    UnknownRole { entity: EntityName, role: Role },

    #[error("Context `{entity}` declares role `{role}` more than once")]
    DuplicateRole { entity: EntityName, role: Role },

    #[error("user() must be called before build()")]
    MissingUser,

    #[error("Hierarchy must define `organization` as a context entity")]
    MissingRootContext,

    #[error(
        "Public product types mismatch: parentless but not declared public {undeclared:?}; \
         declared public but not parentless products {unexpected:?}"
    )]
    PublicTypesMismatch {
        undeclared: Vec<EntityName>,
        unexpected: Vec<EntityName>,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Definitions
// ═══════════════════════════════════════════════════════════════════════════════

/// One declared entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDefinition {
    pub name: EntityName,
    pub kind: EntityKind,
    pub parent: Option<EntityName>,
    /// Non-empty for contexts, empty otherwise.
    pub roles: Vec<Role>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Hierarchy
// ═══════════════════════════════════════════════════════════════════════════════

/// A frozen, validated entity hierarchy.
///
/// Built once at startup and shared read-only; there is no way to mutate it
/// after [`HierarchyBuilder::build`], so the cached views never go stale.
#[derive(Debug, Clone)]
pub struct EntityHierarchy {
    graph: DiGraph<EntityDefinition, ()>,
    index: HashMap<EntityName, NodeIndex>,
    roles: RoleRegistry,
    user: NodeIndex,

    context_types: Vec<EntityName>,
    product_types: Vec<EntityName>,
    all_types: Vec<EntityName>,
    relatable_context_types: Vec<EntityName>,
    parentless_product_types: Vec<EntityName>,

    // Indexed by `NodeIndex::index()`.
    ancestors: Vec<Vec<EntityName>>,
    children: Vec<Vec<EntityName>>,
    descendants: Vec<Vec<EntityName>>,
}

impl EntityHierarchy {
    /// Start declaring a hierarchy over the given roles.
    pub fn builder(roles: RoleRegistry) -> HierarchyBuilder {
        HierarchyBuilder::new(roles)
    }

    /// Freeze a validated graph and precompute every derived view.
    ///
    /// Node indices follow declaration order; parents are always declared
    /// before their children.
    fn freeze(
        graph: DiGraph<EntityDefinition, ()>,
        index: HashMap<EntityName, NodeIndex>,
        roles: RoleRegistry,
        user: NodeIndex,
    ) -> Self {
        let nodes: Vec<NodeIndex> = graph.node_indices().collect();

        let names_where = |pred: &dyn Fn(&EntityDefinition) -> bool| -> Vec<EntityName> {
            nodes
                .iter()
                .map(|&idx| &graph[idx])
                .filter(|def| pred(def))
                .map(|def| def.name.clone())
                .collect()
        };

        let all_types = names_where(&|_| true);
        let context_types = names_where(&|def| def.kind == EntityKind::Context);
        let product_types = names_where(&|def| def.kind == EntityKind::Product);
        let parentless_product_types =
            names_where(&|def| def.kind == EntityKind::Product && def.parent.is_none());
        let relatable_context_types = names_where(&|def| {
            def.kind == EntityKind::Context
                && graph
                    .neighbors_directed(index[&def.name], petgraph::Direction::Outgoing)
                    .any(|child| graph[child].kind == EntityKind::Product)
        });

        // petgraph yields neighbors newest-first; sort back into declaration order.
        let children: Vec<Vec<EntityName>> = nodes
            .iter()
            .map(|&idx| {
                let mut kids: Vec<NodeIndex> = graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                    .collect();
                kids.sort();
                kids.into_iter().map(|k| graph[k].name.clone()).collect()
            })
            .collect();

        let ancestors: Vec<Vec<EntityName>> = nodes
            .iter()
            .map(|&idx| {
                let mut chain = Vec::new();
                let mut current = graph[idx].parent.as_ref();
                while let Some(parent) = current {
                    let def = &graph[index[parent]];
                    if def.kind == EntityKind::Context {
                        chain.push(def.name.clone());
                    }
                    current = def.parent.as_ref();
                }
                chain
            })
            .collect();

        let descendants: Vec<Vec<EntityName>> = nodes
            .iter()
            .map(|&idx| {
                let mut out = Vec::new();
                let mut queue: VecDeque<&EntityName> = children[idx.index()].iter().collect();
                while let Some(name) = queue.pop_front() {
                    out.push(name.clone());
                    queue.extend(children[index[name].index()].iter());
                }
                out
            })
            .collect();

        info!(
            entities = all_types.len(),
            contexts = context_types.len(),
            products = product_types.len(),
            "Entity hierarchy built"
        );

        Self {
            graph,
            index,
            roles,
            user,
            context_types,
            product_types,
            all_types,
            relatable_context_types,
            parentless_product_types,
            ancestors,
            children,
            descendants,
        }
    }

    fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────────

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.node(name).map(|idx| &self.graph[idx])
    }

    /// All definitions, in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn kind_of(&self, name: &str) -> Option<EntityKind> {
        self.entity(name).map(|def| def.kind)
    }

    pub fn is_context(&self, name: &str) -> bool {
        self.kind_of(name) == Some(EntityKind::Context)
    }

    pub fn is_product(&self, name: &str) -> bool {
        self.kind_of(name) == Some(EntityKind::Product)
    }

    /// Roles of a context type; empty for anything else.
    pub fn roles_of(&self, context_name: &str) -> &[Role] {
        self.entity(context_name)
            .map(|def| def.roles.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, name: &str) -> Option<&EntityName> {
        self.entity(name).and_then(|def| def.parent.as_ref())
    }

    pub fn role_registry(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn user_type(&self) -> &EntityName {
        &self.graph[self.user].name
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Derived views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn context_types(&self) -> &[EntityName] {
        &self.context_types
    }

    pub fn product_types(&self) -> &[EntityName] {
        &self.product_types
    }

    pub fn all_types(&self) -> &[EntityName] {
        &self.all_types
    }

    /// Context types that are the direct parent of at least one product type.
    pub fn relatable_context_types(&self) -> &[EntityName] {
        &self.relatable_context_types
    }

    /// Product types with no parent (global/public candidates).
    pub fn parentless_product_types(&self) -> &[EntityName] {
        &self.parentless_product_types
    }

    /// Every type a policy can be configured for (everything but the user).
    pub fn permissionable_types(&self) -> impl Iterator<Item = &EntityName> {
        self.all_types
            .iter()
            .filter(move |name| *name != self.user_type())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    /// Context ancestors of `name`, most specific first, root last.
    ///
    /// Does not include `name` itself. Empty for roots, parentless products,
    /// the user and unknown names.
    pub fn ordered_ancestors(&self, name: &str) -> &[EntityName] {
        self.node(name)
            .map(|idx| self.ancestors[idx.index()].as_slice())
            .unwrap_or(&[])
    }

    /// Direct children of a context type, in declaration order.
    pub fn children_of(&self, context_name: &str) -> &[EntityName] {
        self.node(context_name)
            .map(|idx| self.children[idx.index()].as_slice())
            .unwrap_or(&[])
    }

    /// All descendants of a context type, breadth-first.
    pub fn ordered_descendants(&self, context_name: &str) -> &[EntityName] {
        self.node(context_name)
            .map(|idx| self.descendants[idx.index()].as_slice())
            .unwrap_or(&[])
    }

    pub fn has_ancestor(&self, name: &str, candidate: &str) -> bool {
        self.ordered_ancestors(name).iter().any(|a| a == candidate)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> EntityHierarchy {
        let roles = RoleRegistry::create(["admin", "member"]).unwrap();
        let mut builder = EntityHierarchy::builder(roles);
        builder
            .user()
            .unwrap()
            .context("organization", ContextOptions::new(["admin", "member"]))
            .unwrap()
            .context("workspace", ContextOptions::new(["admin"]).under("organization"))
            .unwrap()
            .context("project", ContextOptions::new(["admin", "member"]).under("organization"))
            .unwrap()
            .product("task", ProductOptions::under("project"))
            .unwrap()
            .product("attachment", ProductOptions::under("organization"))
            .unwrap()
            .product("page", ProductOptions::global())
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_ordered_ancestors() {
        let h = hierarchy();
        assert_eq!(h.ordered_ancestors("task"), ["project", "organization"]);
        assert_eq!(h.ordered_ancestors("project"), ["organization"]);
        assert!(h.ordered_ancestors("organization").is_empty());
        assert!(h.ordered_ancestors("page").is_empty());
        assert!(h.ordered_ancestors("user").is_empty());
        assert!(h.ordered_ancestors("nope").is_empty());
    }

    #[test]
    fn test_children_and_descendants_in_declaration_order() {
        let h = hierarchy();
        assert_eq!(h.children_of("organization"), ["workspace", "project", "attachment"]);
        assert_eq!(
            h.ordered_descendants("organization"),
            ["workspace", "project", "attachment", "task"]
        );
        assert_eq!(h.children_of("project"), ["task"]);
        assert!(h.children_of("task").is_empty());
    }

    #[test]
    fn test_type_views() {
        let h = hierarchy();
        assert_eq!(h.context_types(), ["organization", "workspace", "project"]);
        assert_eq!(h.product_types(), ["task", "attachment", "page"]);
        assert_eq!(h.all_types().len(), 7);
        assert_eq!(h.relatable_context_types(), ["organization", "project"]);
        assert_eq!(h.parentless_product_types(), ["page"]);
        assert_eq!(h.permissionable_types().count(), 6);
        assert_eq!(h.user_type(), "user");
    }

    #[test]
    fn test_kind_and_roles_queries() {
        let h = hierarchy();
        assert_eq!(h.kind_of("user"), Some(EntityKind::User));
        assert!(h.is_context("workspace"));
        assert!(h.is_product("task"));
        assert!(!h.is_product("organization"));
        assert_eq!(h.roles_of("workspace"), [Role::new("admin")]);
        assert!(h.roles_of("task").is_empty());
        assert_eq!(h.parent_of("task").map(|p| p.as_str()), Some("project"));
        assert_eq!(h.parent_of("organization"), None);
        assert_eq!(h.role_registry().len(), 2);
        assert!(h.role_registry().contains("member"));
    }

    #[test]
    fn test_has_ancestor() {
        let h = hierarchy();
        assert!(h.has_ancestor("task", "organization"));
        assert!(h.has_ancestor("task", "project"));
        assert!(!h.has_ancestor("task", "workspace"));
        assert!(!h.has_ancestor("organization", "organization"));
    }
}
