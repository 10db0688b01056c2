//! Integration tests for the entity hierarchy.

mod common;

use canopy_core::hierarchy::{
    validate_public_product_types, ContextOptions, EntityHierarchy, HierarchyError,
    ProductOptions,
};
use canopy_core::rbac::{EntityKind, RoleRegistry};

#[test]
fn test_ancestor_ordering() {
    let h = common::hierarchy();
    assert_eq!(h.ordered_ancestors("task"), ["project", "organization"]);
    assert_eq!(h.ordered_ancestors("project"), ["organization"]);
    assert!(h.ordered_ancestors("organization").is_empty());
    assert!(h.ordered_ancestors("page").is_empty());
    assert!(h.ordered_ancestors("user").is_empty());
    assert!(h.ordered_ancestors("nonexistent").is_empty());
}

#[test]
fn test_children_and_descendants() {
    let h = common::hierarchy();
    assert_eq!(h.children_of("organization"), ["project", "attachment"]);
    assert_eq!(h.children_of("project"), ["task"]);
    assert!(h.children_of("task").is_empty());
    assert_eq!(
        h.ordered_descendants("organization"),
        ["project", "attachment", "task"]
    );
    assert!(h.has_ancestor("task", "organization"));
    assert!(!h.has_ancestor("attachment", "project"));
}

#[test]
fn test_type_views() {
    let h = common::hierarchy();
    assert_eq!(h.user_type(), "user");
    assert_eq!(h.context_types(), ["organization", "project"]);
    assert_eq!(h.product_types(), ["task", "attachment", "page"]);
    assert_eq!(h.parentless_product_types(), ["page"]);
    assert_eq!(h.relatable_context_types(), ["organization", "project"]);
    assert_eq!(
        h.permissionable_types().map(|n| n.as_str()).collect::<Vec<_>>(),
        ["organization", "project", "task", "attachment", "page"]
    );
    assert_eq!(h.all_types().len(), 6);
}

#[test]
fn test_entity_lookups() {
    let h = common::hierarchy();
    let project = h.entity("project").unwrap();
    assert_eq!(project.kind, EntityKind::Context);
    assert_eq!(project.parent.as_ref().map(|p| p.as_str()), Some("organization"));
    assert_eq!(h.roles_of("project"), ["admin", "member"]);
    assert!(h.roles_of("task").is_empty());
    assert!(h.is_product("attachment"));
    assert!(!h.is_context("attachment"));
    assert_eq!(h.parent_of("task").map(|p| p.as_str()), Some("project"));
    assert!(h.entity("comment").is_none());

    let names: Vec<_> = h.definitions().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        ["user", "organization", "project", "task", "attachment", "page"]
    );
}

#[test]
fn test_builder_fail_fast() {
    let roles = || RoleRegistry::create(["admin"]).unwrap();

    // No user.
    let mut b = EntityHierarchy::builder(roles());
    b.context("organization", ContextOptions::new(["admin"])).unwrap();
    assert_eq!(b.build().unwrap_err(), HierarchyError::MissingUser);

    // No organization.
    let mut b = EntityHierarchy::builder(roles());
    b.user().unwrap();
    assert_eq!(b.build().unwrap_err(), HierarchyError::MissingRootContext);

    // Duplicate name fails at declaration time.
    let mut b = EntityHierarchy::builder(roles());
    b.context("organization", ContextOptions::new(["admin"])).unwrap();
    assert!(matches!(
        b.context("organization", ContextOptions::new(["admin"])),
        Err(HierarchyError::DuplicateEntity(_))
    ));

    // Parent is a product.
    let mut b = EntityHierarchy::builder(roles());
    b.context("organization", ContextOptions::new(["admin"]))
        .unwrap()
        .product("attachment", ProductOptions::under("organization"))
        .unwrap();
    assert!(matches!(
        b.context("album", ContextOptions::new(["admin"]).under("attachment")),
        Err(HierarchyError::ParentNotContext { .. })
    ));

    // Role not in registry.
    let mut b = EntityHierarchy::builder(roles());
    assert!(matches!(
        b.context("organization", ContextOptions::new(["owner"])),
        Err(HierarchyError::UnknownRole { .. })
    ));
}

#[test]
fn test_public_entity_symmetry() {
    let h = common::hierarchy();
    assert!(validate_public_product_types(&h, &["page"]).is_ok());

    let err = validate_public_product_types::<&str>(&h, &[]).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::PublicTypesMismatch { ref undeclared, .. } if undeclared == &["page"]
    ));

    let err = validate_public_product_types(&h, &["page", "task"]).unwrap_err();
    assert!(matches!(
        err,
        HierarchyError::PublicTypesMismatch { ref unexpected, .. } if unexpected == &["task"]
    ));
}
