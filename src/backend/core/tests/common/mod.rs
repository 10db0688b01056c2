//! Shared fixture: organization → project → task, attachment under
//! organization, and a public `page`.

#![allow(dead_code)]

use std::sync::Arc;

use canopy_core::hierarchy::{ContextOptions, EntityHierarchy, ProductOptions};
use canopy_core::rbac::{
    configure, AccessPolicyTable, Action, ActionPermissions, Membership, RoleRegistry, Subject,
};

pub fn roles() -> RoleRegistry {
    RoleRegistry::create(["admin", "member", "viewer"]).unwrap()
}

pub fn hierarchy() -> Arc<EntityHierarchy> {
    let mut b = EntityHierarchy::builder(roles());
    b.user()
        .unwrap()
        .context("organization", ContextOptions::new(["admin", "member", "viewer"]))
        .unwrap()
        .context(
            "project",
            ContextOptions::new(["admin", "member"]).under("organization"),
        )
        .unwrap()
        .product("task", ProductOptions::under("project"))
        .unwrap()
        .product("attachment", ProductOptions::under("organization"))
        .unwrap()
        .product("page", ProductOptions::global())
        .unwrap();
    Arc::new(b.build().unwrap())
}

pub fn table() -> AccessPolicyTable {
    configure(hierarchy(), |subject, contexts| match subject.name.as_str() {
        "organization" => {
            contexts
                .on("organization")
                .grant("admin", ActionPermissions::all().with(Action::Create, false))
                .grant("member", ActionPermissions::only(&[Action::Read]));
        }
        "project" => {
            contexts
                .on("organization")
                .grant("admin", ActionPermissions::all())
                .grant("member", ActionPermissions::only(&[Action::Read, Action::Search]));
            contexts
                .on("project")
                .grant("admin", ActionPermissions::all().with(Action::Create, false))
                .grant("member", ActionPermissions::only(&[Action::Read]));
        }
        "task" => {
            contexts
                .on("organization")
                .grant("admin", ActionPermissions::all());
            contexts
                .on("project")
                .grant("admin", ActionPermissions::all())
                .grant(
                    "member",
                    ActionPermissions::only(&[Action::Create, Action::Read, Action::Update]),
                );
        }
        "attachment" => {
            contexts
                .on("organization")
                .grant("admin", ActionPermissions::all())
                .grant(
                    "member",
                    ActionPermissions::only(&[Action::Create, Action::Read, Action::Search]),
                )
                .grant("viewer", ActionPermissions::only(&[Action::Read]));
        }
        _ => {}
    })
    .unwrap()
}

pub fn org_membership(org: &str, role: &str) -> Membership {
    Membership::new("organization", org, role).for_user("u1")
}

pub fn project_membership(org: &str, project: &str, role: &str) -> Membership {
    Membership::new("project", project, role)
        .with_context("organization", org)
        .for_user("u1")
}

pub fn attachment(id: &str, org: &str) -> Subject {
    Subject::new("attachment", id).with_context("organization", org)
}

pub fn task(id: &str, org: &str, project: &str) -> Subject {
    Subject::new("task", id)
        .with_context("project", project)
        .with_context("organization", org)
}
