//! Create checks for entities that do not exist yet.
//!
//! A new entity has no id, so its own type can never contribute grants. Only
//! its ancestor contexts are walked, and only [`Action::Create`] is evaluated.

use tracing::debug;

use super::engine::{
    ActionAttribution, DecisionOptions, Grant, MembershipIndex, PolicyIndex, SubjectError,
};
use super::models::{Action, ContextIds, EntityKind, Membership};
use super::policy::AccessPolicyTable;

/// May the user create a new `entity_type` under the contexts in `context_ids`?
///
/// Every ancestor context of `entity_type` must appear as a field in
/// `context_ids`. The returned attribution lists every membership that grants
/// `create`, most specific context first.
pub fn can_create_entity(
    table: &AccessPolicyTable,
    memberships: &[Membership],
    entity_type: &str,
    context_ids: &ContextIds,
    options: DecisionOptions,
) -> Result<ActionAttribution, SubjectError> {
    let hierarchy = table.hierarchy();
    let definition = hierarchy
        .entity(entity_type)
        .ok_or_else(|| SubjectError::UnknownEntityType(entity_type.into()))?;
    if definition.kind == EntityKind::User {
        return Err(SubjectError::NotPermissionable(definition.name.clone()));
    }

    let ancestors = hierarchy.ordered_ancestors(entity_type);
    if let Some(missing) = ancestors.iter().find(|c| !context_ids.has_field(c.as_str())) {
        return Err(SubjectError::MissingContextId {
            entity_type: definition.name.clone(),
            context: missing.clone(),
        });
    }

    let mut attribution = ActionAttribution::default();

    if options.system_role.is_some_and(|r| r.is_admin()) {
        attribution.enabled = true;
        attribution.granted_by.push(Grant::system());
        return Ok(attribution);
    }

    let memberships = MembershipIndex::build(memberships);
    let policy = PolicyIndex::build(table.policies_for(entity_type));
    let mut grants = Vec::new();
    for context_type in ancestors {
        let Some(context_id) = context_ids.get(context_type.as_str()) else {
            continue;
        };
        for membership in memberships.lookup(context_type.as_str(), context_id) {
            let allowed = policy
                .lookup(context_type.as_str(), membership.role.as_str())
                .is_some_and(|p| p.allows(Action::Create));
            if allowed {
                grants.push(Grant {
                    context_type: context_type.clone(),
                    context_id: context_id.to_string(),
                    role: membership.role.clone(),
                });
            }
        }
    }

    attribution.enabled = !grants.is_empty();
    attribution.granted_by = grants;
    debug!(
        entity_type = %definition.name,
        allowed = attribution.enabled,
        "Create check"
    );
    Ok(attribution)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ContextOptions, EntityHierarchy, ProductOptions};
    use crate::rbac::models::ActionPermissions;
    use crate::rbac::policy::configure;
    use crate::rbac::roles::RoleRegistry;
    use std::sync::Arc;

    fn table() -> AccessPolicyTable {
        let mut b = EntityHierarchy::builder(RoleRegistry::create(["admin", "member"]).unwrap());
        b.user()
            .unwrap()
            .context("organization", ContextOptions::new(["admin", "member"]))
            .unwrap()
            .context("project", ContextOptions::new(["admin", "member"]).under("organization"))
            .unwrap()
            .product("task", ProductOptions::under("project"))
            .unwrap();
        let hierarchy = Arc::new(b.build().unwrap());
        configure(hierarchy, |subject, contexts| {
            if subject.name == "project" {
                contexts
                    .on("organization")
                    .grant("admin", ActionPermissions::all())
                    .grant("member", ActionPermissions::only(&[Action::Read]));
                // Project admins manage an existing project but cannot create one.
                contexts
                    .on("project")
                    .grant("admin", ActionPermissions::all());
            }
        })
        .unwrap()
    }

    fn in_org() -> ContextIds {
        [("organization", "org1")].into_iter().collect()
    }

    #[test]
    fn test_org_admin_can_create_project() {
        let memberships = vec![Membership::new("organization", "org1", "admin")];
        let result =
            can_create_entity(&table(), &memberships, "project", &in_org(), DecisionOptions::new())
                .unwrap();
        assert!(result.enabled);
        assert_eq!(result.granted_by.len(), 1);
        assert_eq!(result.granted_by[0].context_type, "organization");
    }

    #[test]
    fn test_own_type_never_contributes() {
        let memberships = vec![
            Membership::new("organization", "org1", "member"),
            Membership::new("project", "p1", "admin"),
        ];
        let result =
            can_create_entity(&table(), &memberships, "project", &in_org(), DecisionOptions::new())
                .unwrap();
        assert!(!result.enabled);
        assert!(result.granted_by.is_empty());
    }

    #[test]
    fn test_system_admin_can_create_anything() {
        let result = can_create_entity(
            &table(),
            &[],
            "project",
            &in_org(),
            DecisionOptions::system_admin(),
        )
        .unwrap();
        assert_eq!(result.granted_by, vec![Grant::system()]);
    }

    #[test]
    fn test_missing_parent_field_rejected() {
        let err = can_create_entity(
            &table(),
            &[],
            "task",
            &in_org(),
            DecisionOptions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SubjectError::MissingContextId { .. }));
    }
}
