//! Public product allowlist validation.

use std::collections::BTreeSet;

use super::{EntityHierarchy, HierarchyError};
use crate::rbac::models::EntityName;

/// Check that the parentless product types are exactly `allowlist`.
///
/// Fails if a parentless product is missing from the allowlist, or if an
/// allowlisted name is not a parentless product. Either way the entity would
/// otherwise become public (or stop being public) by omission.
pub fn validate_public_product_types<S: AsRef<str>>(
    hierarchy: &EntityHierarchy,
    allowlist: &[S],
) -> Result<(), HierarchyError> {
    let declared: BTreeSet<&str> = allowlist.iter().map(AsRef::as_ref).collect();
    let actual: BTreeSet<&str> = hierarchy
        .parentless_product_types()
        .iter()
        .map(EntityName::as_str)
        .collect();

    let undeclared: Vec<EntityName> = actual.difference(&declared).map(|&n| n.into()).collect();
    let unexpected: Vec<EntityName> = declared.difference(&actual).map(|&n| n.into()).collect();

    if undeclared.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    Err(HierarchyError::PublicTypesMismatch {
        undeclared,
        unexpected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ContextOptions, ProductOptions};
    use crate::rbac::roles::RoleRegistry;

    fn hierarchy() -> EntityHierarchy {
        let mut b = EntityHierarchy::builder(RoleRegistry::create(["admin"]).unwrap());
        b.user()
            .unwrap()
            .context("organization", ContextOptions::new(["admin"]))
            .unwrap()
            .product("attachment", ProductOptions::under("organization"))
            .unwrap()
            .product("page", ProductOptions::global())
            .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_exact_allowlist_passes() {
        assert!(validate_public_product_types(&hierarchy(), &["page"]).is_ok());
    }

    #[test]
    fn test_undeclared_parentless_product_fails() {
        let err = validate_public_product_types::<&str>(&hierarchy(), &[]).unwrap_err();
        assert_eq!(
            err,
            HierarchyError::PublicTypesMismatch {
                undeclared: vec!["page".into()],
                unexpected: vec![],
            }
        );
    }

    #[test]
    fn test_declared_type_with_parent_fails() {
        let err = validate_public_product_types(&hierarchy(), &["page", "attachment"]).unwrap_err();
        assert_eq!(
            err,
            HierarchyError::PublicTypesMismatch {
                undeclared: vec![],
                unexpected: vec!["attachment".into()],
            }
        );
    }
}
