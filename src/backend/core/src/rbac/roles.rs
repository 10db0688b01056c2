//! The role registry and the predefined system roles.
//!
//! Context roles (e.g. `admin`, `member`) come from host configuration and are
//! validated once through [`RoleRegistry::create`]. System roles are fixed:
//!
//! | Role  | Description                                              |
//! |-------|----------------------------------------------------------|
//! | Admin | Bypasses every policy and membership check               |
//! | User  | Regular account; decisions follow memberships and policy |

use std::collections::HashSet;
use thiserror::Error;

use super::models::Role;

/// Errors from constructing a role registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("Role registry must contain at least one role")]
    Empty,

    #[error("Duplicate role in registry: {0}")]
    Duplicate(String),
}

/// An immutable, ordered set of role names usable across contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRegistry {
    roles: Vec<Role>,
}

impl RoleRegistry {
    /// Create a registry, rejecting empty and duplicate names.
    pub fn create<I, S>(names: I) -> Result<Self, RoleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut roles = Vec::new();
        for name in names {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(RoleError::Duplicate(name));
            }
            roles.push(Role::new(name));
        }

        if roles.is_empty() {
            return Err(RoleError::Empty);
        }

        Ok(Self { roles })
    }

    /// All roles, in declaration order.
    pub fn all(&self) -> &[Role] {
        &self.roles
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Account-level roles supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemRole {
    Admin,
    User,
}

impl SystemRole {
    /// Get the role identifier string.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// The role recorded in attributions granted by this system role.
    pub fn to_role(&self) -> Role {
        Role::new(self.id())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keeps_order() {
        let registry = RoleRegistry::create(["admin", "member", "guest"]).unwrap();
        let names: Vec<_> = registry.all().iter().map(|r| r.as_str()).collect();
        assert_eq!(names, ["admin", "member", "guest"]);
        assert!(registry.contains("member"));
        assert!(!registry.contains("owner"));
    }

    #[test]
    fn test_registry_rejects_empty() {
        assert_eq!(
            RoleRegistry::create(Vec::<String>::new()).unwrap_err(),
            RoleError::Empty
        );
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        assert_eq!(
            RoleRegistry::create(["admin", "member", "admin"]).unwrap_err(),
            RoleError::Duplicate("admin".to_string())
        );
    }

    #[test]
    fn test_system_role_ids() {
        assert_eq!(SystemRole::Admin.id(), "admin");
        assert_eq!(SystemRole::User.id(), "user");
        assert!(SystemRole::Admin.is_admin());
        assert!(!SystemRole::User.is_admin());
    }
}
