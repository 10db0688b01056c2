//! Declarative hierarchy and policy configuration.
//!
//! A TOML document (plus `CANOPY__` prefixed environment overrides) describes
//! the role registry, every entity, the public product allowlist and the
//! access policy entries. Building from it goes through the same builder and
//! `configure` path as code-defined hierarchies, so the same startup checks
//! apply.

use config::FileFormat;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{CanopyError, Result};
use crate::hierarchy::{
    validate_public_product_types, ContextOptions, EntityHierarchy, ProductOptions, USER_ENTITY,
};
use crate::rbac::models::{ActionPermissions, EntityKind, EntityName, Role};
use crate::rbac::policy::{configure, AccessPolicyTable};
use crate::rbac::roles::RoleRegistry;
use crate::telemetry::LoggingConfig;

/// Prefix for environment overrides, e.g. `CANOPY__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "CANOPY";

/// Main configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The application role registry
    pub roles: Vec<String>,

    /// Products allowed to have no parent context
    #[serde(default)]
    pub public_product_types: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Entities in declaration order (parents first)
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    /// Access policy entries
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// One `[[entities]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub name: EntityName,
    pub kind: EntityKind,
    #[serde(default)]
    pub parent: Option<EntityName>,
    /// Roles of a context entity; must be empty for other kinds
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// One `[[policies]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub subject: EntityName,
    pub context: EntityName,
    pub role: Role,
    /// Missing actions default to `false`
    #[serde(default)]
    pub permissions: ActionPermissions,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).format(FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        info!(path = %path.display(), entities = cfg.entities.len(), "Configuration loaded");
        Ok(cfg)
    }

    /// Load from TOML text. Environment overrides are not applied.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Replay `entities` through the hierarchy builder, then check the
    /// public product allowlist.
    pub fn build_hierarchy(&self) -> Result<EntityHierarchy> {
        let registry = RoleRegistry::create(self.roles.iter().cloned())?;
        let mut builder = EntityHierarchy::builder(registry);

        for entity in &self.entities {
            match entity.kind {
                EntityKind::User => {
                    if entity.name != USER_ENTITY || entity.parent.is_some() || !entity.roles.is_empty()
                    {
                        return Err(CanopyError::configuration(format!(
                            "The user entity must be named `{USER_ENTITY}` and have no parent or roles"
                        ))
                        .with_context("entity", &entity.name));
                    }
                    builder.user()?;
                }
                EntityKind::Context => {
                    builder.context(
                        entity.name.clone(),
                        ContextOptions {
                            parent: entity.parent.clone(),
                            roles: entity.roles.clone(),
                        },
                    )?;
                }
                EntityKind::Product => {
                    if !entity.roles.is_empty() {
                        return Err(CanopyError::configuration(format!(
                            "Product entity `{}` cannot declare roles",
                            entity.name
                        ))
                        .with_context("entity", &entity.name));
                    }
                    builder.product(
                        entity.name.clone(),
                        ProductOptions {
                            parent: entity.parent.clone(),
                        },
                    )?;
                }
            }
        }

        let hierarchy = builder.build()?;
        validate_public_product_types(&hierarchy, &self.public_product_types)?;
        Ok(hierarchy)
    }

    /// Build the policy table from `policies`.
    ///
    /// An entry whose subject is not a permissionable entity type is rejected
    /// rather than silently dropped.
    pub fn build_policies(&self, hierarchy: Arc<EntityHierarchy>) -> Result<AccessPolicyTable> {
        for policy in &self.policies {
            match hierarchy.kind_of(policy.subject.as_str()) {
                Some(EntityKind::Context) | Some(EntityKind::Product) => {}
                _ => {
                    return Err(CanopyError::configuration(format!(
                        "Policy subject `{}` is not a permissionable entity type",
                        policy.subject
                    ))
                    .with_context("subject", &policy.subject));
                }
            }
        }

        let policies = &self.policies;
        let table = configure(hierarchy, |subject, contexts| {
            for policy in policies.iter().filter(|p| &p.subject == subject.name) {
                contexts
                    .on(policy.context.clone())
                    .grant(policy.role.clone(), policy.permissions.clone());
            }
        })?;
        Ok(table)
    }

    /// Build the hierarchy and then the policy table.
    pub fn build_table(&self) -> Result<AccessPolicyTable> {
        let hierarchy = Arc::new(self.build_hierarchy()?);
        self.build_policies(hierarchy)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
