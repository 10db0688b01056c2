//! `canopy validate`: build the hierarchy and policy table and summarize them.

use anyhow::Result;
use canopy_core::rbac::AccessPolicyTable;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use super::ConfigArgs;
use crate::output::{self, join_or_dash, OutputFormat};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// One row per entity type.
#[derive(Debug, Serialize, Tabled)]
pub struct EntityRow {
    #[tabled(rename = "Entity")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Parent")]
    pub parent: String,
    #[tabled(rename = "Roles")]
    pub roles: String,
    #[tabled(rename = "Ancestors")]
    pub ancestors: String,
    #[tabled(rename = "Policies")]
    pub policies: usize,
}

pub fn entity_rows(table: &AccessPolicyTable) -> Vec<EntityRow> {
    let hierarchy = table.hierarchy();
    hierarchy
        .definitions()
        .map(|def| EntityRow {
            name: def.name.to_string(),
            kind: def.kind.to_string(),
            parent: def
                .parent
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            roles: join_or_dash(def.roles.iter().map(|r| r.as_str())),
            ancestors: join_or_dash(
                hierarchy
                    .ordered_ancestors(def.name.as_str())
                    .iter()
                    .map(|a| a.as_str()),
            ),
            policies: table.policies_for(def.name.as_str()).len(),
        })
        .collect()
}

pub fn execute(args: ValidateArgs, verbosity: u8, format: OutputFormat) -> Result<()> {
    let (config, table) = super::load(&args.config, verbosity)?;
    let rows = entity_rows(&table);

    output::print_list(&rows, format)?;

    if format == OutputFormat::Table {
        let unconfigured: Vec<&str> = rows
            .iter()
            .filter(|r| r.kind != "user" && r.policies == 0)
            .map(|r| r.name.as_str())
            .collect();
        if !unconfigured.is_empty() {
            output::print_warning(&format!(
                "No policies configured for {}; every action is denied except for system admins",
                unconfigured.join(", ")
            ));
        }
        output::print_success(&format!(
            "{} is valid: {} roles, {} entity types, {} policy entries",
            args.config.config.display(),
            table.hierarchy().role_registry().len(),
            rows.len(),
            config.policies.len()
        ));
    }
    Ok(())
}
