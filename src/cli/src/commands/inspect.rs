//! `canopy inspect <entity>`: show one entity type's place in the hierarchy
//! and the policy entries configured for it.

use anyhow::{bail, Result};
use canopy_core::hierarchy::EntityDefinition;
use canopy_core::rbac::{AccessPolicyEntry, AccessPolicyTable, Action, EntityName};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use super::ConfigArgs;
use crate::output::{self, join_or_dash, mark, OutputFormat};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Entity type to inspect
    pub entity: String,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Serialize)]
pub struct EntityReport<'a> {
    pub entity: &'a EntityDefinition,
    pub ancestors: &'a [EntityName],
    pub children: &'a [EntityName],
    pub descendants: &'a [EntityName],
    pub policies: &'a [AccessPolicyEntry],
}

#[derive(Debug, Tabled)]
struct PolicyRow {
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "create")]
    create: String,
    #[tabled(rename = "read")]
    read: String,
    #[tabled(rename = "update")]
    update: String,
    #[tabled(rename = "delete")]
    delete: String,
    #[tabled(rename = "search")]
    search: String,
}

impl From<&AccessPolicyEntry> for PolicyRow {
    fn from(entry: &AccessPolicyEntry) -> Self {
        let p = &entry.permissions;
        Self {
            context: entry.context_type.to_string(),
            role: entry.role.to_string(),
            create: mark(p.allows(Action::Create)),
            read: mark(p.allows(Action::Read)),
            update: mark(p.allows(Action::Update)),
            delete: mark(p.allows(Action::Delete)),
            search: mark(p.allows(Action::Search)),
        }
    }
}

pub fn report<'a>(table: &'a AccessPolicyTable, entity: &str) -> Result<EntityReport<'a>> {
    let hierarchy = table.hierarchy();
    let Some(definition) = hierarchy.entity(entity) else {
        let known: Vec<&str> = hierarchy.all_types().iter().map(|n| n.as_str()).collect();
        bail!("Unknown entity type `{entity}` (known: {})", known.join(", "));
    };
    Ok(EntityReport {
        entity: definition,
        ancestors: hierarchy.ordered_ancestors(entity),
        children: hierarchy.children_of(entity),
        descendants: hierarchy.ordered_descendants(entity),
        policies: table.policies_for(entity),
    })
}

pub fn execute(args: InspectArgs, verbosity: u8, format: OutputFormat) -> Result<()> {
    let (_, table) = super::load(&args.config, verbosity)?;
    let report = report(&table, &args.entity)?;

    if format != OutputFormat::Table {
        return output::print_item(&report, format);
    }

    let names = |names: &[EntityName]| join_or_dash(names.iter().map(|n| n.as_str()));

    output::print_header(&format!("Entity `{}`", report.entity.name));
    output::print_detail("Kind", report.entity.kind.as_str());
    output::print_detail(
        "Parent",
        report.entity.parent.as_ref().map_or("-", |p| p.as_str()),
    );
    output::print_detail(
        "Roles",
        &join_or_dash(report.entity.roles.iter().map(|r| r.as_str())),
    );
    output::print_detail("Ancestors", &names(report.ancestors));
    output::print_detail("Children", &names(report.children));
    output::print_detail("Descendants", &names(report.descendants));

    output::print_header("Policies");
    let rows: Vec<PolicyRow> = report.policies.iter().map(PolicyRow::from).collect();
    if rows.is_empty() {
        output::print_warning("No policies configured; every action is denied except for system admins");
    } else {
        println!("{}", output::render_table(&rows));
    }
    Ok(())
}
