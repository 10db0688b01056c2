//! `canopy decide`: run memberships and subjects through the decision engine.
//!
//! `--subjects` may hold a single subject object or an array of them. A single
//! subject prints its full decision, an array prints the batch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use canopy_core::rbac::{
    decide_batch, decide_one, subject_key, AccessPolicyTable, AccessResult, Action,
    BatchDecision, DecisionOptions, Membership, PermissionDecision, Subject, SystemRole,
};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use super::ConfigArgs;
use crate::output::{self, mark, OutputFormat};

#[derive(Args, Debug)]
pub struct DecideArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// JSON file holding an array of memberships (`-` for stdin)
    #[arg(short, long)]
    pub memberships: PathBuf,

    /// JSON file holding one subject or an array of subjects (`-` for stdin)
    #[arg(short, long)]
    pub subjects: PathBuf,

    /// Decide as a system administrator
    #[arg(long)]
    pub system_admin: bool,
}

#[derive(Debug, Tabled)]
struct ResultRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Allowed")]
    allowed: String,
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
    #[tabled(rename = "Membership")]
    membership: String,
}

impl ResultRow {
    fn new(subject: &str, result: &AccessResult) -> Self {
        Self {
            subject: subject.to_string(),
            allowed: mark(result.allowed),
            create: mark(result.can[Action::Create]),
            read: mark(result.can[Action::Read]),
            update: mark(result.can[Action::Update]),
            delete: mark(result.can[Action::Delete]),
            search: mark(result.can[Action::Search]),
            membership: result
                .membership
                .as_ref()
                .map(|m| format!("{} in {}", m.role, m.context_type))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Subjects as read from the input file.
#[derive(Debug)]
pub enum SubjectInput {
    One(Subject),
    Many(Vec<Subject>),
}

impl SubjectInput {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if value.is_array() {
            Ok(Self::Many(
                serde_json::from_value(value).context("Invalid subject array")?,
            ))
        } else {
            Ok(Self::One(
                serde_json::from_value(value).context("Invalid subject")?,
            ))
        }
    }
}

/// What `decide` prints: the full decision for one subject, or the batch.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DecideOutput {
    Single {
        #[serde(skip)]
        key: String,
        #[serde(flatten)]
        decision: PermissionDecision,
    },
    Batch(BatchDecision),
}

pub fn run(
    table: &AccessPolicyTable,
    memberships: &[Membership],
    subjects: &SubjectInput,
    options: DecisionOptions,
) -> Result<DecideOutput> {
    Ok(match subjects {
        SubjectInput::One(subject) => DecideOutput::Single {
            key: subject_key(subject, 0),
            decision: decide_one(table, memberships, subject, options)?,
        },
        SubjectInput::Many(subjects) => {
            DecideOutput::Batch(decide_batch(table, memberships, subjects, options))
        }
    })
}

/// Stdin can feed only one of the two inputs.
fn check_inputs(memberships: &Path, subjects: &Path) -> Result<()> {
    let stdin = Path::new("-");
    if memberships == stdin && subjects == stdin {
        bail!("--memberships and --subjects cannot both be read from stdin; pass one of them as a file");
    }
    Ok(())
}

pub fn execute(args: DecideArgs, verbosity: u8, format: OutputFormat) -> Result<()> {
    check_inputs(&args.memberships, &args.subjects)?;
    let (_, table) = super::load(&args.config, verbosity)?;

    let memberships: Vec<Membership> = serde_json::from_value(super::read_json(&args.memberships)?)
        .context("Invalid membership array")?;
    let subjects = SubjectInput::from_json(super::read_json(&args.subjects)?)?;

    let options = if args.system_admin {
        DecisionOptions::new().with_system_role(SystemRole::Admin)
    } else {
        DecisionOptions::new()
    };

    let out = run(&table, &memberships, &subjects, options)?;

    if format != OutputFormat::Table {
        return output::print_item(&out, format);
    }

    match &out {
        DecideOutput::Single { key, decision } => {
            let result = AccessResult::from(decision);
            println!("{}", output::render_table(&[ResultRow::new(key, &result)]));
        }
        DecideOutput::Batch(batch) => print_batch(batch),
    }
    Ok(())
}

fn print_batch(batch: &BatchDecision) {
    let rows: Vec<ResultRow> = batch
        .results
        .iter()
        .map(|(key, result)| ResultRow::new(key, result))
        .collect();
    if rows.is_empty() {
        println!("No subjects decided.");
    } else {
        println!("{}", output::render_table(&rows));
    }
    for (key, error) in &batch.errors {
        output::print_error(&format!("{key}: {error}"));
    }
}
