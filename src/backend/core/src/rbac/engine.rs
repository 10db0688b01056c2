//! Permission decision engine.
//!
//! Answers "which actions may this user take on this entity instance, and
//! which memberships granted each one", for one subject or a batch.
//!
//! Per call the engine builds two indexes and shares them across every subject
//! in the call:
//! - memberships keyed by `(context type, context id)`
//! - policy entries keyed by `(context type, role)`, one index per distinct
//!   subject entity type
//!
//! Each lookup is O(1), so a batch costs one index build plus a handful of
//! lookups per subject, instead of one index build per subject.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{
    Action, ActionMap, ActionPermissions, EntityKind, EntityName, Membership, Role, Subject,
};
use super::policy::{AccessPolicyEntry, AccessPolicyTable};
use super::roles::SystemRole;
use crate::telemetry::metrics as decision_metrics;

/// Context type recorded on attributions produced by the system-admin bypass.
pub const SYSTEM_CONTEXT: &str = "system";

/// Context id recorded on attributions produced by the system-admin bypass.
pub const SYSTEM_CONTEXT_ID: &str = "admin";

/// Key of a subject within a batch: its id, or `#<index>` when it has none.
pub type SubjectKey = String;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// A subject that is structurally malformed relative to the hierarchy.
///
/// This is a caller bug, not a denial: hosts should answer 400, not 403.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SubjectError {
    #[error("Unknown subject entity type `{0}`")]
    UnknownEntityType(EntityName),

    #[error("Entity type `{0}` cannot be the subject of a permission check")]
    NotPermissionable(EntityName),

    #[error("Subject of type `{entity_type}` has no `{context}` id field")]
    MissingContextId {
        entity_type: EntityName,
        context: EntityName,
    },

    #[error("Batch key `{key}` is shared by {count} subjects")]
    DuplicateKey { key: SubjectKey, count: usize },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-call options supplied by the authentication layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionOptions {
    pub system_role: Option<SystemRole>,
}

impl DecisionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_role(mut self, role: SystemRole) -> Self {
        self.system_role = Some(role);
        self
    }

    pub fn system_admin() -> Self {
        Self::new().with_system_role(SystemRole::Admin)
    }

    fn is_system_admin(&self) -> bool {
        self.system_role.is_some_and(|r| r.is_admin())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision types
// ═══════════════════════════════════════════════════════════════════════════════

/// One membership (or the system bypass) that granted an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub context_type: EntityName,
    pub context_id: String,
    pub role: Role,
}

impl Grant {
    /// The attribution recorded for the system-admin bypass.
    pub fn system() -> Self {
        Self {
            context_type: EntityName::new(SYSTEM_CONTEXT),
            context_id: SYSTEM_CONTEXT_ID.to_string(),
            role: SystemRole::Admin.to_role(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.context_type == SYSTEM_CONTEXT
    }
}

/// Whether an action is enabled, and every grant that enabled it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionAttribution {
    pub enabled: bool,
    pub granted_by: Vec<Grant>,
}

impl ActionAttribution {
    fn grant(&mut self, grant: Grant) {
        self.enabled = true;
        self.granted_by.push(grant);
    }

    pub fn granted_by_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Grant> + 'a {
        self.granted_by.iter().filter(move |g| g.role.as_str() == role)
    }
}

/// The subject as the engine resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionSubject {
    pub entity_type: EntityName,
    pub id: Option<String>,
    /// The id resolved for each relevant context that had one.
    pub context_ids: BTreeMap<EntityName, String>,
}

/// The full outcome of deciding one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDecision {
    pub subject: DecisionSubject,
    /// Most specific first: the subject's own type (for contexts), then its ancestors.
    pub relevant_contexts: Vec<EntityName>,
    /// `None` only for parentless (global) products.
    pub primary_context: Option<EntityName>,
    pub actions: ActionMap<ActionAttribution>,
    pub can: ActionMap<bool>,
    /// The user's first membership in the primary context instance, if any.
    pub membership: Option<Membership>,
}

impl PermissionDecision {
    pub fn allows(&self, action: Action) -> bool {
        self.can[action]
    }

    /// Enabled actions, in [`Action::ALL`] order.
    pub fn granted_actions(&self) -> Vec<Action> {
        self.can
            .iter()
            .filter(|(_, &enabled)| enabled)
            .map(|(action, _)| action)
            .collect()
    }
}

/// The simplified per-subject result most callers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult {
    /// At least one action is enabled.
    pub allowed: bool,
    pub membership: Option<Membership>,
    pub can: ActionMap<bool>,
}

impl From<&PermissionDecision> for AccessResult {
    fn from(decision: &PermissionDecision) -> Self {
        Self {
            allowed: decision.can.iter().any(|(_, &enabled)| enabled),
            membership: decision.membership.clone(),
            can: decision.can.clone(),
        }
    }
}

/// Results of a batch call, keyed by [`SubjectKey`].
///
/// A malformed subject lands in `errors` and never aborts the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchDecision {
    pub results: BTreeMap<SubjectKey, AccessResult>,
    pub decisions: BTreeMap<SubjectKey, PermissionDecision>,
    pub errors: BTreeMap<SubjectKey, SubjectError>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Indexes
// ═══════════════════════════════════════════════════════════════════════════════

/// Memberships keyed by context type, then context id. Input order is kept
/// within each bucket.
#[derive(Debug, Default)]
pub(crate) struct MembershipIndex<'m> {
    by_context: HashMap<&'m str, HashMap<&'m str, Vec<&'m Membership>>>,
}

impl<'m> MembershipIndex<'m> {
    pub(crate) fn build(memberships: &'m [Membership]) -> Self {
        let mut by_context: HashMap<&'m str, HashMap<&'m str, Vec<&'m Membership>>> =
            HashMap::new();
        for membership in memberships {
            match membership.context_id() {
                Some(id) => by_context
                    .entry(membership.context_type.as_str())
                    .or_default()
                    .entry(id)
                    .or_default()
                    .push(membership),
                None => warn!(
                    context_type = %membership.context_type,
                    role = %membership.role,
                    "Skipping membership without its own context id"
                ),
            }
        }
        Self { by_context }
    }

    pub(crate) fn lookup(&self, context_type: &str, context_id: &str) -> &[&'m Membership] {
        self.by_context
            .get(context_type)
            .and_then(|ids| ids.get(context_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Policy entries of one subject type keyed by context type, then role.
#[derive(Debug, Default)]
pub(crate) struct PolicyIndex<'p> {
    by_context: HashMap<&'p str, HashMap<&'p str, &'p ActionPermissions>>,
}

impl<'p> PolicyIndex<'p> {
    pub(crate) fn build(entries: &'p [AccessPolicyEntry]) -> Self {
        let mut by_context: HashMap<&'p str, HashMap<&'p str, &'p ActionPermissions>> =
            HashMap::new();
        for entry in entries {
            by_context
                .entry(entry.context_type.as_str())
                .or_default()
                .entry(entry.role.as_str())
                .or_insert(&entry.permissions);
        }
        Self { by_context }
    }

    pub(crate) fn lookup(&self, context_type: &str, role: &str) -> Option<&'p ActionPermissions> {
        self.by_context
            .get(context_type)
            .and_then(|roles| roles.get(role))
            .copied()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

/// A relevant context of a subject together with the subject's id for it.
struct ResolvedContext<'p, 's> {
    context_type: &'p EntityName,
    context_id: Option<&'s str>,
}

/// Holds the per-call indexes; one evaluator serves a whole batch.
pub(crate) struct Evaluator<'p, 'm> {
    table: &'p AccessPolicyTable,
    memberships: MembershipIndex<'m>,
    policies: HashMap<&'p str, PolicyIndex<'p>>,
    options: DecisionOptions,
}

impl<'p, 'm> Evaluator<'p, 'm> {
    pub(crate) fn new(
        table: &'p AccessPolicyTable,
        memberships: &'m [Membership],
        options: DecisionOptions,
    ) -> Self {
        Self {
            table,
            memberships: MembershipIndex::build(memberships),
            policies: HashMap::new(),
            options,
        }
    }

    /// Decide every action for one subject.
    pub(crate) fn decide(&mut self, subject: &Subject) -> Result<PermissionDecision, SubjectError> {
        let table = self.table;
        let hierarchy = table.hierarchy();
        let definition = hierarchy
            .entity(subject.entity_type.as_str())
            .ok_or_else(|| SubjectError::UnknownEntityType(subject.entity_type.clone()))?;

        let ancestors = hierarchy.ordered_ancestors(definition.name.as_str());
        let relevant: Vec<&'p EntityName> = match definition.kind {
            EntityKind::User => {
                return Err(SubjectError::NotPermissionable(definition.name.clone()))
            }
            EntityKind::Product => ancestors.iter().collect(),
            EntityKind::Context => std::iter::once(&definition.name).chain(ancestors).collect(),
        };

        let resolved = resolve_contexts(subject, &definition.name, &relevant)?;

        let primary_membership = resolved.first().and_then(|primary| {
            let id = primary.context_id?;
            self.memberships
                .lookup(primary.context_type.as_str(), id)
                .first()
                .map(|m| (*m).clone())
        });

        let mut actions: ActionMap<ActionAttribution> = ActionMap::default();

        if self.options.is_system_admin() {
            for action in Action::ALL {
                actions[action].grant(Grant::system());
            }
            debug!(
                entity_type = %definition.name,
                id = ?subject.id,
                "System admin bypass"
            );
            return Ok(finish(subject, &resolved, actions, primary_membership));
        }

        let policy = self
            .policies
            .entry(definition.name.as_str())
            .or_insert_with(|| PolicyIndex::build(table.policies_for(definition.name.as_str())));

        for context in &resolved {
            if hierarchy.roles_of(context.context_type.as_str()).is_empty() {
                continue;
            }
            let Some(context_id) = context.context_id else {
                continue;
            };
            for membership in self.memberships.lookup(context.context_type.as_str(), context_id) {
                let Some(permissions) =
                    policy.lookup(context.context_type.as_str(), membership.role.as_str())
                else {
                    continue;
                };
                for action in permissions.granted() {
                    actions[action].grant(Grant {
                        context_type: context.context_type.clone(),
                        context_id: context_id.to_string(),
                        role: membership.role.clone(),
                    });
                }
            }
        }

        let decision = finish(subject, &resolved, actions, primary_membership);
        debug!(
            entity_type = %decision.subject.entity_type,
            id = ?decision.subject.id,
            granted = ?decision.granted_actions(),
            "Permission decision"
        );
        Ok(decision)
    }
}

/// Pair each relevant context with the subject's id for it.
///
/// Every ancestor context must appear as a field on the subject (set or not);
/// the subject's own type resolves through its `id`.
fn resolve_contexts<'p, 's>(
    subject: &'s Subject,
    entity_type: &EntityName,
    relevant: &[&'p EntityName],
) -> Result<Vec<ResolvedContext<'p, 's>>, SubjectError> {
    relevant
        .iter()
        .map(|&context_type| {
            if context_type != entity_type && !subject.context_ids.has_field(context_type.as_str()) {
                return Err(SubjectError::MissingContextId {
                    entity_type: entity_type.clone(),
                    context: context_type.clone(),
                });
            }
            Ok(ResolvedContext {
                context_type,
                context_id: subject.context_id_for(context_type.as_str()),
            })
        })
        .collect()
}

fn finish(
    subject: &Subject,
    resolved: &[ResolvedContext<'_, '_>],
    actions: ActionMap<ActionAttribution>,
    membership: Option<Membership>,
) -> PermissionDecision {
    let context_ids = resolved
        .iter()
        .filter_map(|c| c.context_id.map(|id| (c.context_type.clone(), id.to_string())))
        .collect();

    PermissionDecision {
        subject: DecisionSubject {
            entity_type: subject.entity_type.clone(),
            id: subject.id.clone(),
            context_ids,
        },
        relevant_contexts: resolved.iter().map(|c| c.context_type.clone()).collect(),
        primary_context: resolved.first().map(|c| c.context_type.clone()),
        can: actions.map(|a| a.enabled),
        actions,
        membership,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entry points
// ═══════════════════════════════════════════════════════════════════════════════

/// Decide every action for a single subject.
pub fn decide_one(
    table: &AccessPolicyTable,
    memberships: &[Membership],
    subject: &Subject,
    options: DecisionOptions,
) -> Result<PermissionDecision, SubjectError> {
    let mut evaluator = Evaluator::new(table, memberships, options);
    let result = evaluator.decide(subject);
    match &result {
        Ok(_) => decision_metrics::record_decisions(path_label(&options, "single"), 1),
        Err(e) => decision_metrics::record_subject_error(e),
    }
    result
}

/// Decide every action for many subjects, sharing one set of indexes.
pub fn decide_batch(
    table: &AccessPolicyTable,
    memberships: &[Membership],
    subjects: &[Subject],
    options: DecisionOptions,
) -> BatchDecision {
    let timer = decision_metrics::DecisionTimer::start(path_label(&options, "batch"));
    let mut evaluator = Evaluator::new(table, memberships, options);
    let mut batch = BatchDecision::default();

    let keys: Vec<SubjectKey> = subjects
        .iter()
        .enumerate()
        .map(|(index, subject)| subject_key(subject, index))
        .collect();
    let mut key_counts: HashMap<&str, usize> = HashMap::with_capacity(keys.len());
    for key in &keys {
        *key_counts.entry(key.as_str()).or_default() += 1;
    }

    for (subject, key) in subjects.iter().zip(keys.iter().cloned()) {
        // Every subject sharing a key is reported; none of them is decided.
        let count = key_counts.get(key.as_str()).copied().unwrap_or(1);
        if count > 1 {
            let e = SubjectError::DuplicateKey {
                key: key.clone(),
                count,
            };
            warn!(subject = %key, error = %e, "Subject could not be decided");
            decision_metrics::record_subject_error(&e);
            batch.errors.insert(key, e);
            continue;
        }
        match evaluator.decide(subject) {
            Ok(decision) => {
                batch.results.insert(key.clone(), AccessResult::from(&decision));
                batch.decisions.insert(key, decision);
            }
            Err(e) => {
                warn!(subject = %key, error = %e, "Subject could not be decided");
                decision_metrics::record_subject_error(&e);
                batch.errors.insert(key, e);
            }
        }
    }

    decision_metrics::record_decisions(path_label(&options, "batch"), batch.decisions.len() as u64);
    decision_metrics::record_batch_size(subjects.len());
    let elapsed = timer.finish();
    debug!(
        subjects = subjects.len(),
        errors = batch.errors.len(),
        elapsed_us = elapsed.as_micros() as u64,
        "Batch decided"
    );
    batch
}

/// The key a subject is stored under in a [`BatchDecision`].
pub fn subject_key(subject: &Subject, index: usize) -> SubjectKey {
    match &subject.id {
        Some(id) => id.clone(),
        None => format!("#{index}"),
    }
}

fn path_label(options: &DecisionOptions, path: &'static str) -> &'static str {
    if options.is_system_admin() {
        "admin"
    } else {
        path
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
