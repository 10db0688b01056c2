//! One entry point for one or many subjects.
//!
//! Hosts that do not care which path they are on call [`decide`] with either
//! a single [`Subject`] or a slice; a single subject yields its simplified
//! [`AccessResult`], a slice yields the keyed [`BatchDecision`]. Both paths go
//! through the same evaluator, so their answers are identical per subject.

use super::engine::{decide_batch, decide_one, AccessResult, BatchDecision, DecisionOptions, SubjectError};
use super::models::{Action, Membership, Subject};
use super::policy::AccessPolicyTable;
use crate::error::CanopyError;

/// The subjects of a [`decide`] call.
#[derive(Debug, Clone, Copy)]
pub enum Subjects<'s> {
    One(&'s Subject),
    Many(&'s [Subject]),
}

impl<'s> From<&'s Subject> for Subjects<'s> {
    fn from(subject: &'s Subject) -> Self {
        Self::One(subject)
    }
}

impl<'s> From<&'s [Subject]> for Subjects<'s> {
    fn from(subjects: &'s [Subject]) -> Self {
        Self::Many(subjects)
    }
}

impl<'s> From<&'s Vec<Subject>> for Subjects<'s> {
    fn from(subjects: &'s Vec<Subject>) -> Self {
        Self::Many(subjects.as_slice())
    }
}

/// What [`decide`] returns, matching the shape of its input.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Single(AccessResult),
    Batch(BatchDecision),
}

impl Resolution {
    pub fn single(&self) -> Option<&AccessResult> {
        match self {
            Self::Single(result) => Some(result),
            Self::Batch(_) => None,
        }
    }

    pub fn batch(&self) -> Option<&BatchDecision> {
        match self {
            Self::Single(_) => None,
            Self::Batch(batch) => Some(batch),
        }
    }
}

/// Decide one subject or a batch.
///
/// A malformed single subject is an error; in a batch it is recorded in
/// [`BatchDecision::errors`] and the other subjects are still decided.
pub fn decide<'s>(
    table: &AccessPolicyTable,
    memberships: &[Membership],
    subjects: impl Into<Subjects<'s>>,
    options: DecisionOptions,
) -> Result<Resolution, SubjectError> {
    match subjects.into() {
        Subjects::One(subject) => {
            let decision = decide_one(table, memberships, subject, options)?;
            Ok(Resolution::Single(AccessResult::from(&decision)))
        }
        Subjects::Many(subjects) => Ok(Resolution::Batch(decide_batch(
            table,
            memberships,
            subjects,
            options,
        ))),
    }
}

/// Turn a denied action into a `FORBIDDEN` error.
pub fn enforce(result: &AccessResult, action: Action) -> crate::Result<()> {
    if result.can[action] {
        return Ok(());
    }
    Err(CanopyError::forbidden(format!("Action `{action}` is not permitted"))
        .with_context("action", action.as_str()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
