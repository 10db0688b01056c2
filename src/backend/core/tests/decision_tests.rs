//! Integration tests for permission decisions.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use canopy_core::prelude::*;
use canopy_core::rbac::{subject_key, SYSTEM_CONTEXT};

use common::{attachment, org_membership, project_membership, task};

// ═══════════════════════════════════════════════════════════════════════════════
// Grants
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_role_based_grant() {
    let table = common::table();

    let admin = vec![org_membership("org1", "admin")];
    let decision =
        decide_one(&table, &admin, &attachment("a1", "org1"), DecisionOptions::new()).unwrap();
    assert!(decision.can[Action::Delete]);

    let member = vec![org_membership("org1", "member")];
    let decision =
        decide_one(&table, &member, &attachment("a1", "org1"), DecisionOptions::new()).unwrap();
    assert!(!decision.can[Action::Delete]);
    assert!(decision.can[Action::Read]);
}

#[test]
fn test_non_matching_membership_denies_everything() {
    let table = common::table();
    let memberships = vec![
        org_membership("org2", "admin"),
        org_membership("org2", "member"),
    ];
    let decision =
        decide_one(&table, &memberships, &attachment("a1", "org1"), DecisionOptions::new())
            .unwrap();

    for action in Action::ALL {
        assert!(!decision.can[action]);
        assert!(decision.actions[action].granted_by.is_empty());
    }
    assert!(decision.membership.is_none());
}

#[test]
fn test_grants_accumulate() {
    let table = common::table();
    let memberships = vec![
        org_membership("org1", "admin"),
        org_membership("org1", "member"),
    ];
    let decision =
        decide_one(&table, &memberships, &attachment("a1", "org1"), DecisionOptions::new())
            .unwrap();

    let read = &decision.actions[Action::Read];
    assert_eq!(read.granted_by.len(), 2);
    assert_eq!(read.granted_by_role("admin").count(), 1);
    assert_eq!(read.granted_by_role("member").count(), 1);

    let delete = &decision.actions[Action::Delete];
    assert_eq!(delete.granted_by.len(), 1);
    assert_eq!(delete.granted_by[0].role, "admin");
    assert_eq!(delete.granted_by[0].context_id, "org1");

    // Primary membership is the first one in input order.
    assert_eq!(decision.membership.as_ref().map(|m| m.role.as_str()), Some("admin"));
}

#[test]
fn test_deeper_context_grants_come_first() {
    let table = common::table();
    let memberships = vec![
        org_membership("org1", "admin"),
        project_membership("org1", "p1", "member"),
    ];
    let decision =
        decide_one(&table, &memberships, &task("t1", "org1", "p1"), DecisionOptions::new())
            .unwrap();

    assert_eq!(decision.primary_context.as_ref().unwrap(), "project");
    let update = &decision.actions[Action::Update];
    let contexts: Vec<_> = update.granted_by.iter().map(|g| g.context_type.as_str()).collect();
    assert_eq!(contexts, ["project", "organization"]);
    assert_eq!(
        decision.granted_actions(),
        [Action::Create, Action::Read, Action::Update, Action::Delete, Action::Search]
    );
}

#[test]
fn test_membership_in_other_project_does_not_leak() {
    let table = common::table();
    let memberships = vec![project_membership("org1", "p2", "admin")];
    let decision =
        decide_one(&table, &memberships, &task("t1", "org1", "p1"), DecisionOptions::new())
            .unwrap();
    assert!(decision.granted_actions().is_empty());
}

#[test]
fn test_public_product_denied_without_bypass() {
    let table = common::table();
    let memberships = vec![org_membership("org1", "admin")];
    let decision =
        decide_one(&table, &memberships, &Subject::new("page", "home"), DecisionOptions::new())
            .unwrap();
    assert!(decision.granted_actions().is_empty());
    assert!(decision.primary_context.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// System admin
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_system_admin_bypass_with_no_memberships() {
    let table = common::table();
    for subject in [
        attachment("a1", "org1"),
        task("t1", "org1", "p1"),
        Subject::new("page", "home"),
    ] {
        let decision = decide_one(&table, &[], &subject, DecisionOptions::system_admin()).unwrap();
        for action in Action::ALL {
            let attribution = &decision.actions[action];
            assert!(attribution.enabled);
            assert_eq!(attribution.granted_by.len(), 1);
            assert_eq!(attribution.granted_by[0].context_type, SYSTEM_CONTEXT);
            assert!(attribution.granted_by[0].is_system());
        }
    }
}

#[test]
fn test_system_admin_still_rejects_malformed_subjects() {
    let table = common::table();
    let err = decide_one(
        &table,
        &[],
        &Subject::new("task", "t1"),
        DecisionOptions::system_admin(),
    )
    .unwrap_err();
    assert!(matches!(err, SubjectError::MissingContextId { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Batch
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_batch_single_equivalence() {
    let table = common::table();
    let memberships = vec![
        org_membership("org1", "member"),
        project_membership("org1", "p1", "admin"),
    ];
    let subjects = vec![
        attachment("a1", "org1"),
        attachment("a2", "org2"),
        task("t1", "org1", "p1"),
        Subject::new("project", "p1").with_context("organization", "org1"),
    ];

    let batch = decide_batch(&table, &memberships, &subjects, DecisionOptions::new());
    assert!(batch.errors.is_empty());

    for (index, subject) in subjects.iter().enumerate() {
        let key = subject_key(subject, index);
        let single = decide_one(&table, &memberships, subject, DecisionOptions::new()).unwrap();
        assert_eq!(batch.decisions[&key], single);
        assert_eq!(batch.results[&key], AccessResult::from(&single));
    }
}

#[test]
fn test_batch_errors_do_not_abort() {
    let table = common::table();
    let subjects = vec![
        attachment("a1", "org1"),
        Subject::new("user", "u1"),
        Subject::new("task", "t1").with_context("project", "p1"),
        Subject::unsaved("attachment").with_context("organization", "org1"),
    ];
    let batch = decide_batch(
        &table,
        &[org_membership("org1", "admin")],
        &subjects,
        DecisionOptions::new(),
    );

    assert_eq!(batch.results.len(), 2);
    assert!(batch.results["a1"].allowed);
    assert!(batch.results["#3"].can[Action::Create]);
    assert_eq!(batch.errors["u1"], SubjectError::NotPermissionable("user".into()));
    assert!(matches!(
        batch.errors["t1"],
        SubjectError::MissingContextId { .. }
    ));
}

#[test]
fn test_batch_shared_id_is_reported_not_overwritten() {
    let table = common::table();
    let subjects = vec![
        attachment("x", "org1"),
        Subject::new("task", "x"),
        attachment("a2", "org1"),
    ];
    let batch = decide_batch(
        &table,
        &[org_membership("org1", "admin")],
        &subjects,
        DecisionOptions::new(),
    );

    assert!(!batch.results.contains_key("x"));
    assert!(!batch.decisions.contains_key("x"));
    assert_eq!(
        batch.errors["x"],
        SubjectError::DuplicateKey {
            key: "x".to_string(),
            count: 2
        }
    );
    assert!(batch.results["a2"].allowed);
}

#[test]
fn test_batch_id_matching_generated_key_is_reported() {
    let table = common::table();
    let subjects = vec![
        attachment("#1", "org1"),
        Subject::unsaved("page"),
        attachment("a3", "org1"),
    ];
    let batch = decide_batch(
        &table,
        &[org_membership("org1", "viewer")],
        &subjects,
        DecisionOptions::new(),
    );

    assert_eq!(batch.results.len() + batch.errors.len(), 2);
    assert!(matches!(
        batch.errors["#1"],
        SubjectError::DuplicateKey { count: 2, .. }
    ));
    assert!(batch.results.contains_key("a3"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Concurrency
// ═══════════════════════════════════════════════════════════════════════════════

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_shared_state_is_send_sync() {
    assert_send_sync::<AccessPolicyTable>();
    assert_send_sync::<EntityHierarchy>();
    assert_send_sync::<Arc<AccessPolicyTable>>();
}

#[test]
fn test_concurrent_batches_over_shared_table() {
    let table = Arc::new(common::table());
    let subjects: Vec<Subject> = (0..20)
        .map(|i| task(&format!("t{i}"), "org1", &format!("p{}", i % 4)))
        .collect();
    let membership_sets: Vec<Vec<Membership>> = vec![
        vec![org_membership("org1", "admin")],
        vec![org_membership("org1", "viewer")],
        vec![project_membership("org1", "p0", "member")],
        vec![project_membership("org1", "p1", "admin"), org_membership("org1", "member")],
        vec![],
    ];

    let sequential: Vec<BatchDecision> = membership_sets
        .iter()
        .map(|m| decide_batch(&table, m, &subjects, DecisionOptions::new()))
        .collect();

    let concurrent: Vec<BatchDecision> = std::thread::scope(|scope| {
        let handles: Vec<_> = membership_sets
            .iter()
            .map(|memberships| {
                let table = Arc::clone(&table);
                let subjects = &subjects;
                scope.spawn(move || {
                    (0..10)
                        .map(|_| decide_batch(&table, memberships, subjects, DecisionOptions::new()))
                        .last()
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(concurrent, sequential);
    assert_ne!(sequential[0], sequential[4]);
}

#[test]
fn test_facade_dispatches_on_shape() {
    let table = common::table();
    let memberships = vec![org_membership("org1", "viewer")];
    let subject = attachment("a1", "org1");

    let single = decide(&table, &memberships, &subject, DecisionOptions::new()).unwrap();
    let result = single.single().unwrap();
    assert!(result.allowed);
    assert!(enforce(result, Action::Read).is_ok());
    assert_eq!(
        enforce(result, Action::Update).unwrap_err().code(),
        ErrorCode::Forbidden
    );

    let subjects = vec![subject];
    let batch = decide(&table, &memberships, &subjects, DecisionOptions::new()).unwrap();
    assert_eq!(batch.batch().unwrap().results.get("a1"), Some(result));
}

/// Best-of-`runs` wall time for `f`.
fn best_of(runs: usize, mut f: impl FnMut()) -> Duration {
    (0..runs)
        .map(|_| {
            let start = Instant::now();
            f();
            start.elapsed()
        })
        .min()
        .unwrap_or_default()
}

#[test]
fn test_batch_is_faster_than_single_loop() {
    let table = common::table();

    let mut memberships = Vec::new();
    for org in 0..200 {
        memberships.push(org_membership(&format!("org{org}"), "member"));
        for project in 0..4 {
            memberships.push(project_membership(
                &format!("org{org}"),
                &format!("p{org}-{project}"),
                "member",
            ));
        }
    }
    assert_eq!(memberships.len(), 1000);

    let subjects: Vec<Subject> = (0..100)
        .map(|i| {
            let org = i % 200;
            task(&format!("t{i}"), &format!("org{org}"), &format!("p{org}-0"))
        })
        .collect();

    let batch = best_of(7, || {
        let result = decide_batch(&table, &memberships, &subjects, DecisionOptions::new());
        assert_eq!(result.results.len(), 100);
    });
    let single = best_of(7, || {
        for subject in &subjects {
            let decision =
                decide_one(&table, &memberships, subject, DecisionOptions::new()).unwrap();
            assert!(decision.can[Action::Read]);
        }
    });

    assert!(
        single > batch * 2,
        "batch {batch:?} was not more than 2x faster than single loop {single:?}"
    );
}
